use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default cap on a single inbound line, terminator included.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Reads the next line from `reader`, without its `\n` or `\r\n` terminator.
///
/// Returns `Ok(None)` once the stream is exhausted. A trailing line with no
/// terminator is still returned before EOF. Lines longer than `max_bytes`
/// fail with `InvalidData`. Invalid UTF-8 is replaced rather than rejected.
pub async fn read_line<R>(reader: &mut R, max_bytes: usize) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    // One extra byte lets us tell "exactly at the cap" from "over the cap".
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX).saturating_add(1);
    let bytes = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if bytes == 0 {
        return Ok(None);
    }

    if buf.len() > max_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line exceeds {max_bytes} bytes"),
        ));
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }

    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Writes `line` followed by `\n` and flushes so peers see it right away.
pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = Vec::with_capacity(line.len() + 1);
    encoded.extend_from_slice(line.as_bytes());
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await
}
