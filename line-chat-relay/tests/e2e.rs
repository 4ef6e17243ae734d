use std::{path::Path, process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    process::{Child, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);
const PROMPT: &str = "Enter your nickname: ";

#[tokio::test]
async fn binary_relays_between_raw_tcp_clients() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("line_chat_relay");

    let (mut relay_child, mut relay_stdout) = spawn_relay(&binary).await?;
    let addr = read_relay_addr(&mut relay_stdout).await?;

    // Drain additional relay logs in the background so the pipe never fills.
    let relay_log_task = tokio::spawn(async move {
        drain_stdout(relay_stdout).await;
    });

    let mut alice = NetcatClient::connect(&addr).await?;
    alice.send_line("alice").await?;
    assert_eq!(alice.read_line_expect("alice join").await?, "alice has joined the chat");

    let mut bob = NetcatClient::connect(&addr).await?;
    bob.send_line("bob").await?;
    assert_eq!(bob.read_line_expect("bob join").await?, "bob has joined the chat");
    assert_eq!(
        alice.read_line_expect("alice sees bob").await?,
        "bob has joined the chat"
    );

    alice.send_line("hi").await?;
    assert_eq!(bob.read_line_expect("bob hears alice").await?, "alice: hi");
    assert_eq!(alice.read_line_expect("alice echo").await?, "alice: hi");

    // Closing alice's socket is enough for the relay to notice she left.
    drop(alice);
    assert_eq!(
        bob.read_line_expect("bob sees alice leave").await?,
        "alice has left the chat"
    );

    drop(bob);

    // The relay keeps serving after clients disconnect; terminate it manually.
    let _ = relay_child.kill().await;
    let _ = relay_child.wait().await;
    let _ = relay_log_task.await;

    Ok(())
}

struct NetcatClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl NetcatClient {
    async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to {addr}"))?;
        let (reader, writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let mut prompt = vec![0; PROMPT.len()];
        timeout(READ_TIMEOUT, reader.read_exact(&mut prompt))
            .await
            .context("timed out waiting for prompt")??;
        if prompt != PROMPT.as_bytes() {
            return Err(anyhow!(
                "unexpected prompt: {:?}",
                String::from_utf8_lossy(&prompt)
            ));
        }

        Ok(Self { reader, writer })
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to send line '{line}'"))?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_line_expect(&mut self, description: &str) -> Result<String> {
        match read_line(&mut self.reader).await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(anyhow!("{description}: stream closed")),
            Err(err) => Err(err.context(format!("{description}: failed to read line"))),
        }
    }
}

async fn spawn_relay(binary: &Path) -> Result<(Child, BufReader<ChildStdout>)> {
    let mut cmd = Command::new(binary);
    cmd.arg("--listen")
        .arg("127.0.0.1:0")
        .env("RUST_LOG", "info")
        .env("NO_COLOR", "1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().context("failed to spawn relay")?;
    let stdout = child
        .stdout
        .take()
        .context("relay stdout missing after spawn")?;

    Ok((child, BufReader::new(stdout)))
}

async fn read_relay_addr(reader: &mut BufReader<ChildStdout>) -> Result<String> {
    let line = read_line(reader)
        .await?
        .context("relay did not emit listening address")?;
    let trimmed = line.trim();
    let addr = trimmed
        .split_whitespace()
        .last()
        .context("unexpected relay banner format")?;
    if !addr.contains(':') {
        return Err(anyhow!("relay banner missing socket: {trimmed}"));
    }
    Ok(addr.to_string())
}

async fn read_line<R>(reader: &mut BufReader<R>) -> Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    let bytes_io = match timeout(READ_TIMEOUT, reader.read_line(&mut line)).await {
        Ok(result) => result,
        Err(_) => return Err(anyhow!("timed out waiting for line")),
    };
    if bytes_io? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn drain_stdout(mut reader: BufReader<ChildStdout>) {
    let mut buffer = String::new();
    while reader
        .read_line(&mut buffer)
        .await
        .map(|bytes| {
            let has_data = bytes > 0;
            if has_data {
                buffer.clear();
            }
            has_data
        })
        .unwrap_or(false)
    {}
}
