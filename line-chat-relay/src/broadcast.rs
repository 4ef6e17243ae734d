use std::{io, sync::Arc, time::Duration};

use tokio::{io::AsyncWrite, time::timeout};
use tracing::{debug, warn};

use crate::{
    config::DeliveryPolicy,
    line::write_line,
    registry::{Registry, SessionId},
};

/// Outcome of one broadcast. The relay itself ignores it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: Vec<SessionId>,
    /// Set when `AbortOnError` stopped the fan-out early.
    pub aborted: bool,
}

/// Writes one line to every registered member.
///
/// The registry lock is held from the first write to the last, so each
/// broadcast reaches exactly the members registered when it started and
/// broadcasts never interleave. The price is that a slow member delays every
/// other broadcast, add and remove until its write completes. `write_timeout`
/// bounds that delay. Giving each member its own outbound queue and writer
/// task would remove it entirely.
pub struct Broadcaster<W> {
    registry: Arc<Registry<W>>,
    policy: DeliveryPolicy,
    write_timeout: Option<Duration>,
}

impl<W> Broadcaster<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(
        registry: Arc<Registry<W>>,
        policy: DeliveryPolicy,
        write_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            policy,
            write_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<Registry<W>> {
        &self.registry
    }

    /// Sends `line` plus a newline to every member in registry order.
    pub async fn broadcast(&self, line: &str) -> BroadcastReport {
        debug_assert!(!line.contains('\n'), "broadcast lines carry no newline");

        let mut members = self.registry.lock_members().await;
        let mut report = BroadcastReport::default();

        for member in members.iter_mut() {
            let id = member.id();
            match self.deliver(member.writer_mut(), line).await {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    warn!(session = %id, nickname = member.nickname(), %error, "failed to deliver line");
                    report.failed.push(id);
                    if self.policy == DeliveryPolicy::AbortOnError {
                        report.aborted = true;
                        break;
                    }
                }
            }
        }

        debug!(
            delivered = report.delivered,
            failed = report.failed.len(),
            aborted = report.aborted,
            "broadcast finished"
        );
        report
    }

    async fn deliver(&self, writer: &mut W, line: &str) -> io::Result<()> {
        match self.write_timeout {
            Some(limit) => timeout(limit, write_line(writer, line))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write timed out"))?,
            None => write_line(writer, line).await,
        }
    }
}
