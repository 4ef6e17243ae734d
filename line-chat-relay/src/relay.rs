use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream, tcp::OwnedWriteHalf},
    select,
};
use tracing::{debug, info, warn};

use crate::{
    broadcast::Broadcaster,
    config::RelayConfig,
    registry::Registry,
    session::{SessionContext, SessionEnd, run_session},
};

/// Accepts TCP clients and runs one session task per connection.
pub struct Relay {
    listener: TcpListener,
    ctx: SessionContext<OwnedWriteHalf>,
}

impl Relay {
    pub fn new(listener: TcpListener, config: &RelayConfig) -> Self {
        let registry = Arc::new(Registry::new());
        let broadcaster = Broadcaster::new(registry, config.delivery_policy, config.write_timeout);
        Self {
            listener,
            ctx: SessionContext {
                broadcaster: Arc::new(broadcaster),
                max_line_bytes: config.max_line_bytes,
            },
        }
    }

    /// Binds `config.listen` and builds a relay on it.
    pub async fn bind(config: &RelayConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen)
            .await
            .with_context(|| format!("failed to bind {}", config.listen))?;
        Ok(Self::new(listener, config))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<Registry<OwnedWriteHalf>> {
        Arc::clone(self.ctx.broadcaster.registry())
    }

    /// Accepts connections until `shutdown` resolves. Sessions already
    /// running are left alone.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Relay { listener, ctx } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("relay shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &ctx);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    ctx: &SessionContext<OwnedWriteHalf>,
) {
    match result {
        Ok((stream, peer)) => spawn_session(stream, peer, ctx),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_session(stream: TcpStream, peer: SocketAddr, ctx: &SessionContext<OwnedWriteHalf>) {
    let ctx = ctx.clone();
    debug!(peer = %peer, "connection accepted");
    tokio::spawn(async move {
        let (reader, writer) = stream.into_split();
        match run_session(BufReader::new(reader), writer, ctx).await {
            Ok(SessionEnd::Abandoned) => debug!(peer = %peer, "connection closed during negotiation"),
            Ok(SessionEnd::Left { nickname, .. }) => {
                debug!(peer = %peer, %nickname, "session finished")
            }
            Err(err) => warn!(peer = %peer, error = ?err, "session ended with error"),
        }
    });
}
