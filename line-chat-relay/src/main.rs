use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use line_chat_relay::{cli::Cli, config::RelayConfig, relay::Relay};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = RelayConfig::from(Cli::parse());
    let relay = Relay::bind(&config).await?;
    let addr = relay.local_addr()?;
    info!("relay listening on {}", addr);
    info!(
        policy = %config.delivery_policy,
        write_timeout = ?config.write_timeout,
        max_line_bytes = config.max_line_bytes,
        "delivery configured"
    );
    if let Err(err) = relay.run_until_ctrl_c().await {
        warn!("relay exited with error: {err:?}");
        return Err(err);
    }

    Ok(())
}
