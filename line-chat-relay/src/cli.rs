use std::{net::SocketAddr, time::Duration};

use clap::Parser;

use crate::{
    config::{DEFAULT_LISTEN_ADDR, DeliveryPolicy, RelayConfig},
    line::DEFAULT_MAX_LINE_BYTES,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Socket address the relay should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: SocketAddr,

    /// How a broadcast reacts when writing to one client fails.
    #[arg(long, value_enum, default_value_t = DeliveryPolicy::SkipFailed)]
    pub delivery_policy: DeliveryPolicy,

    /// Give up on a single client write after this many milliseconds.
    #[arg(long)]
    pub write_timeout_ms: Option<u64>,

    /// Longest accepted input line in bytes, newline included.
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_BYTES)]
    pub max_line_bytes: usize,
}

impl From<Cli> for RelayConfig {
    fn from(cli: Cli) -> Self {
        Self {
            listen: cli.listen,
            delivery_policy: cli.delivery_policy,
            write_timeout: cli.write_timeout_ms.map(Duration::from_millis),
            max_line_bytes: cli.max_line_bytes,
        }
    }
}
