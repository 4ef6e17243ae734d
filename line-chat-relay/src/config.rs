use std::{fmt, net::SocketAddr, time::Duration};

use clap::ValueEnum;

use crate::line::DEFAULT_MAX_LINE_BYTES;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// What a broadcast does when writing to one member fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DeliveryPolicy {
    /// Log the failed target and keep delivering to the rest.
    #[default]
    SkipFailed,
    /// Stop the fan-out at the first failure. Members after the failed one
    /// miss the line.
    AbortOnError,
}

impl fmt::Display for DeliveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryPolicy::SkipFailed => f.write_str("skip-failed"),
            DeliveryPolicy::AbortOnError => f.write_str("abort-on-error"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen: SocketAddr,
    pub delivery_policy: DeliveryPolicy,
    /// Upper bound on a single target write during a broadcast. `None` lets a
    /// stalled reader hold the registry lock until its write finishes.
    pub write_timeout: Option<Duration>,
    pub max_line_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            delivery_policy: DeliveryPolicy::default(),
            write_timeout: None,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}
