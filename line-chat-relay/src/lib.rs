//! Line-oriented TCP chat relay.
//!
//! Clients connect with any raw TCP tool (`nc`, `telnet`), answer the
//! nickname prompt, and from then on every line they type is sent to every
//! connected client. Each module owns one concern:
//!
//! - [`line`] reads and writes newline-delimited text.
//! - [`registry`] tracks which sessions are active, behind one mutex.
//! - [`broadcast`] fans a line out to every registered session while holding
//!   that mutex.
//! - [`session`] drives one connection through nickname negotiation, the
//!   read loop and departure.
//! - [`relay`] accepts TCP connections and spawns a session task for each.
//! - [`config`] and [`cli`] describe the knobs the binary exposes.

pub mod broadcast;
pub mod cli;
pub mod config;
pub mod line;
pub mod registry;
pub mod relay;
pub mod session;
