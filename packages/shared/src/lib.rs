//! Shared building blocks of the Natter chat relay.
//!
//! - [`protocol`]: client/server message types and their line framing
//! - [`connection`]: per-socket read and write loops used by both engines
//! - [`time`], [`logger`]: ambient utilities shared by the binaries

pub mod connection;
pub mod logger;
pub mod protocol;
pub mod time;

pub use connection::{Connection, ConnectionEvent, ConnectionId, ConnectionState};
