//! Natter chat client.
//!
//! [`engine::ClientEngine`] keeps the connection to the relay; [`state::ChatState`] and
//! [`formatter::MessageFormatter`] turn what the server sends into terminal output.

pub mod command;
pub mod engine;
pub mod error;
pub mod formatter;
pub mod state;
pub mod ui;

pub use engine::{ClientEngine, ClientLink};
pub use error::ClientError;
