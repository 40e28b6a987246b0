//! Natter relay server.
//!
//! - [`engine`]: TCP accept loop, connection registry and handler dispatch
//! - [`session`]: user presence, colors and chat history replay
//! - [`history`]: persistence of chat messages

pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod session;

pub use config::ServerConfig;
pub use engine::{Relay, ServerEngine, ServerHandler};
pub use error::ServerError;
pub use session::SessionManager;
