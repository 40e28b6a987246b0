//! Error types for the chat client.

use natter_shared::protocol::MAX_MESSAGE_LEN;
use thiserror::Error;

/// Errors raised while starting the client engine.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The I/O thread could not be spawned
    #[error("failed to spawn I/O thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

/// Errors in a line typed at the prompt.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    /// Chat text longer than the protocol allows
    #[error("message is {0} bytes long, the limit is {max}", max = MAX_MESSAGE_LEN)]
    MessageTooLong(usize),

    /// A `/command` the client does not know
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// A known command with wrong arguments
    #[error("usage: {0}")]
    Usage(&'static str),
}
