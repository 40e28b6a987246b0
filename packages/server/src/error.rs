//! Error types for the relay server.

use thiserror::Error;

/// Errors raised while starting the server engine.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The I/O runtime could not be built
    #[error("failed to build I/O runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// The I/O thread could not be spawned
    #[error("failed to spawn I/O thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// The I/O thread exited before reporting readiness
    #[error("I/O thread exited during startup")]
    IoThreadExited,
}
