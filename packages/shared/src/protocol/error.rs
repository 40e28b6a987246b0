//! Error types for the wire protocol.

use thiserror::Error;

/// Reasons a frame could not be encoded or decoded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame is not valid UTF-8
    #[error("frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Frame is not a valid JSON record, or its content does not match the header
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// Header names a message type this side does not know
    #[error("unknown message header {0}")]
    UnknownHeader(u8),

    /// Status field outside the known range
    #[error("invalid user status {0}")]
    InvalidStatus(u8),

    /// Response code outside the known range
    #[error("invalid server response code {0}")]
    InvalidResponseCode(u8),
}
