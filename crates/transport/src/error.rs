//! Transport error types.

use thiserror::Error;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors surfaced by transport implementations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection has been closed by either side.
    #[error("connection closed")]
    ConnectionClosed,

    /// Dialing or the transport handshake failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The target could not be turned into a transport address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// An operation did not complete before its deadline.
    #[error("transport operation timed out")]
    Timeout,

    /// The peer violated the framing protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
