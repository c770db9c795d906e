use std::time::Duration;

use edgewire_packet::ErrorCondition;
use edgewire_transport::TransportError;
use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by sessions.
#[derive(Debug, Error)]
pub enum Error {
    /// The session is not in the `Connected` state.
    #[error("SESSION IS NOT READY")]
    NotReady,

    /// `open` was called on a session that is not closed.
    #[error("ALREADY OPENED")]
    AlreadyOpened,

    /// The session was closed while the operation was in progress.
    #[error("session closed")]
    Closed,

    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A datagram could not be encoded.
    #[error(transparent)]
    Codec(#[from] edgewire_packet::Error),

    /// The peer answered with an error datagram.
    #[error("remote error {condition}: {message}")]
    Remote {
        /// Condition code reported by the peer.
        condition: ErrorCondition,
        /// Message reported by the peer.
        message: String,
    },

    /// No reply arrived in time.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The session tore down before a reply arrived.
    #[error("call cancelled")]
    Cancelled,
}
