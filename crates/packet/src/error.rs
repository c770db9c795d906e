use thiserror::Error;

/// Result type alias for datagram codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while moving datagrams to and from their wire form.
#[derive(Debug, Error)]
pub enum Error {
    /// The frame was not valid JSON, or a field had the wrong JSON type.
    #[error("failed to decode datagram: {0}")]
    Decode(#[source] serde_json::Error),

    /// The datagram could not be serialized.
    #[error("failed to encode datagram: {0}")]
    Encode(#[source] serde_json::Error),
}
