use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the agent.
#[derive(Debug, Error)]
pub enum Error {
    /// The bus answered on stderr or exited unsuccessfully.
    #[error("{0}")]
    Bus(String),

    /// The bus command did not finish in time and was killed.
    #[error("bus call timed out after {0:?}")]
    BusTimeout(Duration),

    /// The configuration file could not be parsed.
    #[error("invalid configuration file {0:?}: {1}")]
    Config(PathBuf, #[source] serde_yaml::Error),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// JSON decode error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The log filter could not be parsed.
    #[error(transparent)]
    LogFilter(#[from] tracing_subscriber::filter::ParseError),

    /// The global subscriber could not be installed.
    #[error("failed to install logging: {0}")]
    Logging(String),

    /// Session operation failed.
    #[error(transparent)]
    Session(#[from] edgewire_session::Error),

    /// TLS setup failed.
    #[error(transparent)]
    Tls(#[from] rustls::Error),
}
