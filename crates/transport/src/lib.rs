//! Transport abstraction consumed by edgewire sessions.
//!
//! A session never touches sockets directly. It reads and writes [`Frame`]s
//! through a [`Connection`], and the client variant obtains connections from a
//! [`Dialer`]. Concrete transports (WebSocket, in-memory) live in separate
//! crates.
//!
//! Implementations must allow one task to sit in [`Connection::read_frame`]
//! while other tasks call [`Connection::write_frame`]; the read and write
//! halves are independent.

pub mod error;

use std::any::Any;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

pub use error::{Result, TransportError};

/// Status code carried by a close frame.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Normal closure.
    pub const NORMAL: Self = Self(1000);
    /// Endpoint is going away.
    pub const GOING_AWAY: Self = Self(1001);
    /// Protocol error.
    pub const PROTOCOL: Self = Self(1002);
    /// No status code was present (never sent on the wire).
    pub const NO_STATUS: Self = Self(1005);
    /// Connection dropped without a close frame (never sent on the wire).
    pub const ABNORMAL: Self = Self(1006);
    /// Payload had the wrong type or encoding.
    pub const INVALID_PAYLOAD: Self = Self(1007);
    /// Unexpected condition on the sending side.
    pub const INTERNAL: Self = Self(1011);

    /// Codes that describe a local observation and must not appear in a close
    /// frame.
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        matches!(self.0, 1005 | 1006 | 1015)
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload of a close control frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CloseFrame {
    /// Status code.
    pub code: CloseCode,
    /// Human-readable reason.
    pub reason: String,
}

/// One transport message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Frame {
    /// UTF-8 text frame. Datagrams always travel as text.
    Text(String),
    /// Binary frame.
    Binary(Bytes),
    /// Transport-level ping.
    Ping(Bytes),
    /// Transport-level pong.
    Pong(Bytes),
    /// The peer is closing the connection.
    Close(Option<CloseFrame>),
}

/// A ready duplex connection. TLS, if any, is already negotiated.
#[async_trait]
pub trait Connection: Debug + Send + Sync + 'static {
    /// Waits for the next frame from the peer.
    ///
    /// Returns [`TransportError::ConnectionClosed`] once the stream has ended.
    async fn read_frame(&self) -> Result<Frame>;

    /// Writes one data frame.
    async fn write_frame(&self, frame: Frame) -> Result<()>;

    /// Writes a close control frame, giving up after `deadline`.
    async fn write_close(&self, code: CloseCode, reason: &str, deadline: Duration) -> Result<()>;

    /// Releases the underlying connection. Pending and later reads fail.
    async fn close(&self) -> Result<()>;
}

/// Opaque TLS configuration.
///
/// Sessions carry it to the dialer untouched; only the dialer knows the
/// concrete type and recovers it with [`TlsConfig::downcast`].
#[derive(Clone)]
pub struct TlsConfig(Arc<dyn Any + Send + Sync>);

impl TlsConfig {
    /// Wraps a transport-specific TLS configuration.
    pub fn new<T: Any + Send + Sync>(config: T) -> Self {
        Self(Arc::new(config))
    }

    /// Wraps an already shared configuration without copying it.
    pub fn from_arc<T: Any + Send + Sync>(config: Arc<T>) -> Self {
        Self(config)
    }

    /// Recovers the concrete configuration if it has type `T`.
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }
}

impl Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig").finish_non_exhaustive()
    }
}

/// Where a client session should connect.
#[derive(Clone, Debug)]
pub struct Target {
    /// Host name or address.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Request path, e.g. `/iface/v1/cpe`.
    pub path: String,
    /// TLS configuration; `None` means plain text.
    pub tls: Option<TlsConfig>,
}

impl Target {
    /// Creates a plain-text target.
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            path: path.into(),
            tls: None,
        }
    }

    /// Attaches a TLS configuration.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Whether the target asks for TLS.
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.tls.is_some()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.is_secure() { "wss" } else { "ws" };
        let slash = if self.path.starts_with('/') { "" } else { "/" };
        write!(f, "{scheme}://{}:{}{slash}{}", self.host, self.port, self.path)
    }
}

/// Establishes connections for client sessions.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    /// Dials `target` and completes any handshake.
    async fn dial(&self, target: &Target) -> Result<Arc<dyn Connection>>;
}
