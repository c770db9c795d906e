//! WebSocket transport for edgewire sessions.
//!
//! - For connecting: [`WebSocketDialer`] opens `ws://` or `wss://` client
//!   connections, taking its TLS settings from the target.
//! - For listening: [`WebSocketAcceptor`] provides an Axum handler that can be
//!   mounted into an existing server, and [`accept`] upgrades a raw stream.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::WebSocketUpgrade;
use axum::extract::ws::{self, WebSocket};
use edgewire_transport::{
    CloseCode, CloseFrame, Connection, Dialer, Frame, Result, Target, TransportError,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use url::Url;
use uuid::Uuid;

const FLUSH_ON_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Message type of a WebSocket implementation, mapped onto transport frames.
pub trait WireMessage: Send + Sized + 'static {
    /// Error produced by the socket carrying this message type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Converts an inbound message. `None` for messages with no frame form.
    fn into_frame(self) -> Option<Frame>;

    /// Converts an outbound frame.
    fn from_frame(frame: Frame) -> Self;

    /// Maps a socket error onto the transport error space.
    fn map_error(error: Self::Error) -> TransportError;
}

impl WireMessage for Message {
    type Error = tungstenite::Error;

    fn into_frame(self) -> Option<Frame> {
        match self {
            Self::Text(text) => Some(Frame::Text(text.as_str().to_owned())),
            Self::Binary(data) => Some(Frame::Binary(data)),
            Self::Ping(data) => Some(Frame::Ping(data)),
            Self::Pong(data) => Some(Frame::Pong(data)),
            Self::Close(frame) => Some(Frame::Close(frame.map(|frame| CloseFrame {
                code: CloseCode(u16::from(frame.code)),
                reason: frame.reason.as_str().to_owned(),
            }))),
            Self::Frame(_) => None,
        }
    }

    fn from_frame(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Self::text(text),
            Frame::Binary(data) => Self::Binary(data),
            Frame::Ping(data) => Self::Ping(data),
            Frame::Pong(data) => Self::Pong(data),
            Frame::Close(frame) => Self::Close(
                frame
                    .filter(|frame| !frame.code.is_reserved())
                    .map(|frame| tungstenite::protocol::CloseFrame {
                        code: frame.code.0.into(),
                        reason: frame.reason.into(),
                    }),
            ),
        }
    }

    fn map_error(error: Self::Error) -> TransportError {
        match error {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                TransportError::ConnectionClosed
            }
            tungstenite::Error::Io(e) => TransportError::Io(e),
            tungstenite::Error::Protocol(e) => TransportError::Protocol(e.to_string()),
            other => TransportError::Protocol(other.to_string()),
        }
    }
}

impl WireMessage for ws::Message {
    type Error = axum::Error;

    fn into_frame(self) -> Option<Frame> {
        match self {
            Self::Text(text) => Some(Frame::Text(text.as_str().to_owned())),
            Self::Binary(data) => Some(Frame::Binary(data)),
            Self::Ping(data) => Some(Frame::Ping(data)),
            Self::Pong(data) => Some(Frame::Pong(data)),
            Self::Close(frame) => Some(Frame::Close(frame.map(|frame| CloseFrame {
                code: CloseCode(frame.code),
                reason: frame.reason.as_str().to_owned(),
            }))),
        }
    }

    fn from_frame(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Self::Text(text.into()),
            Frame::Binary(data) => Self::Binary(data),
            Frame::Ping(data) => Self::Ping(data),
            Frame::Pong(data) => Self::Pong(data),
            Frame::Close(frame) => Self::Close(
                frame
                    .filter(|frame| !frame.code.is_reserved())
                    .map(|frame| ws::CloseFrame {
                        code: frame.code.0,
                        reason: frame.reason.into(),
                    }),
            ),
        }
    }

    fn map_error(error: Self::Error) -> TransportError {
        TransportError::Io(std::io::Error::other(error.to_string()))
    }
}

/// A WebSocket connection split into independently locked read and write
/// halves.
pub struct WebSocketConnection<T, M> {
    id: Uuid,
    sink: Mutex<SplitSink<T, M>>,
    stream: Mutex<SplitStream<T>>,
    closed: CancellationToken,
}

/// Client-side connection produced by [`WebSocketDialer`].
pub type ClientConnection = WebSocketConnection<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, Message>;

/// Server-side connection produced by [`WebSocketAcceptor`].
pub type ServerConnection = WebSocketConnection<WebSocket, ws::Message>;

impl<T, M> WebSocketConnection<T, M>
where
    T: Stream<Item = std::result::Result<M, M::Error>> + Sink<M, Error = M::Error>,
    M: WireMessage,
{
    /// Wraps an established socket.
    pub fn new(socket: T) -> Self {
        let (sink, stream) = socket.split();
        Self {
            id: Uuid::new_v4(),
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closed: CancellationToken::new(),
        }
    }
}

impl<T, M> WebSocketConnection<T, M> {
    /// Unique id of this connection.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }
}

impl<T, M> Debug for WebSocketConnection<T, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("id", &self.id)
            .field("closed", &self.closed.is_cancelled())
            .finish()
    }
}

#[async_trait]
impl<T, M> Connection for WebSocketConnection<T, M>
where
    T: Stream<Item = std::result::Result<M, M::Error>>
        + Sink<M, Error = M::Error>
        + Send
        + Unpin
        + 'static,
    M: WireMessage,
{
    async fn read_frame(&self) -> Result<Frame> {
        let mut stream = tokio::select! {
            stream = self.stream.lock() => stream,
            () = self.closed.cancelled() => return Err(TransportError::ConnectionClosed),
        };

        loop {
            let message = tokio::select! {
                message = stream.next() => message,
                () = self.closed.cancelled() => return Err(TransportError::ConnectionClosed),
            };

            match message {
                Some(Ok(message)) => {
                    if let Some(frame) = message.into_frame() {
                        return Ok(frame);
                    }
                }
                Some(Err(e)) => return Err(M::map_error(e)),
                None => return Err(TransportError::ConnectionClosed),
            }
        }
    }

    async fn write_frame(&self, frame: Frame) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }

        let mut sink = self.sink.lock().await;
        sink.send(M::from_frame(frame)).await.map_err(M::map_error)
    }

    async fn write_close(&self, code: CloseCode, reason: &str, deadline: Duration) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }

        let frame = Frame::Close(Some(CloseFrame {
            code,
            reason: reason.to_string(),
        }));

        tokio::time::timeout(deadline, async {
            let mut sink = self.sink.lock().await;
            sink.send(M::from_frame(frame)).await.map_err(M::map_error)
        })
        .await
        .map_err(|_| TransportError::Timeout)?
    }

    async fn close(&self) -> Result<()> {
        debug!(connection_id = %self.id, "closing websocket connection");
        self.closed.cancel();

        let flushed = tokio::time::timeout(FLUSH_ON_CLOSE_TIMEOUT, async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        })
        .await;

        if let Ok(Err(e)) = flushed {
            debug!(connection_id = %self.id, "websocket close: {}", e);
        }
        Ok(())
    }
}

/// Performs the server handshake on an accepted stream.
///
/// # Errors
///
/// Returns [`TransportError::ConnectionFailed`] if the handshake fails.
pub async fn accept<S>(stream: S) -> Result<WebSocketConnection<WebSocketStream<S>, Message>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let socket = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| TransportError::ConnectionFailed(format!("WebSocket handshake failed: {e}")))?;

    Ok(WebSocketConnection::new(socket))
}

/// Client-side [`Dialer`].
///
/// A target with TLS must carry a [`rustls::ClientConfig`].
#[derive(Clone, Debug, Default)]
pub struct WebSocketDialer {
    connect_timeout: Option<Duration>,
}

impl WebSocketDialer {
    /// Creates a dialer without a connect timeout.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: None,
        }
    }

    /// Bounds the TCP, TLS and WebSocket handshakes together.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Dialer for WebSocketDialer {
    async fn dial(&self, target: &Target) -> Result<Arc<dyn Connection>> {
        let url = Url::parse(&target.to_string())
            .map_err(|e| TransportError::InvalidAddress(format!("Invalid URL {target}: {e}")))?;

        let connector = match &target.tls {
            None => Connector::Plain,
            Some(tls) => {
                let config = tls.downcast::<rustls::ClientConfig>().ok_or_else(|| {
                    TransportError::InvalidAddress(
                        "TLS configuration is not a rustls ClientConfig".to_string(),
                    )
                })?;
                Connector::Rustls(config)
            }
        };

        debug!("Connecting to WebSocket at {}", url);

        let connect =
            tokio_tungstenite::connect_async_tls_with_config(url.as_str(), None, false, Some(connector));

        let connected = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_| TransportError::Timeout)?,
            None => connect.await,
        };

        let (socket, response) = connected.map_err(|e| {
            TransportError::ConnectionFailed(format!("WebSocket connect failed: {e}"))
        })?;

        info!(status = %response.status(), "connected to {}", url);

        Ok(Arc::new(WebSocketConnection::new(socket)))
    }
}

/// Receives connections upgraded by an Axum route.
#[derive(Clone, Debug)]
pub struct WebSocketAcceptor {
    connection_tx: mpsc::Sender<ServerConnection>,
    connection_rx: Arc<Mutex<mpsc::Receiver<ServerConnection>>>,
}

impl Default for WebSocketAcceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketAcceptor {
    /// Creates an acceptor with room for 100 unaccepted connections.
    #[must_use]
    pub fn new() -> Self {
        let (connection_tx, connection_rx) = mpsc::channel(100);
        Self {
            connection_tx,
            connection_rx: Arc::new(Mutex::new(connection_rx)),
        }
    }

    /// Waits for the next upgraded connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the route is gone.
    pub async fn accept(&self) -> Result<ServerConnection> {
        let mut rx = self.connection_rx.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    /// Mount a WebSocket endpoint into an Axum router
    #[must_use]
    pub fn mount_into_router(&self, router: axum::Router, path: &str) -> axum::Router {
        let connection_tx = self.connection_tx.clone();

        let handler = move |ws: WebSocketUpgrade| {
            let connection_tx = connection_tx.clone();

            async move {
                ws.on_upgrade(move |socket| async move {
                    let conn = WebSocketConnection::new(socket);
                    debug!(connection_id = %conn.id(), "websocket upgraded");
                    if connection_tx.send(conn).await.is_err() {
                        error!("Failed to send connection to acceptor");
                    }
                })
            }
        };

        router.route(path, axum::routing::get(handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;

    #[test]
    fn test_reserved_close_code_is_not_sent() {
        let message = Message::from_frame(Frame::Close(Some(CloseFrame {
            code: CloseCode::ABNORMAL,
            reason: "gone".to_string(),
        })));
        assert_eq!(message, Message::Close(None));
    }

    #[test]
    fn test_message_frame_conversion() {
        let message = Message::from_frame(Frame::Text("{}".to_string()));
        assert_eq!(message.into_frame(), Some(Frame::Text("{}".to_string())));

        let message = ws::Message::from_frame(Frame::Ping(Bytes::from_static(b"p")));
        assert_eq!(
            message.into_frame(),
            Some(Frame::Ping(Bytes::from_static(b"p")))
        );

        let message = ws::Message::from_frame(Frame::Close(Some(CloseFrame {
            code: CloseCode::INVALID_PAYLOAD,
            reason: "text only".to_string(),
        })));
        assert_eq!(
            message.into_frame(),
            Some(Frame::Close(Some(CloseFrame {
                code: CloseCode::INVALID_PAYLOAD,
                reason: "text only".to_string(),
            })))
        );
    }

    #[tokio::test]
    async fn test_dial_rejects_foreign_tls_config() {
        let _ = tracing_subscriber::fmt::try_init();

        let target = Target::new("127.0.0.1", 1, "/")
            .with_tls(edgewire_transport::TlsConfig::new(42u32));
        let result = WebSocketDialer::new().dial(&target).await;

        assert!(matches!(result, Err(TransportError::InvalidAddress(_))));
    }
}
