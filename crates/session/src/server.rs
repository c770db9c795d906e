use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use edgewire_packet::{Datagram, Function, Value};
use edgewire_transport::{CloseCode, Connection, Frame};
use tracing::{info, warn};

use crate::base::SessionCore;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::handler::ServerSessionHandler;
use crate::ledger::Callbacks;
use crate::session::Session;
use crate::state::SessionState;

static CONNECTION_SERIAL: AtomicU64 = AtomicU64::new(1);

struct ServerInner {
    core: SessionCore,
    handler: Arc<dyn ServerSessionHandler>,
    properties: DashMap<String, Value>,
    connection_serial: u64,
    serving: AtomicBool,
}

/// Session over a connection accepted by a server.
///
/// Starts `Connected`. Once closed it stays closed. Cloning yields another
/// handle to the same session.
#[derive(Clone)]
pub struct ServerSession {
    inner: Arc<ServerInner>,
}

impl Debug for ServerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSession")
            .field("id", &self.inner.core.id)
            .field("connection_serial", &self.inner.connection_serial)
            .field("state", &self.inner.core.state.load())
            .field("pending", &self.inner.core.ledger.len())
            .finish()
    }
}

impl ServerSession {
    /// Wraps an accepted connection. `id` is chosen by the caller.
    pub fn new(
        id: impl Into<String>,
        connection: Arc<dyn Connection>,
        handler: Arc<dyn ServerSessionHandler>,
        config: SessionConfig,
    ) -> Self {
        let core = SessionCore::new(id.into(), SessionState::Connected, config);
        core.install(connection);

        Self {
            inner: Arc::new(ServerInner {
                core,
                handler,
                properties: DashMap::new(),
                connection_serial: CONNECTION_SERIAL.fetch_add(1, Ordering::Relaxed),
                serving: AtomicBool::new(false),
            }),
        }
    }

    /// Process-wide serial number of the underlying connection.
    #[must_use]
    pub fn connection_serial(&self) -> u64 {
        self.inner.connection_serial
    }

    /// Value stored under `key`.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<Value> {
        self.inner.properties.get(key).map(|value| value.clone())
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set_property(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.properties.insert(key.into(), value.into());
    }

    /// Removes and returns the value under `key`.
    pub fn remove_property(&self, key: &str) -> Option<Value> {
        self.inner.properties.remove(key).map(|(_, value)| value)
    }

    /// Number of requests awaiting a reply.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.inner.core.ledger.len()
    }

    /// Reads and dispatches frames until the connection ends.
    ///
    /// Returns `Ok(())` after a local or peer close.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyOpened`] if `serve` is already running.
    /// - [`Error::Closed`] if the session was closed before serving.
    /// - the transport error that broke the read loop.
    pub async fn serve(&self) -> Result<()> {
        let core = &self.inner.core;

        if self.inner.serving.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyOpened);
        }
        let connection = core.connection().ok_or(Error::Closed)?;
        let read_token = core.read_token();

        info!(session_id = %core.id, serial = self.inner.connection_serial, "serving session");
        core.mark_created();
        self.inner.handler.on_session_created(self).await;

        loop {
            let frame = tokio::select! {
                biased;
                () = read_token.cancelled() => return Ok(()),
                frame = connection.read_frame() => frame,
            };

            match frame {
                Ok(Frame::Text(text)) => {
                    if text.is_empty() {
                        continue;
                    }
                    if let Some(datagram) = core.route(&text).await {
                        if datagram.function() == Function::Ping {
                            self.inner.handler.on_session_heartbeat(self).await;
                        }
                        self.inner.handler.on_message_received(self, datagram).await;
                    }
                }
                Ok(Frame::Binary(data)) => {
                    warn!(session_id = %core.id, len = data.len(), "dropping binary frame");
                }
                Ok(Frame::Ping(_)) => self.inner.handler.on_session_heartbeat(self).await,
                Ok(Frame::Pong(_)) => {}
                Ok(Frame::Close(frame)) => {
                    if core.peer_closed(frame).await {
                        self.inner.handler.on_session_destroyed(self).await;
                    }
                    return Ok(());
                }
                Err(e) => {
                    if core.state.load() != SessionState::Connected {
                        return Ok(());
                    }
                    warn!(session_id = %core.id, "read failed: {}", e);
                    self.close(CloseCode::ABNORMAL, "ERROR WHILE READING MESSAGES")
                        .await?;
                    return Err(e.into());
                }
            }
        }
    }
}

#[async_trait]
impl Session for ServerSession {
    fn id(&self) -> &str {
        &self.inner.core.id
    }

    fn state(&self) -> SessionState {
        self.inner.core.state.load()
    }

    async fn deliver(
        &self,
        datagram: Datagram,
        timeout: Duration,
        callbacks: Callbacks,
    ) -> Result<()> {
        self.inner.core.deliver(datagram, Some((timeout, callbacks))).await
    }

    async fn send(&self, datagram: Datagram) -> Result<()> {
        self.inner.core.deliver(datagram, None).await
    }

    async fn close(&self, code: CloseCode, reason: &str) -> Result<()> {
        if self.inner.core.shutdown(code, reason, true).await {
            self.inner.handler.on_session_destroyed(self).await;
        }
        Ok(())
    }
}
