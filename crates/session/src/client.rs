use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use edgewire_packet::Datagram;
use edgewire_transport::{CloseCode, Dialer, Frame, Target};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::base::SessionCore;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::handler::ClientSessionHandler;
use crate::keepalive::{self, KeepaliveConfig};
use crate::ledger::Callbacks;
use crate::session::Session;
use crate::state::SessionState;

/// Creates [`ClientSession`]s that share a dialer and number sessions from
/// one counter.
pub struct ClientSessionFactory {
    dialer: Arc<dyn Dialer>,
    config: SessionConfig,
    next_id: AtomicU64,
}

impl ClientSessionFactory {
    /// Creates a factory whose first session gets id `1`.
    pub fn new(dialer: Arc<dyn Dialer>, config: SessionConfig) -> Self {
        Self {
            dialer,
            config,
            next_id: AtomicU64::new(1),
        }
    }

    /// Creates a closed session bound to `handler`.
    pub fn create(&self, handler: Arc<dyn ClientSessionHandler>) -> ClientSession {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        ClientSession {
            inner: Arc::new(ClientInner {
                core: SessionCore::new(id.to_string(), SessionState::Closed, self.config),
                dialer: Arc::clone(&self.dialer),
                handler,
            }),
        }
    }
}

impl Debug for ClientSessionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSessionFactory")
            .field("config", &self.config)
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

struct ClientInner {
    core: SessionCore,
    dialer: Arc<dyn Dialer>,
    handler: Arc<dyn ClientSessionHandler>,
}

/// Session that dials its peer and keeps the link alive.
///
/// Cloning yields another handle to the same session. After it closes, the
/// session can be opened again.
#[derive(Clone)]
pub struct ClientSession {
    inner: Arc<ClientInner>,
}

impl Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.inner.core.id)
            .field("state", &self.inner.core.state.load())
            .field("pending", &self.inner.core.ledger.len())
            .finish()
    }
}

impl ClientSession {
    /// Whether the session is `Connected`.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.core.state.load() == SessionState::Connected
    }

    /// Number of requests awaiting a reply.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.inner.core.ledger.len()
    }

    /// Connects to `target` and serves the connection until it ends.
    ///
    /// Returns `Ok(())` after a local or peer close. The session is `Closed`
    /// again when this returns.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyOpened`] if the session is not `Closed`.
    /// - the dial error; nothing is retried.
    /// - [`Error::Closed`] if `close` ran while dialing.
    /// - the transport error that broke the read loop.
    pub async fn open(&self, target: &Target, keepalive: impl Into<KeepaliveConfig>) -> Result<()> {
        let core = &self.inner.core;
        let keepalive_config = keepalive.into();

        core.state
            .transition(SessionState::Closed, SessionState::Connecting)
            .map_err(|_| Error::AlreadyOpened)?;
        let read_token = core.renew_read_token();

        info!(session_id = %core.id, %target, "opening session");

        let connection = match self.inner.dialer.dial(target).await {
            Ok(connection) => connection,
            Err(e) => {
                let _ = core
                    .state
                    .transition(SessionState::Connecting, SessionState::Closed);
                warn!(session_id = %core.id, %target, "dial failed: {}", e);
                return Err(e.into());
            }
        };

        core.install(Arc::clone(&connection));
        if core
            .state
            .transition(SessionState::Connecting, SessionState::Connected)
            .is_err()
        {
            if let Some(connection) = core.take_connection() {
                let _ = connection.close().await;
            }
            return Err(Error::Closed);
        }

        core.mark_created();
        self.inner.handler.on_session_created(self).await;

        let stop = CancellationToken::new();
        core.set_keepalive(stop.clone());
        tokio::spawn(keepalive::run(self.clone(), keepalive_config, stop));

        loop {
            let frame = tokio::select! {
                biased;
                () = read_token.cancelled() => return Ok(()),
                frame = connection.read_frame() => frame,
            };

            match frame {
                Ok(Frame::Text(text)) => {
                    if let Some(datagram) = core.route(&text).await {
                        self.inner.handler.on_message_received(self, datagram).await;
                    }
                }
                Ok(Frame::Binary(_)) => {
                    self.close(
                        CloseCode::INVALID_PAYLOAD,
                        "ONLY TEXT PAYLOAD WILL BE ACCEPTED",
                    )
                    .await?;
                }
                Ok(Frame::Ping(_) | Frame::Pong(_)) => {}
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
                    self.close(CloseCode::ABNORMAL, &e.to_string()).await?;
                    return Err(e.into());
                }
            }
        }
    }
}

#[async_trait]
impl Session for ClientSession {
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
