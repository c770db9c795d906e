//! State and read-side logic shared by client and server sessions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use edgewire_packet::{Datagram, DatagramType, ErrorCondition};
use edgewire_transport::{CloseCode, CloseFrame, Connection, Frame};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::ledger::{CallLedger, Callbacks};
use crate::state::{SessionState, StateCell};

pub(crate) struct SessionCore {
    pub(crate) id: String,
    pub(crate) state: StateCell,
    pub(crate) ledger: CallLedger,
    pub(crate) config: SessionConfig,
    connection: Mutex<Option<Arc<dyn Connection>>>,
    write_lock: tokio::sync::Mutex<()>,
    read_token: Mutex<CancellationToken>,
    keepalive: Mutex<Option<CancellationToken>>,
    created: AtomicBool,
}

impl SessionCore {
    pub(crate) fn new(id: String, state: SessionState, config: SessionConfig) -> Self {
        Self {
            id,
            state: StateCell::new(state),
            ledger: CallLedger::new(),
            config,
            connection: Mutex::new(None),
            write_lock: tokio::sync::Mutex::new(()),
            read_token: Mutex::new(CancellationToken::new()),
            keepalive: Mutex::new(None),
            created: AtomicBool::new(false),
        }
    }

    pub(crate) fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.connection.lock().clone()
    }

    pub(crate) fn install(&self, connection: Arc<dyn Connection>) {
        *self.connection.lock() = Some(connection);
    }

    pub(crate) fn take_connection(&self) -> Option<Arc<dyn Connection>> {
        self.connection.lock().take()
    }

    /// Starts a fresh read attempt and returns its stop signal.
    pub(crate) fn renew_read_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.read_token.lock() = token.clone();
        token
    }

    pub(crate) fn read_token(&self) -> CancellationToken {
        self.read_token.lock().clone()
    }

    pub(crate) fn set_keepalive(&self, token: CancellationToken) {
        if let Some(previous) = self.keepalive.lock().replace(token) {
            previous.cancel();
        }
    }

    pub(crate) fn mark_created(&self) {
        self.created.store(true, Ordering::SeqCst);
    }

    pub(crate) async fn deliver(
        &self,
        datagram: Datagram,
        pending: Option<(Duration, Callbacks)>,
    ) -> Result<()> {
        if self.state.load() != SessionState::Connected {
            return Err(Error::NotReady);
        }

        let text = datagram.encode()?;

        let registered = match pending {
            Some((timeout, callbacks)) if datagram.kind == DatagramType::Request => {
                self.ledger.register(datagram.id.clone(), timeout, callbacks);
                true
            }
            _ => false,
        };

        let written = self.write_text(text).await;
        if written.is_err() && registered {
            self.ledger.cancel(&datagram.id);
        }
        written
    }

    async fn write_text(&self, text: String) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let connection = self.connection().ok_or(Error::NotReady)?;

        debug!(session_id = %self.id, "SEND {}", text);
        connection.write_frame(Frame::Text(text)).await?;
        Ok(())
    }

    /// Decodes an inbound text frame and settles what the session can settle
    /// on its own. Requests are returned for the handler.
    pub(crate) async fn route(&self, text: &str) -> Option<Datagram> {
        debug!(session_id = %self.id, "RECV {}", text);

        let datagram = match Datagram::decode(text) {
            Ok(datagram) => datagram,
            Err(e) => {
                error!(session_id = %self.id, message = text, "dropping undecodable datagram: {}", e);
                return None;
            }
        };

        match datagram.kind {
            DatagramType::Request => Some(datagram),
            DatagramType::Result | DatagramType::Error => {
                let id = datagram.id.clone();
                if !self.ledger.resolve(datagram) {
                    debug!(session_id = %self.id, call_id = %id, "no pending call for reply");
                }
                None
            }
            DatagramType::Unknown(ref raw) => {
                warn!(session_id = %self.id, datagram_type = %raw, "rejecting unknown datagram type");
                let rejection = Datagram::error(
                    datagram.id.clone(),
                    datagram.function.clone(),
                    ErrorCondition::BadRequest,
                    format!("UNKNOWN DATAGRAM TYPE -> {raw}"),
                );
                if let Err(e) = self.deliver(rejection, None).await {
                    warn!(session_id = %self.id, "failed to reject datagram: {}", e);
                }
                None
            }
        }
    }

    /// Tears the session down.
    ///
    /// Returns `true` when the caller must notify `on_session_destroyed`:
    /// this call claimed the teardown and creation had been notified.
    pub(crate) async fn shutdown(&self, code: CloseCode, reason: &str, write_close: bool) -> bool {
        if !self.state.claim_close() {
            return false;
        }
        info!(session_id = %self.id, %code, reason, "closing session");

        if let Some(keepalive) = self.keepalive.lock().take() {
            keepalive.cancel();
        }
        self.ledger.clear();

        if let Some(connection) = self.take_connection() {
            if write_close {
                let deadline = self.config.close_deadline;
                let written = tokio::time::timeout(deadline, async {
                    let _guard = self.write_lock.lock().await;
                    connection.write_close(code, reason, deadline).await
                })
                .await;

                match written {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(session_id = %self.id, "close frame not sent: {}", e),
                    Err(_) => debug!(session_id = %self.id, "close frame timed out"),
                }
            }

            if let Err(e) = connection.close().await {
                debug!(session_id = %self.id, "connection close failed: {}", e);
            }
        }

        self.read_token.lock().cancel();

        self.created.swap(false, Ordering::SeqCst)
    }

    /// Runs the close handler for a close frame sent by the peer.
    pub(crate) async fn peer_closed(&self, frame: Option<CloseFrame>) -> bool {
        let (code, reason) = frame.map_or((CloseCode::NO_STATUS, String::new()), |frame| {
            (frame.code, frame.reason)
        });
        info!(session_id = %self.id, %code, reason = %reason, "peer closed session");

        self.shutdown(code, &reason, false).await
    }
}
