//! In-memory transport for tests and local development.
//!
//! [`pair`] returns two connected ends. [`MemoryListener`] and [`MemoryDialer`]
//! wrap that in a dial/accept shape so client sessions can be driven without a
//! socket.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use edgewire_transport::{
    CloseCode, CloseFrame, Connection, Dialer, Frame, Result, Target, TransportError,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// One end of an in-memory connection.
pub struct MemoryConnection {
    id: Uuid,
    sender: Mutex<Option<flume::Sender<Frame>>>,
    receiver: flume::Receiver<Frame>,
    closed: CancellationToken,
}

impl Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("id", &self.id)
            .field("closed", &self.closed.is_cancelled())
            .finish()
    }
}

/// Creates two connected ends. Frames written on one are read on the other.
#[must_use]
pub fn pair() -> (MemoryConnection, MemoryConnection) {
    let (left_tx, left_rx) = flume::unbounded();
    let (right_tx, right_rx) = flume::unbounded();

    (
        MemoryConnection::new(left_tx, right_rx),
        MemoryConnection::new(right_tx, left_rx),
    )
}

impl MemoryConnection {
    fn new(sender: flume::Sender<Frame>, receiver: flume::Receiver<Frame>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: Mutex::new(Some(sender)),
            receiver,
            closed: CancellationToken::new(),
        }
    }

    /// Unique id of this end.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Whether [`Connection::close`] has been called on this end.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn send(&self, frame: Frame) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }

        let sender = self.sender.lock().clone();
        match sender {
            Some(sender) => sender
                .send(frame)
                .map_err(|_| TransportError::ConnectionClosed),
            None => Err(TransportError::ConnectionClosed),
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn read_frame(&self) -> Result<Frame> {
        if self.closed.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }

        tokio::select! {
            frame = self.receiver.recv_async() => {
                frame.map_err(|_| TransportError::ConnectionClosed)
            }
            () = self.closed.cancelled() => Err(TransportError::ConnectionClosed),
        }
    }

    async fn write_frame(&self, frame: Frame) -> Result<()> {
        self.send(frame)
    }

    async fn write_close(&self, code: CloseCode, reason: &str, _deadline: Duration) -> Result<()> {
        let payload = if code.is_reserved() {
            None
        } else {
            Some(CloseFrame {
                code,
                reason: reason.to_string(),
            })
        };
        self.send(Frame::Close(payload))
    }

    async fn close(&self) -> Result<()> {
        debug!(connection_id = %self.id, "closing memory connection");
        self.closed.cancel();
        self.sender.lock().take();
        Ok(())
    }
}

/// Accepts connections dialed through its [`MemoryDialer`]s.
pub struct MemoryListener {
    incoming_tx: flume::Sender<MemoryConnection>,
    incoming_rx: flume::Receiver<MemoryConnection>,
}

impl Debug for MemoryListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryListener")
            .field("pending", &self.incoming_rx.len())
            .finish()
    }
}

impl Default for MemoryListener {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryListener {
    /// Creates a listener with no pending connections.
    #[must_use]
    pub fn new() -> Self {
        let (incoming_tx, incoming_rx) = flume::unbounded();
        Self {
            incoming_tx,
            incoming_rx,
        }
    }

    /// Returns a dialer whose connections arrive at this listener.
    ///
    /// Dials fail once the listener is dropped.
    #[must_use]
    pub fn dialer(&self) -> MemoryDialer {
        MemoryDialer {
            incoming_tx: self.incoming_tx.downgrade(),
            dials: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Waits for the next dialed connection and returns the server end.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if no dialer can reach the
    /// listener any more.
    pub async fn accept(&self) -> Result<MemoryConnection> {
        let connection = self
            .incoming_rx
            .recv_async()
            .await
            .map_err(|_| TransportError::ConnectionClosed)?;
        info!(connection_id = %connection.id, "memory listener accepted connection");
        Ok(connection)
    }
}

/// [`Dialer`] that connects to a [`MemoryListener`] regardless of target.
#[derive(Clone, Debug)]
pub struct MemoryDialer {
    incoming_tx: flume::WeakSender<MemoryConnection>,
    dials: Arc<AtomicUsize>,
}

impl MemoryDialer {
    /// Number of dial attempts made through this dialer and its clones.
    #[must_use]
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialer for MemoryDialer {
    async fn dial(&self, target: &Target) -> Result<Arc<dyn Connection>> {
        self.dials.fetch_add(1, Ordering::SeqCst);

        let incoming_tx = self
            .incoming_tx
            .upgrade()
            .ok_or_else(|| TransportError::ConnectionFailed(format!("{target} is not listening")))?;

        let (client, server) = pair();
        incoming_tx
            .send(server)
            .map_err(|_| TransportError::ConnectionFailed(format!("{target} is not listening")))?;

        debug!(connection_id = %client.id, %target, "memory dial succeeded");
        Ok(Arc::new(client))
    }
}
