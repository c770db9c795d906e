use std::time::Duration;

use async_trait::async_trait;
use edgewire_packet::{Datagram, Value};
use edgewire_transport::CloseCode;

use crate::error::{Error, Result};
use crate::ledger::Callbacks;
use crate::state::SessionState;

/// Operations every session variant supports.
#[async_trait]
pub trait Session: Send + Sync {
    /// Identifier of this session.
    fn id(&self) -> &str;

    /// Current lifecycle state.
    fn state(&self) -> SessionState;

    /// Writes `datagram` as one text frame.
    ///
    /// For a `T_REQUEST`, `callbacks` are registered under the datagram id
    /// before the write and settle after a reply or `timeout`. If the write
    /// fails they are dropped without running. Other datagram types ignore
    /// `timeout` and `callbacks`.
    ///
    /// # Errors
    ///
    /// [`Error::NotReady`] unless `Connected`, or the encode/transport error.
    async fn deliver(&self, datagram: Datagram, timeout: Duration, callbacks: Callbacks)
    -> Result<()>;

    /// Writes `datagram` without tracking a reply.
    ///
    /// # Errors
    ///
    /// Same as [`Session::deliver`].
    async fn send(&self, datagram: Datagram) -> Result<()>;

    /// Closes the session. Closing a closed session does nothing.
    ///
    /// # Errors
    ///
    /// Currently infallible; transport errors during teardown are logged.
    async fn close(&self, code: CloseCode, reason: &str) -> Result<()>;

    /// Sends a request and waits for its outcome.
    ///
    /// # Errors
    ///
    /// [`Error::Remote`] for an error reply, [`Error::Timeout`] when no reply
    /// arrives in time, [`Error::Cancelled`] if the session closes first, or
    /// any error of [`Session::deliver`].
    async fn call(&self, datagram: Datagram, timeout: Duration) -> Result<Vec<Value>> {
        let (callbacks, outcome) = Callbacks::channel();
        self.deliver(datagram, timeout, callbacks).await?;
        outcome.await.unwrap_or(Err(Error::Cancelled))
    }
}
