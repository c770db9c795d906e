use async_trait::async_trait;
use edgewire_packet::Datagram;

use crate::client::ClientSession;
use crate::server::ServerSession;

/// Application hooks of a [`ClientSession`].
///
/// Hooks run on the session's read task. A hook that needs to wait for a
/// reply must spawn a task, or it would block the read loop that delivers the
/// reply.
#[async_trait]
pub trait ClientSessionHandler: Send + Sync + 'static {
    /// The connection is up and the session is `Connected`.
    async fn on_session_created(&self, _session: &ClientSession) {}

    /// The session closed. Runs once per successful `open`.
    async fn on_session_destroyed(&self, _session: &ClientSession) {}

    /// A `T_REQUEST` datagram arrived. Any reply is the handler's to send.
    async fn on_message_received(&self, session: &ClientSession, datagram: Datagram);
}

/// Application hooks of a [`ServerSession`].
///
/// The same threading rules as [`ClientSessionHandler`] apply.
#[async_trait]
pub trait ServerSessionHandler: Send + Sync + 'static {
    /// `serve` started.
    async fn on_session_created(&self, _session: &ServerSession) {}

    /// The session closed. Runs at most once.
    async fn on_session_destroyed(&self, _session: &ServerSession) {}

    /// A `T_REQUEST` datagram arrived. Any reply is the handler's to send.
    async fn on_message_received(&self, session: &ServerSession, datagram: Datagram);

    /// The peer showed it is alive: a transport ping or an `F_PING` request.
    async fn on_session_heartbeat(&self, _session: &ServerSession) {}
}
