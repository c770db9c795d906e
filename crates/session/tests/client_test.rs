//! Client session behaviour against an in-memory peer

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use edgewire_packet::{Datagram, DatagramType, ErrorCondition, Function};
use edgewire_session::{
    Callbacks, ClientSession, ClientSessionFactory, ClientSessionHandler, Error, KeepaliveConfig,
    Session, SessionConfig, SessionState,
};
use edgewire_transport::{CloseCode, CloseFrame, Connection, Frame, Target, TransportError};
use edgewire_transport_memory::{MemoryConnection, MemoryListener};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Default)]
struct Recorder {
    created: AtomicUsize,
    destroyed: AtomicUsize,
    reply_to_requests: bool,
}

#[async_trait]
impl ClientSessionHandler for Recorder {
    async fn on_session_created(&self, _session: &ClientSession) {
        self.created.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_session_destroyed(&self, _session: &ClientSession) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_message_received(&self, session: &ClientSession, datagram: Datagram) {
        if self.reply_to_requests {
            let reply = Datagram::result(datagram.id, datagram.function).with_argument("pong");
            session.send(reply).await.unwrap();
        }
    }
}

struct Harness {
    listener: MemoryListener,
    factory: ClientSessionFactory,
    recorder: Arc<Recorder>,
    session: ClientSession,
}

fn target() -> Target {
    Target::new("cpe.example.net", 443, "/iface/v1/cpe")
}

impl Harness {
    fn new(recorder: Recorder) -> Self {
        let listener = MemoryListener::new();
        let factory =
            ClientSessionFactory::new(Arc::new(listener.dialer()), SessionConfig::default());
        let recorder = Arc::new(recorder);
        let session = factory.create(Arc::clone(&recorder) as Arc<dyn ClientSessionHandler>);

        Self {
            listener,
            factory,
            recorder,
            session,
        }
    }

    async fn open(
        &self,
        keepalive: KeepaliveConfig,
    ) -> (MemoryConnection, JoinHandle<edgewire_session::Result<()>>) {
        let created = self.recorder.created.load(Ordering::SeqCst);
        let session = self.session.clone();
        let task = tokio::spawn(async move { session.open(&target(), keepalive).await });

        let peer = self.listener.accept().await.unwrap();
        while self.recorder.created.load(Ordering::SeqCst) == created {
            tokio::task::yield_now().await;
        }
        (peer, task)
    }
}

fn idle() -> KeepaliveConfig {
    KeepaliveConfig::new(Duration::from_secs(3600))
}

async fn next_datagram(peer: &MemoryConnection) -> Datagram {
    loop {
        if let Frame::Text(text) = peer.read_frame().await.unwrap() {
            return Datagram::decode(&text).unwrap();
        }
    }
}

async fn peer_send(peer: &MemoryConnection, datagram: &Datagram) {
    peer.write_frame(Frame::Text(datagram.encode().unwrap()))
        .await
        .unwrap();
}

#[test]
fn test_factories_number_sessions_independently() {
    let first = MemoryListener::new();
    let second = MemoryListener::new();
    let handler: Arc<dyn ClientSessionHandler> = Arc::new(Recorder::default());

    let a = ClientSessionFactory::new(Arc::new(first.dialer()), SessionConfig::default());
    let b = ClientSessionFactory::new(Arc::new(second.dialer()), SessionConfig::default());

    assert_eq!(a.create(Arc::clone(&handler)).id(), "1");
    assert_eq!(a.create(Arc::clone(&handler)).id(), "2");
    assert_eq!(b.create(handler).id(), "1");
}

#[tokio::test(start_paused = true)]
async fn test_deliver_requires_connected() {
    let _ = tracing_subscriber::fmt::try_init();
    let harness = Harness::new(Recorder::default());

    assert_eq!(harness.session.state(), SessionState::Closed);
    let result = harness.session.send(Datagram::ping()).await;
    assert!(matches!(result, Err(Error::NotReady)));
}

#[tokio::test(start_paused = true)]
async fn test_open_twice_is_rejected() {
    let _ = tracing_subscriber::fmt::try_init();
    let harness = Harness::new(Recorder::default());
    let (_peer, _task) = harness.open(idle()).await;

    assert!(harness.session.is_connected());
    let second = harness.session.open(&target(), idle()).await;
    assert!(matches!(second, Err(Error::AlreadyOpened)));
}

#[tokio::test(start_paused = true)]
async fn test_dial_failure_reverts_to_closed() {
    let _ = tracing_subscriber::fmt::try_init();

    let dialer = MemoryListener::new().dialer();
    let factory = ClientSessionFactory::new(Arc::new(dialer.clone()), SessionConfig::default());
    let recorder = Arc::new(Recorder::default());
    let session = factory.create(Arc::clone(&recorder) as Arc<dyn ClientSessionHandler>);

    for attempt in 1..=2 {
        let result = session.open(&target(), idle()).await;
        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::ConnectionFailed(_)))
        ));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(dialer.dial_count(), attempt);
    }
    assert_eq!(recorder.created.load(Ordering::SeqCst), 0);
    assert_eq!(recorder.destroyed.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_request_answered_in_time() {
    let _ = tracing_subscriber::fmt::try_init();
    let harness = Harness::new(Recorder::default());
    let (peer, _task) = harness.open(idle()).await;

    let (tx, rx) = oneshot::channel();
    let mut request = Datagram::request(&Function::Identify);
    request.id = "abc".to_string();

    harness
        .session
        .deliver(
            request,
            Duration::from_secs(1),
            Callbacks::new().on_result(move |id, arguments| {
                let _ = tx.send((id.to_string(), arguments));
            }),
        )
        .await
        .unwrap();
    assert_eq!(harness.session.pending_calls(), 1);

    let received = next_datagram(&peer).await;
    assert_eq!(received.id, "abc");
    assert_eq!(received.kind, DatagramType::Request);
    peer_send(&peer, &Datagram::result("abc", "")).await;

    assert_eq!(rx.await.unwrap(), ("abc".to_string(), Vec::new()));
    assert_eq!(harness.session.pending_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_request_times_out_and_late_reply_is_dropped() {
    let _ = tracing_subscriber::fmt::try_init();
    let harness = Harness::new(Recorder::default());
    let (peer, _task) = harness.open(idle()).await;

    let results = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = oneshot::channel();
    let mut request = Datagram::request(&Function::Reboot);
    request.id = "x1".to_string();

    let on_result = Arc::clone(&results);
    harness
        .session
        .deliver(
            request,
            Duration::from_secs(2),
            Callbacks::new()
                .on_result(move |_, _| {
                    on_result.fetch_add(1, Ordering::SeqCst);
                })
                .on_timeout(move |id, timeout| {
                    let _ = tx.send((id.to_string(), timeout));
                }),
        )
        .await
        .unwrap();

    assert_eq!(next_datagram(&peer).await.id, "x1");
    assert_eq!(
        rx.await.unwrap(),
        ("x1".to_string(), Duration::from_secs(2))
    );
    assert_eq!(harness.session.pending_calls(), 0);

    peer_send(&peer, &Datagram::result("x1", "")).await;
    // A datagram sent after the late reply proves the reply was processed.
    peer_send(&peer, &Datagram::result("unrelated", "")).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(results.load(Ordering::SeqCst), 0);
    assert!(harness.session.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_call_maps_error_reply() {
    let _ = tracing_subscriber::fmt::try_init();
    let harness = Harness::new(Recorder::default());
    let (peer, _task) = harness.open(idle()).await;

    let session = harness.session.clone();
    let call = tokio::spawn(async move {
        session
            .call(
                Datagram::request(&Function::BusCall).with_argument("Get"),
                Duration::from_secs(5),
            )
            .await
    });

    let request = next_datagram(&peer).await;
    assert_eq!(request.arguments, vec![json!("Get")]);
    peer_send(
        &peer,
        &Datagram::error(
            request.id,
            "F_UBUS",
            ErrorCondition::RemoteServerNotAvailable,
            "bus down",
        ),
    )
    .await;

    match call.await.unwrap() {
        Err(Error::Remote { condition, message }) => {
            assert_eq!(condition, ErrorCondition::RemoteServerNotAvailable);
            assert_eq!(message, "bus down");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_unknown_datagram_type_is_rejected() {
    let _ = tracing_subscriber::fmt::try_init();
    let harness = Harness::new(Recorder::default());
    let (peer, _task) = harness.open(idle()).await;

    peer.write_frame(Frame::Text(
        r#"{"id":"u1","type":"T_BOGUS","function":"F_X","arguments":[]}"#.to_string(),
    ))
    .await
    .unwrap();

    let rejection = next_datagram(&peer).await;
    assert_eq!(rejection.id, "u1");
    assert_eq!(rejection.kind, DatagramType::Error);
    assert_eq!(rejection.function, "F_X");
    assert_eq!(
        rejection.arguments,
        vec![
            json!("E_BAD_REQUEST"),
            json!("UNKNOWN DATAGRAM TYPE -> T_BOGUS")
        ]
    );
    assert!(harness.session.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_frame_is_dropped() {
    let _ = tracing_subscriber::fmt::try_init();
    let harness = Harness::new(Recorder {
        reply_to_requests: true,
        ..Recorder::default()
    });
    let (peer, _task) = harness.open(idle()).await;

    peer.write_frame(Frame::Text("{not json".to_string()))
        .await
        .unwrap();
    let request = Datagram::ping();
    peer_send(&peer, &request).await;

    let reply = next_datagram(&peer).await;
    assert_eq!(reply.id, request.id);
    assert_eq!(reply.kind, DatagramType::Result);
    assert_eq!(reply.arguments, vec![json!("pong")]);
}

#[tokio::test(start_paused = true)]
async fn test_close_is_idempotent() {
    let _ = tracing_subscriber::fmt::try_init();
    let harness = Harness::new(Recorder::default());
    let (peer, task) = harness.open(idle()).await;

    let (first, second) = tokio::join!(
        harness.session.close(CloseCode::NORMAL, "bye"),
        harness.session.close(CloseCode::NORMAL, "bye again"),
    );
    first.unwrap();
    second.unwrap();
    harness
        .session
        .close(CloseCode::GOING_AWAY, "late")
        .await
        .unwrap();

    assert_eq!(harness.recorder.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(harness.session.state(), SessionState::Closed);
    assert!(task.await.unwrap().is_ok());

    let frame = peer.read_frame().await.unwrap();
    assert!(matches!(
        frame,
        Frame::Close(Some(CloseFrame { code: CloseCode::NORMAL, .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_pending_calls() {
    let _ = tracing_subscriber::fmt::try_init();
    let harness = Harness::new(Recorder::default());
    let (peer, _task) = harness.open(idle()).await;

    let session = harness.session.clone();
    let call = tokio::spawn(async move {
        session
            .call(Datagram::request(&Function::Upgrade), Duration::from_secs(60))
            .await
    });
    next_datagram(&peer).await;

    harness
        .session
        .close(CloseCode::NORMAL, "shutting down")
        .await
        .unwrap();

    assert!(matches!(call.await.unwrap(), Err(Error::Cancelled)));
    assert_eq!(harness.session.pending_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_closes_after_two_missed_pings() {
    let _ = tracing_subscriber::fmt::try_init();
    let harness = Harness::new(Recorder::default());
    let keepalive =
        KeepaliveConfig::new(Duration::from_secs(10)).with_ack_timeout(Duration::from_secs(5));
    let (peer, task) = harness.open(keepalive).await;

    let first = next_datagram(&peer).await;
    assert_eq!(first.function(), Function::Ping);

    let second = next_datagram(&peer).await;
    assert_eq!(second.function(), Function::Ping);
    assert_ne!(first.id, second.id);
    assert!(harness.session.is_connected());

    let frame = peer.read_frame().await.unwrap();
    assert_eq!(
        frame,
        Frame::Close(Some(CloseFrame {
            code: CloseCode::NORMAL,
            reason: "PING TIMEOUT".to_string(),
        }))
    );

    assert!(task.await.unwrap().is_ok());
    assert_eq!(harness.session.state(), SessionState::Closed);
    assert_eq!(harness.recorder.destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_answered_pings_keep_session_open() {
    let _ = tracing_subscriber::fmt::try_init();
    let harness = Harness::new(Recorder::default());
    let keepalive =
        KeepaliveConfig::new(Duration::from_secs(10)).with_ack_timeout(Duration::from_secs(5));
    let (peer, _task) = harness.open(keepalive).await;

    // One miss between answered pings never closes the session.
    for round in 0..6 {
        let ping = next_datagram(&peer).await;
        assert_eq!(ping.function(), Function::Ping);
        if round % 2 == 0 {
            peer_send(&peer, &Datagram::result(ping.id, "")).await;
        }
    }
    assert!(harness.session.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_error_replies_count_as_strikes() {
    let _ = tracing_subscriber::fmt::try_init();
    let harness = Harness::new(Recorder::default());
    let (peer, task) = harness.open(Duration::from_secs(10).into()).await;

    for _ in 0..2 {
        let ping = next_datagram(&peer).await;
        peer_send(
            &peer,
            &Datagram::error(ping.id, "F_PING", ErrorCondition::ServiceUnavailable, "busy"),
        )
        .await;
    }

    assert_eq!(
        peer.read_frame().await.unwrap(),
        Frame::Close(Some(CloseFrame {
            code: CloseCode::NORMAL,
            reason: "PING ERROR".to_string(),
        }))
    );
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_binary_frame_closes_session() {
    let _ = tracing_subscriber::fmt::try_init();
    let harness = Harness::new(Recorder::default());
    let (peer, task) = harness.open(idle()).await;

    peer.write_frame(Frame::Binary(bytes_of(b"\x00")))
        .await
        .unwrap();

    assert_eq!(
        peer.read_frame().await.unwrap(),
        Frame::Close(Some(CloseFrame {
            code: CloseCode::INVALID_PAYLOAD,
            reason: "ONLY TEXT PAYLOAD WILL BE ACCEPTED".to_string(),
        }))
    );
    assert!(task.await.unwrap().is_ok());
    assert_eq!(harness.recorder.destroyed.load(Ordering::SeqCst), 1);
}

fn bytes_of(data: &'static [u8]) -> bytes::Bytes {
    bytes::Bytes::from_static(data)
}

#[tokio::test(start_paused = true)]
async fn test_peer_close_runs_close_handler() {
    let _ = tracing_subscriber::fmt::try_init();
    let harness = Harness::new(Recorder::default());
    let (peer, task) = harness.open(idle()).await;

    peer.write_close(CloseCode::GOING_AWAY, "server restart", Duration::from_secs(1))
        .await
        .unwrap();

    assert!(task.await.unwrap().is_ok());
    assert_eq!(harness.session.state(), SessionState::Closed);
    assert_eq!(harness.recorder.destroyed.load(Ordering::SeqCst), 1);

    // The close handler does not answer with a close frame of its own.
    harness
        .session
        .close(CloseCode::NORMAL, "again")
        .await
        .unwrap();
    assert_eq!(harness.recorder.destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_read_error_closes_abnormally() {
    let _ = tracing_subscriber::fmt::try_init();
    let harness = Harness::new(Recorder::default());
    let (peer, task) = harness.open(idle()).await;

    peer.close().await.unwrap();

    let result = task.await.unwrap();
    assert!(matches!(
        result,
        Err(Error::Transport(TransportError::ConnectionClosed))
    ));
    assert_eq!(harness.session.state(), SessionState::Closed);
    assert_eq!(harness.recorder.destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_session_reopens_after_close() {
    let _ = tracing_subscriber::fmt::try_init();
    let harness = Harness::new(Recorder {
        reply_to_requests: true,
        ..Recorder::default()
    });

    let (_first_peer, first_task) = harness.open(idle()).await;
    harness
        .session
        .close(CloseCode::NORMAL, "reconnect")
        .await
        .unwrap();
    first_task.await.unwrap().unwrap();

    let (peer, _task) = harness.open(idle()).await;
    assert_eq!(harness.recorder.created.load(Ordering::SeqCst), 2);
    assert_eq!(harness.session.id(), "1");

    let request = Datagram::ping();
    peer_send(&peer, &request).await;
    assert_eq!(next_datagram(&peer).await.id, request.id);

    let other = harness
        .factory
        .create(Arc::new(Recorder::default()) as Arc<dyn ClientSessionHandler>);
    assert_eq!(other.id(), "2");
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_deliveries_each_write_one_frame() {
    let _ = tracing_subscriber::fmt::try_init();
    let harness = Harness::new(Recorder::default());
    let (peer, _task) = harness.open(idle()).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut writers = Vec::new();
    for n in 0..16 {
        let session = harness.session.clone();
        let tx = tx.clone();
        writers.push(tokio::spawn(async move {
            let outcome = session
                .call(
                    Datagram::request(&Function::BusCall).with_argument(n),
                    Duration::from_secs(30),
                )
                .await;
            tx.send(outcome).unwrap();
        }));
    }
    drop(tx);

    for _ in 0..16 {
        let request = next_datagram(&peer).await;
        let n = request.arguments[0].clone();
        peer_send(&peer, &Datagram::result(request.id, "").with_argument(n)).await;
    }

    let mut answered = Vec::new();
    while let Some(outcome) = rx.recv().await {
        answered.push(outcome.unwrap()[0].as_i64().unwrap());
    }
    answered.sort_unstable();
    assert_eq!(answered, (0..16).collect::<Vec<_>>());
    assert_eq!(harness.session.pending_calls(), 0);
}
