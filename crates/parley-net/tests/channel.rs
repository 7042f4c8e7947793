//! Integration tests for the connection manager.
//!
//! These tests use an in-memory connector whose transports are scripted by
//! the test, so reconnection, fallback and handshake ordering can be checked
//! without a server. Time is paused so backoff delays run instantly.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use parley_net::channel::{
    ChannelConfig, ChannelEvent, ChannelHandle, ClientEvent, ConnectionManager, Connector, RoomId,
    ServerEvent, Transport, TransportKind,
};
use parley_net::{Error, Result};

/// Server side of a mock transport.
struct Peer {
    /// Frames for the client; `None` closes the transport.
    to_client: mpsc::UnboundedSender<Option<String>>,
    /// Frames the client sent.
    sent: Arc<Mutex<Vec<String>>>,
}

impl Peer {
    fn push(&self, frame: &str) {
        self.to_client.send(Some(frame.to_string())).unwrap();
    }

    fn hang_up(&self) {
        self.to_client.send(None).unwrap();
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Option<String>>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        Ok(self.inbound.recv().await.flatten())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

enum Script {
    Refuse,
    Accept(MockTransport),
}

/// Connector that plays back a script, one entry per `connect` call.
#[derive(Clone, Default)]
struct MockConnector {
    script: Arc<Mutex<VecDeque<Script>>>,
    attempts: Arc<Mutex<Vec<TransportKind>>>,
}

impl MockConnector {
    fn refuse(&self, times: usize) {
        let mut script = self.script.lock().unwrap();
        for _ in 0..times {
            script.push_back(Script::Refuse);
        }
    }

    fn accept(&self) -> Peer {
        let (to_client, inbound) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        self.script
            .lock()
            .unwrap()
            .push_back(Script::Accept(MockTransport {
                inbound,
                sent: Arc::clone(&sent),
            }));
        Peer { to_client, sent }
    }

    fn attempts(&self) -> Vec<TransportKind> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, kind: TransportKind, _config: &ChannelConfig) -> Result<MockTransport> {
        self.attempts.lock().unwrap().push(kind);
        match self.script.lock().unwrap().pop_front() {
            Some(Script::Accept(transport)) => Ok(transport),
            Some(Script::Refuse) | None => Err(Error::NotConnected),
        }
    }
}

fn config(transports: &[TransportKind]) -> ChannelConfig {
    ChannelConfig::builder("http://chat.test", "alice")
        .unwrap()
        .transports(transports.to_vec())
        .build()
}

fn start(
    config: ChannelConfig,
    connector: MockConnector,
) -> (ChannelHandle, mpsc::Receiver<ChannelEvent>) {
    let (tx, rx) = mpsc::channel(64);
    let (handle, _task) = ConnectionManager::spawn(config, connector, tx);
    (handle, rx)
}

async fn next(events: &mut mpsc::Receiver<ChannelEvent>) -> ChannelEvent {
    tokio::time::timeout(Duration::from_secs(120), events.recv())
        .await
        .expect("timed out waiting for channel event")
        .expect("manager stopped")
}

/// Waits for the manager to drain its command queue.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_authenticates_before_joining_rooms() {
    let connector = MockConnector::default();
    let peer = connector.accept();
    let (handle, mut events) = start(config(&[TransportKind::WebSocket]), connector);

    assert_eq!(
        next(&mut events).await,
        ChannelEvent::Connected {
            transport: TransportKind::WebSocket
        }
    );
    assert!(handle.is_connected());

    tokio_test::assert_ok!(handle.join_room(RoomId::for_pair("bob", "alice")));
    settle().await;

    assert_eq!(
        peer.sent(),
        vec![
            r#"{"event":"authenticate","data":"alice"}"#.to_string(),
            r#"{"event":"join_room","data":"alice_bob"}"#.to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_falls_back_to_polling() {
    let connector = MockConnector::default();
    connector.refuse(1);
    let _peer = connector.accept();
    let (_handle, mut events) = start(
        config(&[TransportKind::WebSocket, TransportKind::Polling]),
        connector.clone(),
    );

    assert_eq!(
        next(&mut events).await,
        ChannelEvent::Connected {
            transport: TransportKind::Polling
        }
    );
    assert_eq!(
        connector.attempts(),
        vec![TransportKind::WebSocket, TransportKind::Polling]
    );
}

#[tokio::test(start_paused = true)]
async fn test_linear_backoff_between_attempts() {
    let connector = MockConnector::default();
    connector.refuse(3);
    let _peer = connector.accept();
    let started = Instant::now();
    let (_handle, mut events) = start(config(&[TransportKind::WebSocket]), connector);

    assert!(matches!(
        next(&mut events).await,
        ChannelEvent::Connected { .. }
    ));
    // 1s + 2s + 3s
    assert!(started.elapsed() >= Duration::from_secs(6));
    assert!(started.elapsed() < Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_waits_for_foreground_then_retries_once() {
    let connector = MockConnector::default();
    connector.refuse(5);
    let (handle, mut events) = start(config(&[TransportKind::WebSocket]), connector.clone());

    assert_eq!(
        next(&mut events).await,
        ChannelEvent::RetriesExhausted { attempts: 5 }
    );
    assert!(!handle.is_connected());
    assert_eq!(connector.attempts().len(), 5);

    // Nothing happens on its own.
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.attempts().len(), 5);

    // One more failure after foreground, then wait again.
    connector.refuse(1);
    handle.foreground().unwrap();
    assert_eq!(
        next(&mut events).await,
        ChannelEvent::RetriesExhausted { attempts: 1 }
    );
    assert_eq!(connector.attempts().len(), 6);

    let _peer = connector.accept();
    handle.foreground().unwrap();
    assert!(matches!(
        next(&mut events).await,
        ChannelEvent::Connected { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_rejoins_rooms() {
    let connector = MockConnector::default();
    let first = connector.accept();
    let (handle, mut events) = start(config(&[TransportKind::WebSocket]), connector.clone());
    assert!(matches!(next(&mut events).await, ChannelEvent::Connected { .. }));

    tokio_test::assert_ok!(handle.join_room(RoomId::for_pair("alice", "bob")));
    settle().await;

    let second = connector.accept();
    first.hang_up();

    assert!(matches!(
        next(&mut events).await,
        ChannelEvent::Disconnected { .. }
    ));
    assert!(matches!(next(&mut events).await, ChannelEvent::Connected { .. }));
    assert_eq!(
        second.sent(),
        vec![
            r#"{"event":"authenticate","data":"alice"}"#.to_string(),
            r#"{"event":"join_room","data":"alice_bob"}"#.to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_forwards_server_events_and_skips_garbage() {
    let connector = MockConnector::default();
    let peer = connector.accept();
    let (_handle, mut events) = start(config(&[TransportKind::WebSocket]), connector);
    assert!(matches!(next(&mut events).await, ChannelEvent::Connected { .. }));

    peer.push(r#"{"event":"typing","data":"bob"}"#);
    peer.push(r#"{"event":"online_users","data":["bob"]}"#);

    assert_eq!(
        next(&mut events).await,
        ChannelEvent::Server(ServerEvent::OnlineUsers(vec!["bob".into()]))
    );
}

#[tokio::test(start_paused = true)]
async fn test_emit_requires_connection() {
    let connector = MockConnector::default();
    connector.refuse(5);
    let (handle, mut events) = start(config(&[TransportKind::WebSocket]), connector);
    assert!(matches!(
        next(&mut events).await,
        ChannelEvent::RetriesExhausted { .. }
    ));

    let err = tokio_test::assert_err!(handle.emit(ClientEvent::Authenticate("alice".into())));
    assert!(matches!(err, Error::NotConnected));
}

#[tokio::test(start_paused = true)]
async fn test_auth_error_stops_retrying() {
    let connector = MockConnector::default();
    let peer = connector.accept();
    let (handle, mut events) = start(config(&[TransportKind::WebSocket]), connector.clone());
    assert!(matches!(next(&mut events).await, ChannelEvent::Connected { .. }));

    peer.push(r#"{"event":"auth_error","data":"unknown participant"}"#);
    assert_eq!(
        next(&mut events).await,
        ChannelEvent::Disconnected {
            reason: "unknown participant".into()
        }
    );

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.attempts().len(), 1);
    assert!(!handle.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_event_stream() {
    let connector = MockConnector::default();
    let _peer = connector.accept();
    let (handle, mut events) = start(config(&[TransportKind::WebSocket]), connector);
    assert!(matches!(next(&mut events).await, ChannelEvent::Connected { .. }));

    handle.shutdown();
    assert!(events.recv().await.is_none());
    assert!(!handle.is_connected());
}
