//! End-to-end tests for the delivery engine.
//!
//! The backend and the channel are in-memory fakes. Each test drives the
//! engine through its handle and observes it through published events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use parley_core::{
    ChannelSink, ConnectionState, Engine, EngineConfig, EngineEvent, EngineHandle, Error,
    MessageStatus, NOTICE_WINDOW, NoticeKind, Participant, ParticipantId, QueueRepository,
    TempId, ValidationError,
};
use parley_net::api::Backend;
use parley_net::channel::{
    AppState, ChannelEvent, ClientEvent, MessageNotification, RoomId, ServerEvent, TransportKind,
};
use parley_net::{
    ConversationRecord, MessageRecord, MessageType, ParticipantRecord, SendMessageRequest,
    UnreadCount,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Persist,
    Unreachable,
    Reject,
}

struct MockBackend {
    mode: Mutex<Mode>,
    next_id: AtomicUsize,
    sent: Mutex<Vec<SendMessageRequest>>,
    conversations: Mutex<Vec<ConversationRecord>>,
    history: Mutex<HashMap<String, Vec<MessageRecord>>>,
    unread: AtomicU32,
    marked_read: Mutex<Vec<String>>,
}

impl MockBackend {
    fn new(mode: Mode) -> Self {
        Self {
            mode: Mutex::new(mode),
            next_id: AtomicUsize::new(1),
            sent: Mutex::new(Vec::new()),
            conversations: Mutex::new(Vec::new()),
            history: Mutex::new(HashMap::new()),
            unread: AtomicU32::new(0),
            marked_read: Mutex::new(Vec::new()),
        }
    }

    fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    fn mode(&self) -> Mode {
        *self.mode.lock().unwrap()
    }

    fn unreachable<T>(&self) -> parley_net::Result<T> {
        Err(parley_net::Error::Timeout(Duration::from_secs(15)))
    }
}

impl Backend for MockBackend {
    async fn send_message(&self, request: SendMessageRequest) -> parley_net::Result<MessageRecord> {
        self.sent.lock().unwrap().push(request.clone());
        match self.mode() {
            Mode::Unreachable => self.unreachable(),
            Mode::Reject => Err(parley_net::Error::Status {
                status: 400,
                message: "recipient blocked".into(),
            }),
            Mode::Persist => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                Ok(MessageRecord {
                    id: format!("m{id}"),
                    sender: "alice".into(),
                    recipient: request.recipient,
                    content: request.content,
                    message_type: request.message_type,
                    created_at: Utc::now(),
                    is_read: false,
                    temp_id: request.temp_id,
                })
            }
        }
    }

    async fn conversations(&self) -> parley_net::Result<Vec<ConversationRecord>> {
        if self.mode() == Mode::Unreachable {
            return self.unreachable();
        }
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn conversation_messages(
        &self,
        participant: String,
    ) -> parley_net::Result<Vec<MessageRecord>> {
        if self.mode() == Mode::Unreachable {
            return self.unreachable();
        }
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(&participant)
            .cloned()
            .unwrap_or_default())
    }

    async fn unread_count(&self) -> parley_net::Result<UnreadCount> {
        if self.mode() == Mode::Unreachable {
            return self.unreachable();
        }
        Ok(UnreadCount {
            unread_count: self.unread.load(Ordering::SeqCst),
        })
    }

    async fn mark_conversation_read(&self, participant: String) -> parley_net::Result<()> {
        self.marked_read.lock().unwrap().push(participant);
        Ok(())
    }

    async fn mark_message_read(&self, _message_id: String) -> parley_net::Result<()> {
        Ok(())
    }
}

/// Channel sink that records what the engine emits.
#[derive(Clone, Default)]
struct FakeChannel {
    up: Arc<AtomicBool>,
    emitted: Arc<Mutex<Vec<ClientEvent>>>,
    joined: Arc<Mutex<Vec<RoomId>>>,
    left: Arc<Mutex<Vec<RoomId>>>,
}

impl FakeChannel {
    fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    fn emitted_contents(&self) -> Vec<String> {
        self.emitted
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ClientEvent::SendMessage(m) => Some(m.content.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ChannelSink for FakeChannel {
    fn emit(&self, event: ClientEvent) -> parley_net::Result<()> {
        if !self.up.load(Ordering::SeqCst) {
            return Err(parley_net::Error::NotConnected);
        }
        self.emitted.lock().unwrap().push(event);
        Ok(())
    }

    fn join_room(&self, room: RoomId) -> parley_net::Result<()> {
        self.joined.lock().unwrap().push(room);
        Ok(())
    }

    fn leave_room(&self, room: RoomId) -> parley_net::Result<()> {
        self.left.lock().unwrap().push(room);
        Ok(())
    }

    fn app_state_changed(&self, _state: AppState) -> parley_net::Result<()> {
        Ok(())
    }
}

struct Harness {
    handle: EngineHandle,
    backend: Arc<MockBackend>,
    channel: FakeChannel,
    channel_tx: mpsc::Sender<ChannelEvent>,
    events: broadcast::Receiver<EngineEvent>,
    queue: QueueRepository,
    task: JoinHandle<()>,
}

impl Harness {
    async fn start(mode: Mode, online: bool) -> Self {
        Self::start_with_queue(mode, online, QueueRepository::in_memory().await.unwrap()).await
    }

    async fn start_with_queue(mode: Mode, online: bool, queue: QueueRepository) -> Self {
        let backend = Arc::new(MockBackend::new(mode));
        let channel = FakeChannel::default();
        let (channel_tx, channel_events) = mpsc::channel(16);
        let config = EngineConfig::new(Participant::new("alice", "Alice")).initially_online(online);

        let (engine, handle) = Engine::new(
            config,
            Arc::clone(&backend),
            channel.clone(),
            channel_events,
            queue.clone(),
        );
        let events = handle.subscribe();
        let task = tokio::spawn(engine.run());

        handle
            .add_participant(Participant::new("bob", "Bob"))
            .await
            .unwrap();

        Self {
            handle,
            backend,
            channel,
            channel_tx,
            events,
            queue,
            task,
        }
    }

    async fn connect(&mut self) {
        self.channel.set_up(true);
        self.channel_tx
            .send(ChannelEvent::Connected {
                transport: TransportKind::WebSocket,
            })
            .await
            .unwrap();
        self.wait_for(|e| matches!(e, EngineEvent::ConnectionChanged(s) if s.is_connected))
            .await;
    }

    async fn push(&self, event: ServerEvent) {
        self.channel_tx
            .send(ChannelEvent::Server(event))
            .await
            .unwrap();
    }

    async fn wait_for(&mut self, pred: impl Fn(&EngineEvent) -> bool) -> EngineEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match self.events.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => panic!("engine stopped"),
                }
            }
        })
        .await
        .expect("timed out waiting for engine event")
    }

    /// Waits until the message keyed by `temp_id` reaches `status`.
    async fn wait_for_status(&mut self, temp_id: &TempId, status: MessageStatus) {
        loop {
            let settled = self
                .bob_messages()
                .await
                .iter()
                .any(|m| m.temp_id.as_ref() == Some(temp_id) && m.status == status);
            if settled {
                return;
            }
            self.wait_for(|e| matches!(e, EngineEvent::MessageUpdated { .. }))
                .await;
        }
    }

    async fn bob_messages(&self) -> Vec<parley_core::Message> {
        self.handle
            .messages(ParticipantId::new("bob"))
            .await
            .unwrap()
    }

    async fn stop(self) {
        self.handle.shutdown().await;
        self.task.await.unwrap();
    }
}

fn inbound(id: &str, content: &str) -> MessageRecord {
    MessageRecord {
        id: id.into(),
        sender: "bob".into(),
        recipient: "alice".into(),
        content: content.into(),
        message_type: MessageType::Text,
        created_at: Utc::now(),
        is_read: false,
        temp_id: None,
    }
}

#[tokio::test]
async fn test_online_send_is_persisted_once() {
    let mut h = Harness::start(Mode::Persist, true).await;
    h.connect().await;

    let temp_id = h.handle.send_text("bob", "Hi").await.unwrap();
    h.wait_for(|e| {
        matches!(e, EngineEvent::MessageUpdated { message, .. }
            if message.id.is_some() && message.status == MessageStatus::Sent)
    })
    .await;

    let messages = h.bob_messages().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].temp_id.is_none());
    assert_eq!(messages[0].content, "Hi");

    let sent = h.backend.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].temp_id.as_deref(), Some(temp_id.as_str()));
    assert!(h.channel.emitted_contents().is_empty());

    // The server's own confirmation does not add a copy.
    let mut echo = inbound("m1", "Hi");
    echo.sender = "alice".into();
    echo.recipient = "bob".into();
    h.push(ServerEvent::MessageSent(echo)).await;
    h.handle.snapshot().await.unwrap();
    assert_eq!(h.bob_messages().await.len(), 1);

    h.stop().await;
}

#[tokio::test]
async fn test_offline_send_is_queued_then_replayed() {
    let mut h = Harness::start(Mode::Unreachable, false).await;

    let temp_id = h.handle.send_text("bob", "Hello").await.unwrap();
    h.wait_for_status(&temp_id, MessageStatus::Queued).await;
    assert_eq!(h.queue.len().await.unwrap(), 1);

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.queued, 1);
    assert!(matches!(
        snapshot.notice,
        Some(NoticeKind::MessagesQueued { count: 1 })
    ));

    h.backend.set_mode(Mode::Persist);
    h.handle.set_online(true).await.unwrap();
    h.connect().await;
    h.wait_for_status(&temp_id, MessageStatus::Sent).await;

    assert!(h.queue.is_empty().await.unwrap());
    assert_eq!(h.channel.emitted_contents(), ["Hello"]);
    let messages = h.bob_messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, MessageStatus::Sent);

    h.stop().await;
}

#[tokio::test]
async fn test_transient_failure_falls_back_to_channel() {
    let mut h = Harness::start(Mode::Unreachable, true).await;
    h.connect().await;

    let temp_id = h.handle.send_text("bob", "over the socket").await.unwrap();
    h.wait_for_status(&temp_id, MessageStatus::Sent).await;

    assert_eq!(h.channel.emitted_contents(), ["over the socket"]);
    assert!(h.queue.is_empty().await.unwrap());

    h.stop().await;
}

#[tokio::test]
async fn test_rejected_message_fails_without_queueing() {
    let mut h = Harness::start(Mode::Reject, true).await;
    h.connect().await;

    let temp_id = h.handle.send_text("bob", "blocked").await.unwrap();
    let event = h
        .wait_for(|e| matches!(e, EngineEvent::SendRejected { .. }))
        .await;
    let EngineEvent::SendRejected { temp_id: rejected, reason } = event else {
        unreachable!();
    };
    assert_eq!(rejected, temp_id);
    assert!(reason.contains("recipient blocked"));

    assert_eq!(h.bob_messages().await[0].status, MessageStatus::Failed);
    assert!(h.queue.is_empty().await.unwrap());
    assert!(h.channel.emitted_contents().is_empty());

    h.stop().await;
}

#[tokio::test]
async fn test_replay_stops_at_first_failed_emit() {
    let mut h = Harness::start(Mode::Unreachable, false).await;

    let first = h.handle.send_text("bob", "A").await.unwrap();
    h.wait_for_status(&first, MessageStatus::Queued).await;
    let second = h.handle.send_text("bob", "B").await.unwrap();
    h.wait_for_status(&second, MessageStatus::Queued).await;

    // The engine believes it is connected, but the channel drops every emit.
    h.connect().await;
    h.channel.set_up(false);
    h.handle.set_online(true).await.unwrap();
    h.handle.snapshot().await.unwrap();

    let statuses: Vec<_> = h.bob_messages().await.iter().map(|m| m.status).collect();
    assert_eq!(statuses, [MessageStatus::Queued, MessageStatus::Queued]);
    let queued: Vec<_> = h
        .queue
        .entries()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.temp_id)
        .collect();
    assert_eq!(queued, [first.clone(), second.clone()]);
    assert!(h.channel.emitted_contents().is_empty());

    // After a reconnect both go out, in order.
    h.channel_tx
        .send(ChannelEvent::Disconnected {
            reason: "dropped".into(),
        })
        .await
        .unwrap();
    h.wait_for(|e| matches!(e, EngineEvent::ConnectionChanged(s) if !s.is_connected))
        .await;
    h.connect().await;
    h.wait_for_status(&second, MessageStatus::Sent).await;

    assert_eq!(h.channel.emitted_contents(), ["A", "B"]);
    assert!(h.queue.is_empty().await.unwrap());

    h.stop().await;
}

#[tokio::test]
async fn test_inbound_duplicates_collapse() {
    let mut h = Harness::start(Mode::Persist, true).await;
    h.backend
        .history
        .lock()
        .unwrap()
        .insert("bob".into(), vec![inbound("m7", "hey")]);
    h.connect().await;

    h.handle.open(ParticipantId::new("bob")).await.unwrap();
    h.wait_for(|e| matches!(e, EngineEvent::ThreadUpdated { .. }))
        .await;

    h.push(ServerEvent::NewMessage(inbound("m7", "hey"))).await;
    h.push(ServerEvent::NewMessage(inbound("m7", "hey"))).await;
    h.handle.snapshot().await.unwrap();

    let messages = h.bob_messages().await;
    assert_eq!(messages.len(), 1);
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.unread_total, 0);
    assert_eq!(
        h.channel.joined.lock().unwrap().clone(),
        [RoomId::for_pair("alice", "bob")]
    );

    h.handle.close().await.unwrap();
    h.handle.snapshot().await.unwrap();
    assert_eq!(
        h.channel.left.lock().unwrap().clone(),
        [RoomId::for_pair("alice", "bob")]
    );

    h.stop().await;
}

#[tokio::test]
async fn test_notifications_count_unread_until_opened() {
    let mut h = Harness::start(Mode::Persist, true).await;
    h.connect().await;

    h.push(ServerEvent::MessageNotification(MessageNotification {
        sender: "bob".into(),
        sender_name: String::new(),
        preview: "are you free?".into(),
        message_id: None,
    }))
    .await;
    let event = h
        .wait_for(|e| matches!(e, EngineEvent::Notification { .. }))
        .await;
    assert_eq!(
        event,
        EngineEvent::Notification {
            sender: ParticipantId::new("bob"),
            sender_name: "Bob".into(),
            preview: "are you free?".into(),
        }
    );
    assert_eq!(h.handle.snapshot().await.unwrap().unread_total, 1);

    h.handle.open(ParticipantId::new("bob")).await.unwrap();
    assert_eq!(h.handle.snapshot().await.unwrap().unread_total, 0);

    // Open conversations do not count or toast.
    h.push(ServerEvent::MessageNotification(MessageNotification {
        sender: "bob".into(),
        sender_name: "Bob".into(),
        preview: "hello?".into(),
        message_id: None,
    }))
    .await;
    assert_eq!(h.handle.snapshot().await.unwrap().unread_total, 0);

    for _ in 0..50 {
        if !h.backend.marked_read.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.backend.marked_read.lock().unwrap().clone(), ["bob"]);

    h.stop().await;
}

#[tokio::test]
async fn test_server_unread_counts_are_authoritative() {
    let mut h = Harness::start(Mode::Persist, true).await;
    h.backend.unread.store(3, Ordering::SeqCst);
    h.backend.conversations.lock().unwrap().push(ConversationRecord {
        participant: ParticipantRecord::new("bob", "Bob"),
        last_message: Some(inbound("m1", "ping")),
        unread_count: 3,
    });

    h.connect().await;
    let (mut listed, mut counted) = (false, false);
    while !(listed && counted) {
        match h
            .wait_for(|e| {
                matches!(
                    e,
                    EngineEvent::ConversationsUpdated | EngineEvent::UnreadTotal(_)
                )
            })
            .await
        {
            EngineEvent::ConversationsUpdated => listed = true,
            EngineEvent::UnreadTotal(total) => {
                assert_eq!(total, 3);
                counted = true;
            }
            _ => {}
        }
    }

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.unread_total, 3);
    assert_eq!(snapshot.server_unread, Some(3));
    assert_eq!(h.bob_messages().await.len(), 1);

    h.stop().await;
}

#[tokio::test]
async fn test_queued_notice_clears_after_window() {
    let mut h = Harness::start(Mode::Unreachable, false).await;
    let started = tokio::time::Instant::now();
    let temp_id = h.handle.send_text("bob", "later").await.unwrap();

    let event = h.wait_for(|e| matches!(e, EngineEvent::Notice(_))).await;
    assert_eq!(
        event,
        EngineEvent::Notice(NoticeKind::MessagesQueued { count: 1 })
    );

    // The queue write is done once the notice is up.
    tokio::time::pause();
    h.wait_for(|e| matches!(e, EngineEvent::NoticeCleared)).await;
    let elapsed = started.elapsed();
    tokio::time::resume();
    assert!(elapsed >= NOTICE_WINDOW);
    assert!(elapsed < NOTICE_WINDOW + Duration::from_secs(1));

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.notice, None);
    assert_eq!(snapshot.queued, 1);
    let messages = h.bob_messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].temp_id.as_ref(), Some(&temp_id));
    assert_eq!(messages[0].status, MessageStatus::Queued);

    h.stop().await;
}

#[tokio::test]
async fn test_channel_confirmation_removes_queued_entry() {
    let mut h = Harness::start(Mode::Unreachable, false).await;
    let temp_id = h.handle.send_text("bob", "Hello").await.unwrap();
    h.wait_for_status(&temp_id, MessageStatus::Queued).await;

    let mut confirmed = inbound("m9", "Hello");
    confirmed.sender = "alice".into();
    confirmed.recipient = "bob".into();
    confirmed.temp_id = Some(temp_id.0.clone());
    h.push(ServerEvent::MessageSent(confirmed)).await;
    h.handle.snapshot().await.unwrap();

    assert!(h.queue.is_empty().await.unwrap());
    let messages = h.bob_messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, MessageStatus::Sent);

    h.stop().await;
}

#[tokio::test]
async fn test_validation_rejects_before_append() {
    let h = Harness::start(Mode::Persist, true).await;

    let result = h.handle.send_text("alice", "note to self").await;
    assert!(matches!(
        result,
        Err(Error::Validation(ValidationError::SelfRecipient))
    ));
    let result = h.handle.send_text("bob", "   ").await;
    assert!(matches!(
        result,
        Err(Error::Validation(ValidationError::EmptyContent))
    ));

    assert!(h.bob_messages().await.is_empty());
    assert!(h.backend.sent.lock().unwrap().is_empty());

    h.stop().await;
}

#[tokio::test]
async fn test_connectivity_changes_are_published() {
    let mut h = Harness::start(Mode::Persist, true).await;
    h.connect().await;
    assert_eq!(
        h.handle.connection_state(),
        ConnectionState {
            is_connected: true,
            is_online: true
        }
    );

    h.handle.set_online(false).await.unwrap();
    h.wait_for(|e| matches!(e, EngineEvent::Notice(NoticeKind::Offline)))
        .await;

    h.channel_tx
        .send(ChannelEvent::RetriesExhausted { attempts: 5 })
        .await
        .unwrap();
    h.wait_for(|e| matches!(e, EngineEvent::ConnectionChanged(s) if !s.is_connected))
        .await;
    assert_eq!(h.handle.connection_state(), ConnectionState::default());

    h.stop().await;
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("parley.db");
    let path = path.to_str().unwrap();

    let mut first = Harness::start_with_queue(
        Mode::Unreachable,
        false,
        QueueRepository::new(path).await.unwrap(),
    )
    .await;
    let temp_id = first.handle.send_text("bob", "still here").await.unwrap();
    first.wait_for_status(&temp_id, MessageStatus::Queued).await;
    first.stop().await;

    let mut second = Harness::start_with_queue(
        Mode::Persist,
        false,
        QueueRepository::new(path).await.unwrap(),
    )
    .await;
    let restored = second.bob_messages().await;
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].temp_id.as_ref(), Some(&temp_id));
    assert_eq!(restored[0].status, MessageStatus::Queued);

    second.handle.set_online(true).await.unwrap();
    second.connect().await;
    second.wait_for_status(&temp_id, MessageStatus::Sent).await;
    assert_eq!(second.channel.emitted_contents(), ["still here"]);
    assert!(second.queue.is_empty().await.unwrap());

    second.stop().await;
}

#[tokio::test]
async fn test_commands_wait_for_the_engine() {
    let (_channel_tx, channel_events) = mpsc::channel(16);
    let (mut engine, handle) = Engine::new(
        EngineConfig::new(Participant::new("alice", "Alice")).initially_online(false),
        Arc::new(MockBackend::new(Mode::Persist)),
        FakeChannel::default(),
        channel_events,
        QueueRepository::in_memory().await.unwrap(),
    );

    let mut snapshot = tokio_test::task::spawn(handle.snapshot());
    tokio_test::assert_pending!(snapshot.poll());

    assert!(engine.step().await);
    assert!(snapshot.is_woken());
    let snapshot = tokio_test::assert_ready_ok!(snapshot.poll());
    assert_eq!(snapshot.active, None);
    assert_eq!(snapshot.queued, 0);
    assert!(!snapshot.connection.is_online);

    handle.shutdown().await;
    assert!(!engine.step().await);
    drop(engine);

    tokio_test::assert_err!(handle.snapshot().await);
}
