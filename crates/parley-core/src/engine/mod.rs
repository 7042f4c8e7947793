//! The delivery engine.
//!
//! One task owns all conversation state. It consumes UI commands, channel
//! events and the results of backend calls it spawned, in that priority
//! order, and publishes [`EngineEvent`]s. Backend calls never run on the
//! engine task, so a slow backend cannot stall channel events.
//!
//! # Example
//!
//! ```ignore
//! let (engine, handle) = Engine::new(config, backend, channel, channel_events, queue);
//! tokio::spawn(engine.with_cache(cache).run());
//!
//! let temp_id = handle.send_text("bob", "Hi").await?;
//! ```

mod config;
mod event;
mod handle;
mod sink;

use std::future::Future;
use std::sync::Arc;

use parley_net::MessageRecord;
use parley_net::api::Backend;
use parley_net::channel::{ChannelEvent, ClientEvent, RoomId, ServerEvent};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

pub use config::EngineConfig;
pub use event::EngineEvent;
pub use handle::{EngineHandle, EngineSnapshot};
pub use sink::ChannelSink;

use handle::Command;

use crate::Result;
use crate::cache::CacheRepository;
use crate::gateway::{DurableOutcome, DurableSendGateway, SendRoute, route};
use crate::message::{Message, MessageId, MessageStatus, ParticipantId, TempId};
use crate::presence::{ConnectionState, NOTICE_WINDOW, NoticeKind, PresenceTracker, Transition};
use crate::queue::{QueueRepository, QueuedMessage};
use crate::reconciler::{Reconciler, Refresh};
use crate::store::{ConversationStore, MergeOutcome};

/// Results of work the engine spawned.
enum Loopback {
    Durable {
        participant: ParticipantId,
        temp_id: TempId,
        result: parley_net::Result<MessageRecord>,
    },
    Refreshed(Refresh),
    NoticeExpired(u64),
}

/// Owns conversation state and coordinates delivery.
pub struct Engine<B, S> {
    gateway: DurableSendGateway<B>,
    reconciler: Reconciler<B>,
    channel: S,
    store: ConversationStore,
    queue: QueueRepository,
    cache: Option<CacheRepository>,
    presence: PresenceTracker,
    connection: ConnectionState,
    server_unread: Option<u32>,
    commands: mpsc::Receiver<Command>,
    channel_events: mpsc::Receiver<ChannelEvent>,
    loopback_tx: mpsc::UnboundedSender<Loopback>,
    loopback: mpsc::UnboundedReceiver<Loopback>,
    events: broadcast::Sender<EngineEvent>,
    state: watch::Sender<ConnectionState>,
}

impl<B: Backend, S: ChannelSink> Engine<B, S> {
    /// Creates an engine and its handle.
    ///
    /// `channel_events` is the receiving end of the connection manager's
    /// event channel.
    pub fn new(
        config: EngineConfig,
        backend: Arc<B>,
        channel: S,
        channel_events: mpsc::Receiver<ChannelEvent>,
        queue: QueueRepository,
    ) -> (Self, EngineHandle) {
        let (commands_tx, commands) = mpsc::channel(config.command_capacity.max(1));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let connection = ConnectionState {
            is_connected: false,
            is_online: config.initially_online,
        };
        let (state, state_rx) = watch::channel(connection);
        let (loopback_tx, loopback) = mpsc::unbounded_channel();

        let engine = Self {
            gateway: DurableSendGateway::new(Arc::clone(&backend)),
            reconciler: Reconciler::new(backend),
            channel,
            store: ConversationStore::new(config.me.id),
            queue,
            cache: None,
            presence: PresenceTracker::new(config.initially_online),
            connection,
            server_unread: None,
            commands,
            channel_events,
            loopback_tx,
            loopback,
            events: events.clone(),
            state,
        };
        let handle = EngineHandle::new(commands_tx, events, state_rx);
        (engine, handle)
    }

    /// Writes reconciled data to `cache` and restores from it on start.
    #[must_use]
    pub fn with_cache(mut self, cache: CacheRepository) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Loads cached state and re-inserts queued messages as `Queued`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache or queue cannot be read.
    pub async fn restore(&mut self) -> Result<()> {
        if let Some(cache) = &self.cache {
            let conversations = cache.conversations().await?;
            let messages = cache.messages(None).await?;
            debug!(
                conversations = conversations.len(),
                messages = messages.len(),
                "Restored cache"
            );
            self.store.restore(conversations, messages);
        }

        let entries = self.queue.entries().await?;
        if !entries.is_empty() {
            info!(count = entries.len(), "Restored offline queue");
        }
        for entry in entries {
            self.store.append_optimistic(entry.message);
        }
        Ok(())
    }

    /// Restores state, then processes input until shut down.
    pub async fn run(mut self) {
        if let Err(e) = self.restore().await {
            warn!(error = %e, "Failed to restore local state");
        }
        while self.step().await {}
        info!("Engine stopped");
    }

    /// Processes one input. Returns false once the engine should stop.
    pub async fn step(&mut self) -> bool {
        tokio::select! {
            biased;
            command = self.commands.recv() => match command {
                Some(command) => self.on_command(command).await,
                None => false,
            },
            Some(event) = self.channel_events.recv() => {
                self.on_channel(event).await;
                true
            }
            Some(input) = self.loopback.recv() => {
                self.on_loopback(input).await;
                true
            }
        }
    }

    async fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::Send { request, reply } => {
                match self.gateway.begin(&mut self.store, request) {
                    Ok((temp_id, message)) => {
                        debug!(%temp_id, recipient = %message.recipient, "Sending message");
                        let participant = message.recipient.clone();
                        self.spawn_durable(participant.clone(), temp_id.clone(), &message);
                        self.publish(EngineEvent::MessageUpdated {
                            participant,
                            message,
                        });
                        let _ = reply.send(Ok(temp_id));
                    }
                    Err(e) => {
                        debug!(error = %e, "Rejected send request");
                        let _ = reply.send(Err(e.into()));
                    }
                }
            }
            Command::Open(participant) => self.open(participant),
            Command::Close => {
                if let Some(previous) = self.store.close() {
                    self.leave_room(&previous);
                }
            }
            Command::SetOnline(online) => self.set_online(online).await,
            Command::SetAppState(state) => {
                if let Err(e) = self.channel.app_state_changed(state) {
                    warn!(error = %e, "Failed to forward app state");
                }
            }
            Command::AddParticipant(participant) => self.store.add_participant(participant),
            Command::Messages { participant, reply } => {
                let _ = reply.send(self.store.messages(&participant).to_vec());
            }
            Command::Snapshot(reply) => {
                let snapshot = self.snapshot().await;
                let _ = reply.send(snapshot);
            }
            Command::Shutdown => return false,
        }
        true
    }

    async fn on_channel(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected { transport } => {
                info!(%transport, "Channel connected");
                self.set_connected(true);
                self.reconcile();
                self.replay_queue().await;
            }
            ChannelEvent::Disconnected { reason } => {
                info!(%reason, "Channel disconnected");
                self.set_connected(false);
            }
            ChannelEvent::RetriesExhausted { attempts } => {
                warn!(attempts, "Channel gave up reconnecting");
                self.set_connected(false);
            }
            ChannelEvent::Server(event) => self.on_server(event).await,
        }
    }

    async fn on_server(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::NewMessage(record) | ServerEvent::MessageSent(record) => {
                let temp_id = record.temp_id.clone().map(TempId);
                let message = Message::from_record(record, self.store.me());
                let own = &message.sender == self.store.me();
                let receipt = self.store.receive(message);

                if receipt.outcome != MergeOutcome::Unchanged {
                    self.publish(EngineEvent::MessageUpdated {
                        participant: receipt.participant,
                        message: receipt.message,
                    });
                }
                if receipt.counted_unread {
                    self.publish(EngineEvent::ConversationsUpdated);
                }
                // A confirmation for a queued message means it must not be replayed.
                if own && let Some(temp_id) = temp_id {
                    self.dequeue(&temp_id).await;
                }
            }
            ServerEvent::MessageNotification(notification) => {
                let sender = ParticipantId(notification.sender);
                let message_id = notification.message_id.map(MessageId);
                if self.store.note_notification(&sender, message_id.as_ref()) {
                    let sender_name = if notification.sender_name.is_empty() {
                        self.store
                            .participant(&sender)
                            .map_or_else(|| sender.0.clone(), |p| p.name.clone())
                    } else {
                        notification.sender_name
                    };
                    self.publish(EngineEvent::ConversationsUpdated);
                    self.publish(EngineEvent::Notification {
                        sender,
                        sender_name,
                        preview: notification.preview,
                    });
                }
            }
            ServerEvent::OnlineUsers(users) => {
                self.presence
                    .set_online_users(users.into_iter().map(ParticipantId));
                let online = self.presence.online_users().cloned().collect();
                self.publish(EngineEvent::PresenceChanged(online));
            }
            // Handled by the connection manager.
            ServerEvent::AuthError(_) => {}
        }
    }

    async fn on_loopback(&mut self, input: Loopback) {
        match input {
            Loopback::Durable {
                participant,
                temp_id,
                result,
            } => self.on_durable(participant, temp_id, result).await,
            Loopback::Refreshed(refresh) => self.on_refreshed(refresh).await,
            Loopback::NoticeExpired(generation) => {
                if self.presence.expire(generation) {
                    self.publish(EngineEvent::NoticeCleared);
                }
            }
        }
    }

    async fn on_durable(
        &mut self,
        participant: ParticipantId,
        temp_id: TempId,
        result: parley_net::Result<MessageRecord>,
    ) {
        let next = route(DurableOutcome::of(&result), self.connection);
        match (next, result) {
            (SendRoute::Confirm, Ok(mut record)) => {
                debug!(%temp_id, id = %record.id, "Message persisted");
                record.temp_id.get_or_insert_with(|| temp_id.0.clone());
                let message = Message::from_record(record, self.store.me());
                let receipt = self.store.receive(message);
                self.publish(EngineEvent::MessageUpdated {
                    participant: receipt.participant,
                    message: receipt.message,
                });
                self.spawn_refresh(self.reconciler.conversations());
            }
            (SendRoute::Fail, result) => {
                let reason = result.err().map(|e| e.to_string()).unwrap_or_default();
                warn!(%temp_id, %reason, "Backend rejected message");
                self.set_status(&participant, &temp_id, MessageStatus::Failed);
                self.publish(EngineEvent::SendRejected { temp_id, reason });
            }
            (fallback, result) => {
                if let Err(e) = &result {
                    info!(%temp_id, error = %e, "Durable write failed");
                }
                let Some(message) = self.store.by_temp_id(&participant, &temp_id).cloned() else {
                    return;
                };
                if !message.status.is_pending() {
                    debug!(%temp_id, status = %message.status, "Message already settled");
                    return;
                }
                if fallback == SendRoute::Emit && self.emit_message(&temp_id, &message) {
                    self.set_status(&participant, &temp_id, MessageStatus::Sent);
                } else {
                    self.enqueue(temp_id, message).await;
                }
            }
        }
    }

    async fn on_refreshed(&mut self, refresh: Refresh) {
        let applied = refresh.apply(&mut self.store);

        if applied.conversations {
            self.publish(EngineEvent::ConversationsUpdated);
            if let Some(cache) = &self.cache
                && let Err(e) = cache.save_conversations(&self.store.conversations()).await
            {
                warn!(error = %e, "Failed to cache conversations");
            }
        }
        if let Some(participant) = applied.history {
            if let Some(cache) = &self.cache
                && let Err(e) = cache
                    .save_messages(&participant, self.store.messages(&participant))
                    .await
            {
                warn!(%participant, error = %e, "Failed to cache messages");
            }
            self.publish(EngineEvent::ThreadUpdated { participant });
        }
        if let Some(total) = applied.unread_total {
            self.server_unread = Some(total);
            self.publish(EngineEvent::UnreadTotal(total));
        }
    }

    fn open(&mut self, participant: ParticipantId) {
        if let Some(previous) = self.store.open(&participant) {
            self.leave_room(&previous);
        }
        let room = RoomId::for_pair(self.store.me().as_str(), participant.as_str());
        if let Err(e) = self.channel.join_room(room) {
            warn!(%participant, error = %e, "Failed to join room");
        }
        self.publish(EngineEvent::ConversationsUpdated);

        if self.connection.is_online {
            self.spawn_refresh(self.reconciler.history(participant.clone()));
            tokio::spawn(self.reconciler.mark_read(participant));
        }
    }

    fn leave_room(&self, participant: &ParticipantId) {
        let room = RoomId::for_pair(self.store.me().as_str(), participant.as_str());
        if let Err(e) = self.channel.leave_room(room) {
            warn!(%participant, error = %e, "Failed to leave room");
        }
    }

    async fn set_online(&mut self, online: bool) {
        match self.presence.set_online(online) {
            None => {}
            Some(Transition::WentOffline) => {
                info!("Network lost");
                self.connection.is_online = false;
                self.publish_state();
                self.raise_notice(NoticeKind::Offline);
            }
            Some(Transition::CameOnline) => {
                info!("Network restored");
                self.connection.is_online = true;
                self.publish_state();
                if self.presence.clear_offline() {
                    self.publish(EngineEvent::NoticeCleared);
                }
                self.reconcile();
                self.replay_queue().await;
            }
        }
    }

    fn set_connected(&mut self, connected: bool) {
        if self.connection.is_connected != connected {
            self.connection.is_connected = connected;
            self.publish_state();
        }
    }

    /// Re-fetches everything the engine shows. Requires network only.
    fn reconcile(&self) {
        if !self.connection.is_online {
            return;
        }
        debug!("Reconciling with backend");
        self.spawn_refresh(self.reconciler.conversations());
        self.spawn_refresh(self.reconciler.unread());
        if let Some(active) = self.store.active() {
            self.spawn_refresh(self.reconciler.history(active.clone()));
        }
    }

    /// Emits queued messages in order, stopping at the first failure.
    async fn replay_queue(&mut self) {
        if !self.connection.can_emit() {
            return;
        }
        let entries = match self.queue.entries().await {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "Failed to read offline queue");
                return;
            }
        };
        if entries.is_empty() {
            return;
        }
        info!(count = entries.len(), "Replaying offline queue");

        for entry in entries {
            let participant = entry.message.recipient.clone();
            match self.store.by_temp_id(&participant, &entry.temp_id) {
                Some(current) if !current.status.is_pending() => {
                    self.dequeue(&entry.temp_id).await;
                    continue;
                }
                Some(_) => {}
                None => {
                    self.store.append_optimistic(entry.message.clone());
                }
            }

            self.set_status(&participant, &entry.temp_id, MessageStatus::Sending);
            if self.emit_message(&entry.temp_id, &entry.message) {
                self.dequeue(&entry.temp_id).await;
                self.set_status(&participant, &entry.temp_id, MessageStatus::Sent);
            } else {
                self.set_status(&participant, &entry.temp_id, MessageStatus::Queued);
                break;
            }
        }
    }

    async fn enqueue(&mut self, temp_id: TempId, message: Message) {
        let entry = QueuedMessage::new(temp_id.clone(), message);
        match self.queue.enqueue(&entry).await {
            Ok(true) => debug!(%temp_id, "Queued message"),
            Ok(false) => debug!(%temp_id, "Message already queued"),
            Err(e) => error!(%temp_id, error = %e, "Failed to persist queued message"),
        }
        self.set_status(&entry.message.recipient, &temp_id, MessageStatus::Queued);

        let count = self.queue.len().await.unwrap_or(1).max(1);
        self.raise_notice(NoticeKind::MessagesQueued { count });
    }

    async fn dequeue(&mut self, temp_id: &TempId) {
        match self.queue.remove(temp_id).await {
            Ok(true) => debug!(%temp_id, "Removed from offline queue"),
            Ok(false) => return,
            Err(e) => {
                error!(%temp_id, error = %e, "Failed to remove queued message");
                return;
            }
        }
        if matches!(self.queue.is_empty().await, Ok(true)) && self.presence.clear_queued() {
            self.publish(EngineEvent::NoticeCleared);
        }
    }

    fn emit_message(&self, temp_id: &TempId, message: &Message) -> bool {
        match self
            .channel
            .emit(ClientEvent::SendMessage(message.outgoing(temp_id)))
        {
            Ok(()) => true,
            Err(e) => {
                warn!(%temp_id, error = %e, "Channel emit failed");
                false
            }
        }
    }

    fn set_status(&mut self, participant: &ParticipantId, temp_id: &TempId, status: MessageStatus) {
        if let Some(message) = self.store.set_status(participant, temp_id, status) {
            self.publish(EngineEvent::MessageUpdated {
                participant: participant.clone(),
                message,
            });
        }
    }

    fn raise_notice(&mut self, kind: NoticeKind) {
        let generation = self.presence.raise(kind);
        self.publish(EngineEvent::Notice(kind));

        let tx = self.loopback_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(NOTICE_WINDOW).await;
            let _ = tx.send(Loopback::NoticeExpired(generation));
        });
    }

    fn spawn_durable(&self, participant: ParticipantId, temp_id: TempId, message: &Message) {
        let write = self.gateway.persist(message);
        let tx = self.loopback_tx.clone();
        tokio::spawn(async move {
            let result = write.await;
            let _ = tx.send(Loopback::Durable {
                participant,
                temp_id,
                result,
            });
        });
    }

    fn spawn_refresh(&self, fetch: impl Future<Output = Refresh> + Send + 'static) {
        let tx = self.loopback_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(Loopback::Refreshed(fetch.await));
        });
    }

    async fn snapshot(&self) -> EngineSnapshot {
        let queued = match self.queue.len().await {
            Ok(len) => len,
            Err(e) => {
                warn!(error = %e, "Failed to count offline queue");
                0
            }
        };
        EngineSnapshot {
            connection: self.connection,
            active: self.store.active().cloned(),
            conversations: self.store.conversations(),
            online_users: self.presence.online_users().cloned().collect(),
            notice: self.presence.notice().map(|n| n.kind),
            unread_total: self.store.total_unread(),
            server_unread: self.server_unread,
            queued,
        }
    }

    fn publish_state(&self) {
        self.state.send_replace(self.connection);
        self.publish(EngineEvent::ConnectionChanged(self.connection));
    }

    fn publish(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl<B, S> std::fmt::Debug for Engine<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("me", self.store.me())
            .field("connection", &self.connection)
            .field("active", &self.store.active())
            .finish_non_exhaustive()
    }
}
