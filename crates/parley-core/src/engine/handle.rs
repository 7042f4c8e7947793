//! Clonable front for a running engine.

use parley_net::channel::AppState;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::event::EngineEvent;
use crate::conversation::{Conversation, Participant};
use crate::error::{Error, Result};
use crate::gateway::SendRequest;
use crate::message::{Message, ParticipantId, TempId};
use crate::presence::{ConnectionState, NoticeKind};

/// Point-in-time view of engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSnapshot {
    /// Connectivity.
    pub connection: ConnectionState,
    /// Open conversation.
    pub active: Option<ParticipantId>,
    /// Conversations, most recent first.
    pub conversations: Vec<Conversation>,
    /// Participants the server reports online.
    pub online_users: Vec<ParticipantId>,
    /// Notice on screen.
    pub notice: Option<NoticeKind>,
    /// Sum of local unread counts.
    pub unread_total: u32,
    /// Last unread total reported by the backend.
    pub server_unread: Option<u32>,
    /// Offline queue length.
    pub queued: usize,
}

pub(crate) enum Command {
    Send {
        request: SendRequest,
        reply: oneshot::Sender<Result<TempId>>,
    },
    Open(ParticipantId),
    Close,
    SetOnline(bool),
    SetAppState(AppState),
    AddParticipant(Participant),
    Messages {
        participant: ParticipantId,
        reply: oneshot::Sender<Vec<Message>>,
    },
    Snapshot(oneshot::Sender<EngineSnapshot>),
    Shutdown,
}

/// Handle used by the UI to drive the engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<EngineEvent>,
    state: watch::Receiver<ConnectionState>,
}

impl EngineHandle {
    pub(crate) const fn new(
        commands: mpsc::Sender<Command>,
        events: broadcast::Sender<EngineEvent>,
        state: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self {
            commands,
            events,
            state,
        }
    }

    /// Sends a message. Returns the temp id of the optimistic copy.
    ///
    /// Validation happens before anything is appended; delivery progress
    /// is reported through [`EngineEvent::MessageUpdated`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an invalid request and
    /// [`Error::EngineStopped`] if the engine is gone.
    pub async fn send(&self, request: SendRequest) -> Result<TempId> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send { request, reply }).await?;
        rx.await.map_err(|_| Error::EngineStopped)?
    }

    /// Sends a text message.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn send_text(
        &self,
        recipient: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<TempId> {
        self.send(SendRequest::text(recipient, content)).await
    }

    /// Opens a conversation: joins its room, resets unread and refreshes history.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the engine is gone.
    pub async fn open(&self, participant: ParticipantId) -> Result<()> {
        self.command(Command::Open(participant)).await
    }

    /// Leaves the open conversation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the engine is gone.
    pub async fn close(&self) -> Result<()> {
        self.command(Command::Close).await
    }

    /// Reports device network state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the engine is gone.
    pub async fn set_online(&self, online: bool) -> Result<()> {
        self.command(Command::SetOnline(online)).await
    }

    /// Reports host lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the engine is gone.
    pub async fn set_app_state(&self, state: AppState) -> Result<()> {
        self.command(Command::SetAppState(state)).await
    }

    /// Adds someone the user may message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the engine is gone.
    pub async fn add_participant(&self, participant: Participant) -> Result<()> {
        self.command(Command::AddParticipant(participant)).await
    }

    /// Messages exchanged with `participant`, in display order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the engine is gone.
    pub async fn messages(&self, participant: ParticipantId) -> Result<Vec<Message>> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Messages { participant, reply })
            .await?;
        rx.await.map_err(|_| Error::EngineStopped)
    }

    /// Current engine state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the engine is gone.
    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Snapshot(reply)).await?;
        rx.await.map_err(|_| Error::EngineStopped)
    }

    /// Conversations, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the engine is gone.
    pub async fn conversations(&self) -> Result<Vec<Conversation>> {
        Ok(self.snapshot().await?.conversations)
    }

    /// Latest connectivity.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribes to engine events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Stops the engine.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::EngineStopped)
    }
}
