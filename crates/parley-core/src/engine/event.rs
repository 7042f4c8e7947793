//! Events published by the engine.

use crate::message::{Message, ParticipantId, TempId};
use crate::presence::{ConnectionState, NoticeKind};

/// Something the UI may want to redraw for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A message was added or changed.
    MessageUpdated {
        /// Conversation.
        participant: ParticipantId,
        /// Stored message after the change.
        message: Message,
    },
    /// A conversation thread was refreshed from the backend.
    ThreadUpdated {
        /// Conversation.
        participant: ParticipantId,
    },
    /// The conversation list or an unread count changed.
    ConversationsUpdated,
    /// Connectivity changed.
    ConnectionChanged(ConnectionState),
    /// A transient notice should be shown.
    Notice(NoticeKind),
    /// The notice should be hidden.
    NoticeCleared,
    /// A message arrived for a conversation that is not open.
    Notification {
        /// Sender.
        sender: ParticipantId,
        /// Sender display name.
        sender_name: String,
        /// Truncated text.
        preview: String,
    },
    /// The backend refused a message.
    SendRejected {
        /// Local key of the message.
        temp_id: TempId,
        /// Backend explanation.
        reason: String,
    },
    /// Presence snapshot.
    PresenceChanged(Vec<ParticipantId>),
    /// Server-side unread total.
    UnreadTotal(u32),
}
