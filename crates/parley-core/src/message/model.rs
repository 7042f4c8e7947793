//! Message domain models.

use chrono::{DateTime, Utc};
use parley_net::MessageType;
use parley_net::channel::OutgoingMessage;
use parley_net::{MessageRecord, SendMessageRequest};
use serde::{Deserialize, Serialize};

/// Unique identifier for a participant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    /// Create a new participant ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Server-assigned message identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Create a new message ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client-generated identifier of an optimistic message.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempId(pub String);

impl TempId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TempId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TempId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Delivery status of a message.
///
/// ```text
/// Sending ──► Sent ──► Delivered ──► Read
///    │ ▲
///    ▼ │
///  Queued        Sending ──► Failed
/// ```
///
/// Statuses past `Sending` only move forward. A confirmed message is never
/// queued again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Durable write in flight.
    Sending,
    /// Accepted by the backend or emitted on the live channel.
    Sent,
    /// Reached the recipient.
    Delivered,
    /// Seen by the recipient.
    Read,
    /// Waiting in the offline queue.
    Queued,
    /// Rejected by the backend; will not be retried.
    Failed,
}

impl MessageStatus {
    const fn rank(self) -> u8 {
        match self {
            Self::Sending | Self::Queued | Self::Failed => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
        }
    }

    /// Returns true if a message in this status may move to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Sending, Self::Queued | Self::Failed) | (Self::Queued, Self::Sending) => true,
            (Self::Failed, _) | (_, Self::Sending | Self::Queued | Self::Failed) => false,
            _ => next.rank() > self.rank(),
        }
    }

    /// Returns true while the message has not reached the backend or channel.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Sending | Self::Queued)
    }

    /// Short label for display.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Queued => "queued",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A message as held by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server id, once known.
    pub id: Option<MessageId>,
    /// Client id, until the server id is known.
    pub temp_id: Option<TempId>,
    /// Sender.
    pub sender: ParticipantId,
    /// Recipient.
    pub recipient: ParticipantId,
    /// Text payload.
    pub content: String,
    /// Payload kind.
    #[serde(default)]
    pub message_type: MessageType,
    /// Creation time; the server value replaces the local one on confirmation.
    pub created_at: DateTime<Utc>,
    /// Delivery status.
    pub status: MessageStatus,
}

impl Message {
    /// Creates an optimistic local copy in `Sending` state with a fresh temp id.
    #[must_use]
    pub fn optimistic(
        sender: ParticipantId,
        recipient: ParticipantId,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> Self {
        Self::pending(TempId::generate(), sender, recipient, content, message_type)
    }

    /// Creates an optimistic local copy keyed by `temp_id`.
    #[must_use]
    pub fn pending(
        temp_id: TempId,
        sender: ParticipantId,
        recipient: ParticipantId,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> Self {
        Self {
            id: None,
            temp_id: Some(temp_id),
            sender,
            recipient,
            content: content.into(),
            message_type,
            created_at: Utc::now(),
            status: MessageStatus::Sending,
        }
    }

    /// Converts a backend record, seen from `me`.
    #[must_use]
    pub fn from_record(record: MessageRecord, me: &ParticipantId) -> Self {
        let sender = ParticipantId(record.sender);
        let status = if record.is_read {
            MessageStatus::Read
        } else if &sender == me {
            MessageStatus::Sent
        } else {
            MessageStatus::Delivered
        };

        Self {
            id: Some(MessageId(record.id)),
            temp_id: record.temp_id.map(TempId),
            sender,
            recipient: ParticipantId(record.recipient),
            content: record.content,
            message_type: record.message_type,
            created_at: record.created_at,
            status,
        }
    }

    /// The participant on the other side of the conversation from `me`.
    #[must_use]
    pub fn counterpart(&self, me: &ParticipantId) -> &ParticipantId {
        if &self.sender == me {
            &self.recipient
        } else {
            &self.sender
        }
    }

    /// Returns true if both values describe the same logical message.
    #[must_use]
    pub fn same_message(&self, other: &Self) -> bool {
        let by_id = matches!((&self.id, &other.id), (Some(a), Some(b)) if a == b);
        let by_temp = matches!((&self.temp_id, &other.temp_id), (Some(a), Some(b)) if a == b);
        by_id || by_temp
    }

    /// Folds another view of the same message into this one.
    ///
    /// A view carrying a server id is authoritative for id, content and
    /// timestamp; the temp id is dropped once the server id is known.
    /// Status only moves along allowed transitions.
    pub fn absorb(&mut self, incoming: Self) {
        if let Some(id) = incoming.id {
            self.id = Some(id);
            self.temp_id = None;
            self.content = incoming.content;
            self.message_type = incoming.message_type;
            self.created_at = incoming.created_at;
        }
        if self.status.can_transition_to(incoming.status) {
            self.status = incoming.status;
        }
    }

    /// Moves to `status` if the transition is allowed.
    pub fn advance(&mut self, status: MessageStatus) -> bool {
        if self.status != status && self.status.can_transition_to(status) {
            self.status = status;
            true
        } else {
            false
        }
    }

    /// Request body for the durable write.
    #[must_use]
    pub fn send_request(&self) -> SendMessageRequest {
        SendMessageRequest {
            recipient: self.recipient.0.clone(),
            content: self.content.clone(),
            message_type: self.message_type,
            temp_id: self.temp_id.as_ref().map(|t| t.0.clone()),
        }
    }

    /// Channel payload for best-effort delivery.
    #[must_use]
    pub fn outgoing(&self, temp_id: &TempId) -> OutgoingMessage {
        OutgoingMessage {
            temp_id: temp_id.0.clone(),
            sender: self.sender.0.clone(),
            recipient: self.recipient.0.clone(),
            content: self.content.clone(),
            message_type: self.message_type,
            created_at: self.created_at,
        }
    }

    /// First `max_chars` characters of the content.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{head}…")
        } else {
            head
        }
    }
}
