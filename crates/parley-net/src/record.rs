//! Wire records shared by the durable API and the duplex channel.
//!
//! The backend serializes ids as `_id` and field names in camelCase.
//! Participant references arrive either as a bare id or as a populated
//! participant object; both decode to the id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Kind of message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Plain text.
    #[default]
    Text,
    /// Image reference.
    Image,
    /// File reference.
    File,
}

/// A participant as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    /// Participant identifier.
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Marketplace role (student, teacher).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl ParticipantRecord {
    /// Creates a participant record with just an id and a name.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            avatar: None,
            role: None,
        }
    }
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Server-assigned identifier.
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    /// Sender participant id.
    #[serde(deserialize_with = "participant_id")]
    pub sender: String,
    /// Recipient participant id.
    #[serde(deserialize_with = "participant_id")]
    pub recipient: String,
    /// Text payload.
    pub content: String,
    /// Payload kind.
    #[serde(default)]
    pub message_type: MessageType,
    /// Authoritative creation time.
    pub created_at: DateTime<Utc>,
    /// Whether the recipient has read it.
    #[serde(default)]
    pub is_read: bool,
    /// Client id of the optimistic copy, echoed back by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
}

/// A conversation summary from `GET /messages/conversations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    /// The other party.
    pub participant: ParticipantRecord,
    /// Most recent message, if any.
    #[serde(default)]
    pub last_message: Option<MessageRecord>,
    /// Messages addressed to us and not yet read.
    #[serde(default)]
    pub unread_count: u32,
}

/// Body of `POST /messages/send` and payload of the `send_message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// Recipient participant id.
    pub recipient: String,
    /// Text payload.
    pub content: String,
    /// Payload kind.
    #[serde(default)]
    pub message_type: MessageType,
    /// Client id of the optimistic copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
}

/// Response of `GET /messages/unread-count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    /// Total unread messages across conversations.
    pub unread_count: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ParticipantRef {
    Id(String),
    Populated(ParticipantRecord),
}

fn participant_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match ParticipantRef::deserialize(deserializer)? {
        ParticipantRef::Id(id) => id,
        ParticipantRef::Populated(participant) => participant.id,
    })
}
