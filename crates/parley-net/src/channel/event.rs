//! Channel events and their JSON frame encoding.
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": <payload>}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::record::{MessageRecord, MessageType};

/// Room scoping events between two participants.
///
/// The id is the sorted pair of participant ids joined by `_`, so both
/// sides derive the same room.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Room shared by `a` and `b`.
    #[must_use]
    pub fn for_pair(a: &str, b: &str) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{first}_{second}"))
    }

    /// Returns the room id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message emitted over the channel on the best-effort path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    /// Client id of the optimistic copy.
    pub temp_id: String,
    /// Sender participant id.
    pub sender: String,
    /// Recipient participant id.
    pub recipient: String,
    /// Text payload.
    pub content: String,
    /// Payload kind.
    #[serde(default)]
    pub message_type: MessageType,
    /// Client clock at send time; the server assigns the authoritative value.
    pub created_at: DateTime<Utc>,
}

/// Toast payload for a message in a conversation that is not open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageNotification {
    /// Sender participant id.
    pub sender: String,
    /// Sender display name.
    #[serde(default)]
    pub sender_name: String,
    /// Truncated message text.
    pub preview: String,
    /// Id of the message being announced, when the server includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Events sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Bind the channel to a participant identity.
    Authenticate(String),
    /// Scope future events to a conversation room.
    JoinRoom(RoomId),
    /// Stop receiving a room's events.
    LeaveRoom(RoomId),
    /// Best-effort message delivery.
    SendMessage(OutgoingMessage),
}

/// Events pushed from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Inbound message for a joined room.
    NewMessage(MessageRecord),
    /// Confirms a message this client sent.
    MessageSent(MessageRecord),
    /// Message arrived in a conversation that is not open.
    MessageNotification(MessageNotification),
    /// Presence snapshot.
    OnlineUsers(Vec<String>),
    /// The server refused the `authenticate` identity.
    AuthError(String),
}

/// Encodes a client event as a text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(event: &ClientEvent) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

/// Decodes a server text frame.
///
/// # Errors
///
/// Returns an error for malformed frames and unknown event names.
pub fn decode(frame: &str) -> Result<ServerEvent> {
    Ok(serde_json::from_str(frame)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_is_order_independent() {
        assert_eq!(RoomId::for_pair("bob", "alice"), RoomId::for_pair("alice", "bob"));
        assert_eq!(RoomId::for_pair("bob", "alice").as_str(), "alice_bob");
    }

    #[test]
    fn test_encode_authenticate() {
        let frame = encode(&ClientEvent::Authenticate("alice".into())).unwrap();
        assert_eq!(frame, r#"{"event":"authenticate","data":"alice"}"#);
    }

    #[test]
    fn test_encode_join_room() {
        let frame = encode(&ClientEvent::JoinRoom(RoomId::for_pair("b", "a"))).unwrap();
        assert_eq!(frame, r#"{"event":"join_room","data":"a_b"}"#);
    }

    #[test]
    fn test_decode_new_message() {
        let frame = r#"{"event":"new_message","data":{
            "_id":"m9","sender":"bob","recipient":"alice","content":"hey",
            "createdAt":"2026-02-01T08:00:00Z"}}"#;
        match decode(frame).unwrap() {
            ServerEvent::NewMessage(record) => {
                assert_eq!(record.id, "m9");
                assert_eq!(record.content, "hey");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_decode_online_users() {
        let frame = r#"{"event":"online_users","data":["alice","bob"]}"#;
        assert_eq!(
            decode(frame).unwrap(),
            ServerEvent::OnlineUsers(vec!["alice".into(), "bob".into()])
        );
    }

    #[test]
    fn test_decode_notification_without_id() {
        let frame = r#"{"event":"message_notification","data":{"sender":"bob","preview":"hi"}}"#;
        match decode(frame).unwrap() {
            ServerEvent::MessageNotification(n) => {
                assert_eq!(n.sender, "bob");
                assert!(n.message_id.is_none());
                assert!(n.sender_name.is_empty());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_event_fails() {
        assert!(decode(r#"{"event":"typing","data":"bob"}"#).is_err());
        assert!(decode("not json").is_err());
    }
}
