//! Conversation domain models.

use parley_net::ParticipantRecord;
use serde::{Deserialize, Serialize};

use crate::message::{Message, ParticipantId};

/// Someone the current user can message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Participant identifier.
    pub id: ParticipantId,
    /// Display name.
    pub name: String,
    /// Avatar URL.
    pub avatar: Option<String>,
    /// Marketplace role (student, teacher).
    pub role: Option<String>,
}

impl Participant {
    /// Creates a participant with just an id and a name.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ParticipantId::new(id),
            name: name.into(),
            avatar: None,
            role: None,
        }
    }

    /// Placeholder for a participant seen only by id.
    #[must_use]
    pub fn unnamed(id: ParticipantId) -> Self {
        Self {
            name: id.0.clone(),
            id,
            avatar: None,
            role: None,
        }
    }
}

impl From<ParticipantRecord> for Participant {
    fn from(record: ParticipantRecord) -> Self {
        Self {
            id: ParticipantId(record.id),
            name: record.name,
            avatar: record.avatar,
            role: record.role,
        }
    }
}

/// Where a conversation is in its local lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationPhase {
    /// Never opened in this session.
    #[default]
    Unopened,
    /// Opened; unread count was reset.
    Open,
    /// Collecting unread messages while another conversation is active.
    Receiving,
}

/// A one-to-one thread summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// The other participant.
    pub participant: Participant,
    /// Most recent message.
    pub last_message: Option<Message>,
    /// Messages not yet seen by the current user.
    pub unread_count: u32,
    /// Local lifecycle phase.
    #[serde(default)]
    pub phase: ConversationPhase,
}

impl Conversation {
    /// Creates an empty conversation.
    #[must_use]
    pub const fn new(participant: Participant) -> Self {
        Self {
            participant,
            last_message: None,
            unread_count: 0,
            phase: ConversationPhase::Unopened,
        }
    }

    /// Participant id, which also keys the conversation.
    #[must_use]
    pub const fn id(&self) -> &ParticipantId {
        &self.participant.id
    }

    /// Records a message in this conversation.
    ///
    /// `last_message` only moves forward in time. A newer view of the
    /// current last message replaces it without moving its timestamp back.
    pub fn observe(&mut self, message: &Message) {
        match &mut self.last_message {
            Some(last) if last.same_message(message) => {
                let at = last.created_at.max(message.created_at);
                *last = message.clone();
                last.created_at = at;
            }
            Some(last) if message.created_at < last.created_at => {}
            slot => *slot = Some(message.clone()),
        }
    }

    /// Marks the conversation opened.
    pub const fn open(&mut self) {
        self.unread_count = 0;
        self.phase = ConversationPhase::Open;
    }

    /// Counts one more unread message.
    pub const fn add_unread(&mut self) {
        self.unread_count = self.unread_count.saturating_add(1);
        self.phase = ConversationPhase::Receiving;
    }
}
