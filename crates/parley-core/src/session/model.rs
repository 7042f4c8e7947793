//! Session models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::Participant;
use crate::message::ParticipantId;

/// The participant this client acts for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Profile.
    pub participant: Participant,
    /// When the session was stored.
    pub signed_in_at: DateTime<Utc>,
}

impl CurrentUser {
    /// Starts a session for `participant`.
    #[must_use]
    pub fn new(participant: Participant) -> Self {
        Self {
            participant,
            signed_in_at: Utc::now(),
        }
    }

    /// Participant id.
    #[must_use]
    pub const fn id(&self) -> &ParticipantId {
        &self.participant.id
    }
}
