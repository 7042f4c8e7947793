//! Offline queue models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageStatus, TempId};

/// A message waiting for replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Key of the optimistic copy; unique within the queue.
    pub temp_id: TempId,
    /// The message as it will be emitted.
    pub message: Message,
    /// When the message entered the queue.
    pub queued_at: DateTime<Utc>,
}

impl QueuedMessage {
    /// Queues `message` under `temp_id`.
    #[must_use]
    pub fn new(temp_id: TempId, mut message: Message) -> Self {
        message.status = MessageStatus::Queued;
        message.temp_id = Some(temp_id.clone());
        Self {
            temp_id,
            message,
            queued_at: Utc::now(),
        }
    }
}
