//! Ordered, de-duplicated message thread.

use std::collections::HashMap;

use crate::message::{Message, MessageId, MessageStatus, TempId};

/// What a merge did to the thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new message was appended.
    Inserted,
    /// An existing message changed.
    Updated,
    /// The message was already present as given.
    Unchanged,
}

/// Messages with one participant, ordered by `created_at`.
///
/// Ties keep arrival order. Messages are matched by server id first, then
/// by temp id, including temp ids already replaced by a server id. A server
/// copy that lands before the confirmation of the local copy is collapsed
/// into one entry once the confirmation links the two ids.
#[derive(Debug, Clone, Default)]
pub struct Thread {
    messages: Vec<Message>,
    aliases: HashMap<TempId, MessageId>,
}

impl Thread {
    /// Creates an empty thread.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages in display order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the thread holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns true if a message with this server id is present.
    #[must_use]
    pub fn contains_id(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| m.id.as_ref() == Some(id))
    }

    /// Looks a message up by temp id, following confirmed aliases.
    #[must_use]
    pub fn by_temp_id(&self, temp_id: &TempId) -> Option<&Message> {
        self.find_temp(temp_id).map(|i| &self.messages[i])
    }

    /// Folds `incoming` into the thread.
    pub fn merge(&mut self, incoming: Message) -> MergeOutcome {
        let mut collapsed = false;
        if let (Some(temp_id), Some(id)) = (&incoming.temp_id, &incoming.id) {
            self.aliases.insert(temp_id.clone(), id.clone());
            collapsed = self.collapse(temp_id, id);
        }

        let Some(index) = self.position(&incoming) else {
            self.messages.push(incoming);
            self.sort();
            return MergeOutcome::Inserted;
        };

        let existing = &mut self.messages[index];
        if let (Some(temp_id), Some(id)) = (&existing.temp_id, &incoming.id) {
            self.aliases.insert(temp_id.clone(), id.clone());
        }

        let before = existing.clone();
        existing.absorb(incoming);
        if *existing == before && !collapsed {
            return MergeOutcome::Unchanged;
        }
        if existing.created_at != before.created_at {
            self.sort();
        }
        MergeOutcome::Updated
    }

    /// Moves the message with `temp_id` to `status` if allowed.
    ///
    /// Returns the updated message when the status changed.
    pub fn set_status(&mut self, temp_id: &TempId, status: MessageStatus) -> Option<&Message> {
        let index = self.find_temp(temp_id)?;
        let message = &mut self.messages[index];
        message.advance(status).then_some(&*message)
    }

    /// Drops the local copy keyed by `temp_id` when the server copy `id` is
    /// already held as a separate entry.
    fn collapse(&mut self, temp_id: &TempId, id: &MessageId) -> bool {
        if !self.contains_id(id) {
            return false;
        }
        let Some(local) = self
            .messages
            .iter()
            .position(|m| m.temp_id.as_ref() == Some(temp_id) && m.id.as_ref() != Some(id))
        else {
            return false;
        };
        self.messages.remove(local);
        true
    }

    fn position(&self, incoming: &Message) -> Option<usize> {
        if let Some(id) = &incoming.id
            && let Some(index) = self.messages.iter().position(|m| m.id.as_ref() == Some(id))
        {
            return Some(index);
        }
        incoming
            .temp_id
            .as_ref()
            .and_then(|temp_id| self.find_temp(temp_id))
    }

    fn find_temp(&self, temp_id: &TempId) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.temp_id.as_ref() == Some(temp_id))
            .or_else(|| {
                let id = self.aliases.get(temp_id)?;
                self.messages.iter().position(|m| m.id.as_ref() == Some(id))
            })
    }

    fn sort(&mut self) {
        self.messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }
}
