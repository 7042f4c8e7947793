//! Conversation list, threads and unread accounting.

use std::collections::HashMap;

use parley_net::ConversationRecord;

use super::thread::{MergeOutcome, Thread};
use crate::conversation::{Conversation, ConversationPhase, Participant};
use crate::message::{Message, MessageId, MessageStatus, ParticipantId, TempId};

/// Result of folding one message into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Conversation the message belongs to.
    pub participant: ParticipantId,
    /// What happened to the thread.
    pub outcome: MergeOutcome,
    /// The stored message after the merge.
    pub message: Message,
    /// True if the conversation's unread count went up.
    pub counted_unread: bool,
}

/// All conversation state for the signed-in participant.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    me: ParticipantId,
    directory: HashMap<ParticipantId, Participant>,
    conversations: HashMap<ParticipantId, Conversation>,
    threads: HashMap<ParticipantId, Thread>,
    active: Option<ParticipantId>,
}

impl ConversationStore {
    /// Creates an empty store for `me`.
    #[must_use]
    pub fn new(me: ParticipantId) -> Self {
        Self {
            me,
            directory: HashMap::new(),
            conversations: HashMap::new(),
            threads: HashMap::new(),
            active: None,
        }
    }

    /// The signed-in participant.
    #[must_use]
    pub const fn me(&self) -> &ParticipantId {
        &self.me
    }

    /// Conversation currently open on screen.
    #[must_use]
    pub const fn active(&self) -> Option<&ParticipantId> {
        self.active.as_ref()
    }

    /// Adds or refreshes a directory entry.
    pub fn add_participant(&mut self, participant: Participant) {
        if let Some(conversation) = self.conversations.get_mut(&participant.id) {
            conversation.participant = participant.clone();
        }
        self.directory.insert(participant.id.clone(), participant);
    }

    /// Returns true if `id` can be messaged.
    #[must_use]
    pub fn knows(&self, id: &ParticipantId) -> bool {
        self.directory.contains_key(id) || self.conversations.contains_key(id)
    }

    /// Looks up a participant.
    #[must_use]
    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.directory
            .get(id)
            .or_else(|| self.conversations.get(id).map(|c| &c.participant))
    }

    /// Conversations, most recent first.
    #[must_use]
    pub fn conversations(&self) -> Vec<Conversation> {
        let mut list: Vec<_> = self.conversations.values().cloned().collect();
        list.sort_by(|a, b| {
            let at = |c: &Conversation| c.last_message.as_ref().map(|m| m.created_at);
            at(b).cmp(&at(a)).then_with(|| a.participant.name.cmp(&b.participant.name))
        });
        list
    }

    /// One conversation.
    #[must_use]
    pub fn conversation(&self, id: &ParticipantId) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    /// Messages exchanged with `id`, in display order.
    #[must_use]
    pub fn messages(&self, id: &ParticipantId) -> &[Message] {
        self.threads.get(id).map_or(&[], Thread::messages)
    }

    /// Sum of per-conversation unread counts.
    #[must_use]
    pub fn total_unread(&self) -> u32 {
        self.conversations
            .values()
            .fold(0, |total, c| total.saturating_add(c.unread_count))
    }

    /// Finds a message by temp id.
    #[must_use]
    pub fn by_temp_id(&self, participant: &ParticipantId, temp_id: &TempId) -> Option<&Message> {
        self.threads.get(participant)?.by_temp_id(temp_id)
    }

    /// Returns true if any thread holds `id`.
    #[must_use]
    pub fn contains_id(&self, id: &MessageId) -> bool {
        self.threads.values().any(|t| t.contains_id(id))
    }

    /// Appends a message the current user just wrote.
    pub fn append_optimistic(&mut self, message: Message) -> Receipt {
        self.merge(message, false)
    }

    /// Folds a pushed or confirmed message into its conversation.
    ///
    /// Inbound messages that are new to the thread count as unread unless
    /// their conversation is open.
    pub fn receive(&mut self, message: Message) -> Receipt {
        self.merge(message, true)
    }

    /// Folds a fetched history page into the conversation with `participant`.
    ///
    /// Returns the number of messages that changed the thread.
    pub fn merge_history(&mut self, participant: &ParticipantId, history: Vec<Message>) -> usize {
        let me = self.me.clone();
        history
            .into_iter()
            .filter(|m| m.counterpart(&me) == participant)
            .map(|m| self.merge(m, false))
            .filter(|r| r.outcome != MergeOutcome::Unchanged)
            .count()
    }

    /// Applies a fetched conversation list.
    ///
    /// Server unread counts raise local ones but never lower them; a list
    /// fetched before a local increment can land after it. Only opening a
    /// conversation clears its count, and the open one stays read.
    pub fn merge_conversations(&mut self, records: Vec<ConversationRecord>) {
        for record in records {
            let participant = Participant::from(record.participant);
            let id = participant.id.clone();
            self.add_participant(participant.clone());

            if let Some(last) = record.last_message {
                let message = Message::from_record(last, &self.me);
                if message.counterpart(&self.me) == &id {
                    self.merge(message, false);
                }
            }

            let is_active = self.active.as_ref() == Some(&id);
            let conversation = self
                .conversations
                .entry(id)
                .or_insert_with(|| Conversation::new(participant));
            conversation.unread_count = if is_active {
                0
            } else {
                conversation.unread_count.max(record.unread_count)
            };
            if conversation.unread_count > 0 {
                conversation.phase = ConversationPhase::Receiving;
            }
        }
    }

    /// Moves a local message to `status` if the transition is allowed.
    pub fn set_status(
        &mut self,
        participant: &ParticipantId,
        temp_id: &TempId,
        status: MessageStatus,
    ) -> Option<Message> {
        let message = self
            .threads
            .get_mut(participant)?
            .set_status(temp_id, status)?
            .clone();
        if let Some(conversation) = self.conversations.get_mut(participant) {
            conversation.observe(&message);
        }
        Some(message)
    }

    /// Opens the conversation with `participant`, zeroing its unread count.
    ///
    /// Returns the previously active conversation if it was a different one.
    pub fn open(&mut self, participant: &ParticipantId) -> Option<ParticipantId> {
        self.conversation_mut(participant).open();
        let previous = self.active.replace(participant.clone());
        previous.filter(|p| p != participant)
    }

    /// Leaves the active conversation.
    pub fn close(&mut self) -> Option<ParticipantId> {
        self.active.take()
    }

    /// Counts a notification for a message that may not have arrived yet.
    ///
    /// Returns false when the notification describes a known message or
    /// targets the open conversation.
    pub fn note_notification(
        &mut self,
        sender: &ParticipantId,
        message_id: Option<&MessageId>,
    ) -> bool {
        if self.active.as_ref() == Some(sender) || sender == &self.me {
            return false;
        }
        if message_id.is_some_and(|id| self.contains_id(id)) {
            return false;
        }
        self.conversation_mut(sender).add_unread();
        true
    }

    /// Restores cached state without touching unread counts.
    pub fn restore(&mut self, conversations: Vec<Conversation>, messages: Vec<Message>) {
        for conversation in conversations {
            self.directory
                .entry(conversation.participant.id.clone())
                .or_insert_with(|| conversation.participant.clone());
            self.conversations
                .insert(conversation.participant.id.clone(), conversation);
        }
        for message in messages {
            self.merge(message, false);
        }
    }

    fn merge(&mut self, message: Message, count_unread: bool) -> Receipt {
        let participant = message.counterpart(&self.me).clone();
        let inbound = message.sender != self.me;

        let thread = self.threads.entry(participant.clone()).or_default();
        let outcome = thread.merge(message.clone());
        let stored = thread
            .messages()
            .iter()
            .find(|m| m.same_message(&message))
            .cloned()
            .unwrap_or(message);

        let is_active = self.active.as_ref() == Some(&participant);
        let conversation = self.conversation_mut(&participant);
        conversation.observe(&stored);

        let counted_unread =
            count_unread && inbound && outcome == MergeOutcome::Inserted && !is_active;
        if counted_unread {
            conversation.add_unread();
        }

        Receipt {
            participant,
            outcome,
            message: stored,
            counted_unread,
        }
    }

    fn conversation_mut(&mut self, participant: &ParticipantId) -> &mut Conversation {
        let directory = &self.directory;
        self.conversations
            .entry(participant.clone())
            .or_insert_with(|| {
                let entry = directory
                    .get(participant)
                    .cloned()
                    .unwrap_or_else(|| Participant::unnamed(participant.clone()));
                Conversation::new(entry)
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parley_net::{MessageRecord, MessageType, ParticipantRecord};

    use super::*;

    fn store() -> ConversationStore {
        let mut store = ConversationStore::new(ParticipantId::new("alice"));
        store.add_participant(Participant::new("bob", "Bob"));
        store.add_participant(Participant::new("carol", "Carol"));
        store
    }

    fn inbound(id: &str, from: &str, at: &str) -> Message {
        let record = MessageRecord {
            id: id.into(),
            sender: from.into(),
            recipient: "alice".into(),
            content: format!("from {from}"),
            message_type: MessageType::Text,
            created_at: at.parse().unwrap(),
            is_read: false,
            temp_id: None,
        };
        Message::from_record(record, &ParticipantId::new("alice"))
    }

    fn conversation_record(id: &str, unread: u32) -> ConversationRecord {
        ConversationRecord {
            participant: ParticipantRecord::new(id, id.to_uppercase()),
            last_message: None,
            unread_count: unread,
        }
    }

    #[test]
    fn test_inbound_counts_unread_once() {
        let mut store = store();
        let bob = ParticipantId::new("bob");

        let receipt = store.receive(inbound("m1", "bob", "2026-03-01T10:00:00Z"));
        assert!(receipt.counted_unread);
        store.receive(inbound("m1", "bob", "2026-03-01T10:00:00Z"));

        assert_eq!(store.messages(&bob).len(), 1);
        assert_eq!(store.conversation(&bob).unwrap().unread_count, 1);
    }

    #[test]
    fn test_open_conversation_stays_read() {
        let mut store = store();
        let bob = ParticipantId::new("bob");
        store.open(&bob);

        let receipt = store.receive(inbound("m1", "bob", "2026-03-01T10:00:00Z"));
        assert!(!receipt.counted_unread);
        assert_eq!(store.conversation(&bob).unwrap().unread_count, 0);
    }

    #[test]
    fn test_open_resets_unread_and_reports_previous() {
        let mut store = store();
        let bob = ParticipantId::new("bob");
        let carol = ParticipantId::new("carol");

        store.receive(inbound("m1", "bob", "2026-03-01T10:00:00Z"));
        assert_eq!(store.open(&carol), None);
        assert_eq!(store.open(&bob), Some(carol.clone()));
        assert_eq!(store.open(&bob), None);

        let conversation = store.conversation(&bob).unwrap();
        assert_eq!(conversation.unread_count, 0);
        assert_eq!(conversation.phase, ConversationPhase::Open);
    }

    #[test]
    fn test_notification_for_known_message_is_ignored() {
        let mut store = store();
        let bob = ParticipantId::new("bob");
        store.receive(inbound("m1", "bob", "2026-03-01T10:00:00Z"));

        assert!(!store.note_notification(&bob, Some(&MessageId::new("m1"))));
        assert!(store.note_notification(&bob, Some(&MessageId::new("m2"))));
        assert!(store.note_notification(&bob, None));
        assert_eq!(store.conversation(&bob).unwrap().unread_count, 3);

        store.open(&bob);
        assert!(!store.note_notification(&bob, None));
    }

    #[test]
    fn test_server_unread_counts_win_except_active() {
        let mut store = store();
        let bob = ParticipantId::new("bob");
        let carol = ParticipantId::new("carol");
        store.receive(inbound("m1", "bob", "2026-03-01T10:00:00Z"));
        store.receive(inbound("m2", "bob", "2026-03-01T10:01:00Z"));
        store.open(&carol);

        store.merge_conversations(vec![
            conversation_record("bob", 5),
            conversation_record("carol", 4),
        ]);

        assert_eq!(store.conversation(&bob).unwrap().unread_count, 5);
        assert_eq!(store.conversation(&carol).unwrap().unread_count, 0);
        assert_eq!(store.total_unread(), 5);
    }

    #[test]
    fn test_stale_refresh_keeps_local_unread() {
        let mut store = store();
        let bob = ParticipantId::new("bob");
        store.receive(inbound("r1", "bob", "2026-03-01T10:00:00Z"));

        store.merge_conversations(vec![conversation_record("bob", 0)]);
        assert_eq!(store.conversation(&bob).unwrap().unread_count, 1);

        store.open(&bob);
        store.close();
        store.merge_conversations(vec![conversation_record("bob", 0)]);
        assert_eq!(store.conversation(&bob).unwrap().unread_count, 0);
    }

    #[test]
    fn test_server_copy_before_confirmation_is_held_once() {
        let mut store = store();
        let bob = ParticipantId::new("bob");
        let local = Message::optimistic(
            ParticipantId::new("alice"),
            bob.clone(),
            "hi",
            MessageType::Text,
        );
        let temp_id = local.temp_id.clone().unwrap();
        store.append_optimistic(local.clone());

        let mut server = local;
        server.id = Some(MessageId::new("m1"));
        server.temp_id = None;
        server.status = MessageStatus::Sent;
        store.receive(server.clone());

        server.temp_id = Some(temp_id.clone());
        let receipt = store.receive(server);
        assert!(!receipt.counted_unread);

        let messages = store.messages(&bob);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, Some(MessageId::new("m1")));
        assert_eq!(messages[0].status, MessageStatus::Sent);
        assert_eq!(
            store.by_temp_id(&bob, &temp_id).unwrap().id,
            Some(MessageId::new("m1"))
        );
    }

    #[test]
    fn test_merge_conversations_dedupes_last_message() {
        let mut store = store();
        let bob = ParticipantId::new("bob");
        store.receive(inbound("m1", "bob", "2026-03-01T10:00:00Z"));

        let mut record = conversation_record("bob", 1);
        record.last_message = Some(MessageRecord {
            id: "m1".into(),
            sender: "bob".into(),
            recipient: "alice".into(),
            content: "from bob".into(),
            message_type: MessageType::Text,
            created_at: "2026-03-01T10:00:00Z".parse().unwrap(),
            is_read: false,
            temp_id: None,
        });
        store.merge_conversations(vec![record]);

        assert_eq!(store.messages(&bob).len(), 1);
        assert_eq!(store.conversation(&bob).unwrap().participant.name, "BOB");
    }

    #[test]
    fn test_history_merge_skips_foreign_messages() {
        let mut store = store();
        let bob = ParticipantId::new("bob");
        let changed = store.merge_history(
            &bob,
            vec![
                inbound("m1", "bob", "2026-03-01T10:00:00Z"),
                inbound("m2", "carol", "2026-03-01T10:01:00Z"),
            ],
        );
        assert_eq!(changed, 1);
        assert_eq!(store.messages(&bob).len(), 1);
        assert_eq!(store.conversation(&bob).unwrap().unread_count, 0);
    }

    #[test]
    fn test_conversations_sorted_by_recency() {
        let mut store = store();
        store.receive(inbound("m1", "bob", "2026-03-01T10:00:00Z"));
        store.receive(inbound("m2", "carol", "2026-03-01T11:00:00Z"));

        let order: Vec<_> = store
            .conversations()
            .into_iter()
            .map(|c| c.participant.id.0)
            .collect();
        assert_eq!(order, ["carol", "bob"]);
    }

    #[test]
    fn test_lazy_conversation_uses_directory_name() {
        let mut store = store();
        let message = Message::optimistic(
            ParticipantId::new("alice"),
            ParticipantId::new("carol"),
            "hi",
            MessageType::Text,
        );
        let receipt = store.append_optimistic(message);

        assert_eq!(receipt.participant.as_str(), "carol");
        assert_eq!(
            store.conversation(&receipt.participant).unwrap().participant.name,
            "Carol"
        );
        assert!(!receipt.counted_unread);
    }
}
