//! Brings local state back in line with the backend after a reconnect.
//!
//! Fetches run detached from the engine; their results come back as
//! [`Refresh`] values and are applied through the store's normal merge, so
//! reconciling is idempotent.

use std::future::Future;
use std::sync::Arc;

use parley_net::api::Backend;
use parley_net::{ConversationRecord, MessageRecord, UnreadCount};
use tracing::{debug, warn};

use crate::message::{Message, ParticipantId};
use crate::store::ConversationStore;

/// A completed fetch.
#[derive(Debug)]
pub enum Refresh {
    /// Conversation list.
    Conversations(parley_net::Result<Vec<ConversationRecord>>),
    /// History of one conversation.
    History {
        /// Conversation fetched.
        participant: ParticipantId,
        /// Fetch result.
        result: parley_net::Result<Vec<MessageRecord>>,
    },
    /// Server-side unread total.
    Unread(parley_net::Result<UnreadCount>),
}

/// What applying a refresh changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// The conversation list was replaced.
    pub conversations: bool,
    /// A thread gained or changed messages.
    pub history: Option<ParticipantId>,
    /// Server-side unread total.
    pub unread_total: Option<u32>,
}

impl Refresh {
    /// Folds the fetched data into `store`. Failed fetches change nothing.
    pub fn apply(self, store: &mut ConversationStore) -> Applied {
        let mut applied = Applied::default();
        match self {
            Self::Conversations(Ok(records)) => {
                debug!(count = records.len(), "Reconciled conversations");
                store.merge_conversations(records);
                applied.conversations = true;
            }
            Self::History {
                participant,
                result: Ok(records),
            } => {
                let me = store.me().clone();
                let history = records
                    .into_iter()
                    .map(|r| Message::from_record(r, &me))
                    .collect();
                let changed = store.merge_history(&participant, history);
                debug!(%participant, changed, "Reconciled history");
                if changed > 0 {
                    applied.history = Some(participant);
                }
            }
            Self::Unread(Ok(count)) => applied.unread_total = Some(count.unread_count),
            Self::Conversations(Err(e)) => warn!(error = %e, "Failed to fetch conversations"),
            Self::History {
                participant,
                result: Err(e),
            } => warn!(%participant, error = %e, "Failed to fetch history"),
            Self::Unread(Err(e)) => warn!(error = %e, "Failed to fetch unread count"),
        }
        applied
    }
}

/// Issues backend fetches.
#[derive(Debug)]
pub struct Reconciler<B> {
    backend: Arc<B>,
}

impl<B> Clone for Reconciler<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: Backend> Reconciler<B> {
    /// Creates a reconciler over `backend`.
    pub const fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Fetches the conversation list.
    pub fn conversations(&self) -> impl Future<Output = Refresh> + Send + 'static {
        let backend = Arc::clone(&self.backend);
        async move { Refresh::Conversations(backend.conversations().await) }
    }

    /// Fetches the history of the conversation with `participant`.
    pub fn history(&self, participant: ParticipantId) -> impl Future<Output = Refresh> + Send + 'static {
        let backend = Arc::clone(&self.backend);
        async move {
            let result = backend.conversation_messages(participant.0.clone()).await;
            Refresh::History {
                participant,
                result,
            }
        }
    }

    /// Fetches the server-side unread total.
    pub fn unread(&self) -> impl Future<Output = Refresh> + Send + 'static {
        let backend = Arc::clone(&self.backend);
        async move { Refresh::Unread(backend.unread_count().await) }
    }

    /// Marks the conversation with `participant` read on the backend.
    pub fn mark_read(&self, participant: ParticipantId) -> impl Future<Output = ()> + Send + 'static {
        let backend = Arc::clone(&self.backend);
        async move {
            if let Err(e) = backend.mark_conversation_read(participant.0.clone()).await {
                warn!(%participant, error = %e, "Failed to mark conversation read");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parley_net::{MessageType, ParticipantRecord};

    use super::*;
    use crate::conversation::Participant;

    fn record(id: &str) -> MessageRecord {
        MessageRecord {
            id: id.into(),
            sender: "bob".into(),
            recipient: "alice".into(),
            content: "hi".into(),
            message_type: MessageType::Text,
            created_at: "2026-03-01T10:00:00Z".parse().unwrap(),
            is_read: false,
            temp_id: None,
        }
    }

    fn store() -> ConversationStore {
        let mut store = ConversationStore::new(ParticipantId::new("alice"));
        store.add_participant(Participant::new("bob", "Bob"));
        store
    }

    #[test]
    fn test_history_is_idempotent() {
        let mut store = store();
        let bob = ParticipantId::new("bob");

        let first = Refresh::History {
            participant: bob.clone(),
            result: Ok(vec![record("m1"), record("m2")]),
        }
        .apply(&mut store);
        assert_eq!(first.history, Some(bob.clone()));

        let second = Refresh::History {
            participant: bob.clone(),
            result: Ok(vec![record("m1"), record("m2")]),
        }
        .apply(&mut store);
        assert_eq!(second.history, None);
        assert_eq!(store.messages(&bob).len(), 2);
    }

    #[test]
    fn test_failed_fetch_changes_nothing() {
        let mut store = store();
        let applied = Refresh::Conversations(Err(parley_net::Error::NotConnected)).apply(&mut store);
        assert_eq!(applied, Applied::default());
        assert!(store.conversations().is_empty());
    }

    #[test]
    fn test_conversations_and_unread() {
        let mut store = store();
        let applied = Refresh::Conversations(Ok(vec![ConversationRecord {
            participant: ParticipantRecord::new("bob", "Bob"),
            last_message: Some(record("m1")),
            unread_count: 1,
        }]))
        .apply(&mut store);
        assert!(applied.conversations);
        assert_eq!(store.total_unread(), 1);

        let applied = Refresh::Unread(Ok(UnreadCount { unread_count: 7 })).apply(&mut store);
        assert_eq!(applied.unread_total, Some(7));
    }
}
