//! Cache storage repository.

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::Result;
use crate::conversation::{Conversation, Participant};
use crate::message::{Message, ParticipantId};

/// Repository for cached conversations and messages.
#[derive(Debug, Clone)]
pub struct CacheRepository {
    pool: SqlitePool,
}

impl CacheRepository {
    /// Create a new repository with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS cached_conversations (
                participant_id TEXT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                avatar TEXT,
                role TEXT,
                unread_count INTEGER NOT NULL DEFAULT 0,
                last_message TEXT,
                cached_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS cached_messages (
                id TEXT PRIMARY KEY,
                participant_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_cached_messages_participant
            ON cached_messages(participant_id, created_at)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Cache conversation summaries, replacing earlier copies.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn save_conversations(&self, conversations: &[Conversation]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        for conversation in conversations {
            let last_message = conversation
                .last_message
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            let participant = &conversation.participant;

            sqlx::query(
                r"
                INSERT INTO cached_conversations
                    (participant_id, name, avatar, role, unread_count, last_message, cached_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(participant_id) DO UPDATE SET
                    name = excluded.name,
                    avatar = excluded.avatar,
                    role = excluded.role,
                    unread_count = excluded.unread_count,
                    last_message = excluded.last_message,
                    cached_at = excluded.cached_at
                ",
            )
            .bind(participant.id.as_str())
            .bind(&participant.name)
            .bind(&participant.avatar)
            .bind(&participant.role)
            .bind(conversation.unread_count)
            .bind(last_message)
            .bind(&now)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Get cached conversations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn conversations(&self) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            r"
            SELECT participant_id, name, avatar, role, unread_count, last_message
            FROM cached_conversations
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let conversations = rows
            .iter()
            .map(|row| {
                let last_message: Option<String> = row.get("last_message");
                let mut conversation = Conversation::new(Participant {
                    id: ParticipantId(row.get("participant_id")),
                    name: row.get("name"),
                    avatar: row.get("avatar"),
                    role: row.get("role"),
                });
                conversation.unread_count = row.get::<u32, _>("unread_count");
                conversation.last_message =
                    last_message.and_then(|json| serde_json::from_str(&json).ok());
                conversation
            })
            .collect();

        Ok(conversations)
    }

    /// Cache server-confirmed messages of one conversation.
    ///
    /// Messages without a server id are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn save_messages(&self, participant: &ParticipantId, messages: &[Message]) -> Result<()> {
        for message in messages {
            let Some(id) = &message.id else {
                continue;
            };
            let payload = serde_json::to_string(message)?;

            sqlx::query(
                r"
                INSERT INTO cached_messages (id, participant_id, payload, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    payload = excluded.payload,
                    created_at = excluded.created_at
                ",
            )
            .bind(id.as_str())
            .bind(participant.as_str())
            .bind(payload)
            .bind(message.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Get cached messages, optionally for one conversation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn messages(&self, participant: Option<&ParticipantId>) -> Result<Vec<Message>> {
        let rows = match participant {
            Some(participant) => {
                sqlx::query(
                    r"
                    SELECT payload FROM cached_messages
                    WHERE participant_id = ?
                    ORDER BY created_at ASC
                    ",
                )
                .bind(participant.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT payload FROM cached_messages ORDER BY created_at ASC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let messages = rows
            .iter()
            .filter_map(|row| {
                let payload: String = row.get("payload");
                serde_json::from_str(&payload).ok()
            })
            .collect();

        Ok(messages)
    }

    /// Drop everything cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM cached_messages")
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM cached_conversations")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parley_net::{MessageRecord, MessageType};

    use super::*;

    fn message(id: &str, at: &str) -> Message {
        let record = MessageRecord {
            id: id.into(),
            sender: "bob".into(),
            recipient: "alice".into(),
            content: format!("message {id}"),
            message_type: MessageType::Text,
            created_at: at.parse().unwrap(),
            is_read: false,
            temp_id: None,
        };
        Message::from_record(record, &ParticipantId::new("alice"))
    }

    #[tokio::test]
    async fn test_conversation_roundtrip_with_update() {
        let repo = CacheRepository::in_memory().await.unwrap();
        let mut conversation = Conversation::new(Participant::new("bob", "Bob"));
        conversation.unread_count = 2;
        conversation.last_message = Some(message("m1", "2026-03-01T10:00:00Z"));
        repo.save_conversations(std::slice::from_ref(&conversation))
            .await
            .unwrap();

        conversation.unread_count = 0;
        repo.save_conversations(std::slice::from_ref(&conversation))
            .await
            .unwrap();

        let cached = repo.conversations().await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].unread_count, 0);
        assert_eq!(cached[0].last_message, conversation.last_message);
    }

    #[tokio::test]
    async fn test_messages_skip_unconfirmed_and_sort() {
        let repo = CacheRepository::in_memory().await.unwrap();
        let bob = ParticipantId::new("bob");
        let unconfirmed = Message::optimistic(
            ParticipantId::new("alice"),
            bob.clone(),
            "pending",
            MessageType::Text,
        );
        repo.save_messages(
            &bob,
            &[
                message("m2", "2026-03-01T11:00:00Z"),
                message("m1", "2026-03-01T10:00:00Z"),
                unconfirmed,
            ],
        )
        .await
        .unwrap();

        let ids: Vec<_> = repo
            .messages(Some(&bob))
            .await
            .unwrap()
            .into_iter()
            .filter_map(|m| m.id.map(|id| id.0))
            .collect();
        assert_eq!(ids, ["m1", "m2"]);
        assert!(repo.messages(Some(&ParticipantId::new("carol"))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let repo = CacheRepository::in_memory().await.unwrap();
        let bob = ParticipantId::new("bob");
        repo.save_messages(&bob, &[message("m1", "2026-03-01T10:00:00Z")])
            .await
            .unwrap();
        repo.clear().await.unwrap();
        assert!(repo.messages(None).await.unwrap().is_empty());
    }
}
