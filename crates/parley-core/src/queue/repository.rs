//! Offline queue storage repository.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::model::QueuedMessage;
use crate::Result;
use crate::message::{Message, TempId};

/// FIFO queue of undelivered messages backed by `SQLite`.
#[derive(Debug, Clone)]
pub struct QueueRepository {
    pool: SqlitePool,
}

impl QueueRepository {
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
            .max_connections(1)
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
            CREATE TABLE IF NOT EXISTS offline_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                temp_id TEXT NOT NULL UNIQUE,
                payload TEXT NOT NULL,
                queued_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Appends a message to the tail of the queue.
    ///
    /// Returns false if a message with the same temp id is already queued;
    /// the existing entry keeps its place.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn enqueue(&self, entry: &QueuedMessage) -> Result<bool> {
        let payload = serde_json::to_string(&entry.message)?;
        let result = sqlx::query(
            r"
            INSERT INTO offline_queue (temp_id, payload, queued_at)
            VALUES (?, ?, ?)
            ON CONFLICT(temp_id) DO NOTHING
            ",
        )
        .bind(entry.temp_id.as_str())
        .bind(payload)
        .bind(entry.queued_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All entries, oldest first.
    ///
    /// Rows that no longer decode are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn entries(&self) -> Result<Vec<QueuedMessage>> {
        let rows = sqlx::query(
            r"
            SELECT temp_id, payload, queued_at
            FROM offline_queue
            ORDER BY seq ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .iter()
            .filter_map(|row| {
                let temp_id: String = row.get("temp_id");
                let payload: String = row.get("payload");
                let queued_at: String = row.get("queued_at");

                let message = match serde_json::from_str::<Message>(&payload) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!(%temp_id, error = %e, "Skipping unreadable queue entry");
                        return None;
                    }
                };
                let queued_at = DateTime::parse_from_rfc3339(&queued_at)
                    .ok()?
                    .with_timezone(&Utc);

                Some(QueuedMessage {
                    temp_id: TempId(temp_id),
                    message,
                    queued_at,
                })
            })
            .collect();

        Ok(entries)
    }

    /// Removes an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn remove(&self, temp_id: &TempId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM offline_queue WHERE temp_id = ?")
            .bind(temp_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Returns true if `temp_id` is queued.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn contains(&self, temp_id: &TempId) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM offline_queue WHERE temp_id = ?")
            .bind(temp_id.as_str())
            .fetch_one(&self.pool)
            .await?;

        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    /// Number of queued messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn len(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM offline_queue")
            .fetch_one(&self.pool)
            .await?;

        let count: i64 = row.get("count");
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Returns true if nothing is queued.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Drops every queued message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM offline_queue")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
