//! Session storage repository.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::model::CurrentUser;
use crate::Result;
use crate::conversation::Participant;
use crate::message::ParticipantId;

/// Repository for the single stored session.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    /// Create a new repository with the given database path.
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
            CREATE TABLE IF NOT EXISTS signed_in_user (
                slot INTEGER PRIMARY KEY CHECK (slot = 1),
                participant_id TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                avatar TEXT,
                role TEXT,
                signed_in_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stores `user`, replacing any previous session.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn save(&self, user: &CurrentUser) -> Result<()> {
        let participant = &user.participant;
        sqlx::query(
            r"
            INSERT INTO signed_in_user (slot, participant_id, name, avatar, role, signed_in_at)
            VALUES (1, ?, ?, ?, ?, ?)
            ON CONFLICT(slot) DO UPDATE SET
                participant_id = excluded.participant_id,
                name = excluded.name,
                avatar = excluded.avatar,
                role = excluded.role,
                signed_in_at = excluded.signed_in_at
            ",
        )
        .bind(participant.id.as_str())
        .bind(&participant.name)
        .bind(&participant.avatar)
        .bind(&participant.role)
        .bind(user.signed_in_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Loads the stored session.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn load(&self) -> Result<Option<CurrentUser>> {
        let row = sqlx::query(
            r"
            SELECT participant_id, name, avatar, role, signed_in_at
            FROM signed_in_user
            WHERE slot = 1
            ",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|row| {
            let signed_in_at: String = row.get("signed_in_at");
            let signed_in_at = DateTime::parse_from_rfc3339(&signed_in_at)
                .ok()?
                .with_timezone(&Utc);

            Some(CurrentUser {
                participant: Participant {
                    id: ParticipantId(row.get("participant_id")),
                    name: row.get("name"),
                    avatar: row.get("avatar"),
                    role: row.get("role"),
                },
                signed_in_at,
            })
        }))
    }

    /// Forgets the stored session.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM signed_in_user")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
