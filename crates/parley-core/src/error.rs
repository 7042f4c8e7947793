//! Error types for the core library.

use thiserror::Error;

use crate::gateway::ValidationError;
use crate::session::credentials::CredentialError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Backend or channel operation failed.
    #[error("Network error: {0}")]
    Net(#[from] parley_net::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A send request failed validation.
    #[error("Invalid message: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential storage error.
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// The engine task has stopped.
    #[error("Engine stopped")]
    EngineStopped,
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
