//! Error types for the network library.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur talking to the backend or over the channel.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request error (connect, TLS, body decoding).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Backend answered with a non-success status.
    #[error("Backend returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body, if any.
        message: String,
    },

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The channel is not connected.
    #[error("Channel is not connected")]
    NotConnected,

    /// The channel task has gone away.
    #[error("Channel closed")]
    ChannelClosed,

    /// Unexpected data on the wire.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server refused the channel identity.
    #[error("Authentication failed: {0}")]
    Auth(String),
}

/// How a failed durable request should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connectivity problem; retrying later may succeed.
    Transient,
    /// The backend understood and refused the request.
    Rejected,
}

impl Error {
    /// Classifies this error for retry decisions.
    ///
    /// Timeouts, transport failures, `408`, `429` and `5xx` are transient.
    /// Any other `4xx` is a rejection, as are malformed payloads.
    #[must_use]
    pub fn classify(&self) -> FailureKind {
        match self {
            Self::Status { status, .. } => match status {
                408 | 429 => FailureKind::Transient,
                400..=499 => FailureKind::Rejected,
                _ => FailureKind::Transient,
            },
            Self::Http(e) => match e.status() {
                Some(status) if status.is_client_error() => {
                    Self::Status {
                        status: status.as_u16(),
                        message: String::new(),
                    }
                    .classify()
                }
                _ if e.is_decode() => FailureKind::Rejected,
                _ => FailureKind::Transient,
            },
            Self::Json(_) | Self::Url(_) | Self::Auth(_) => FailureKind::Rejected,
            Self::WebSocket(_)
            | Self::Timeout(_)
            | Self::NotConnected
            | Self::ChannelClosed
            | Self::Protocol(_) => FailureKind::Transient,
        }
    }

    /// Returns true if a later retry may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.classify() == FailureKind::Transient
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
