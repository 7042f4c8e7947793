//! Durable request/response API.
//!
//! The backend of record. A successful [`Backend::send_message`] means the
//! message is permanently stored; everything pushed over the channel is
//! advisory by comparison.

mod http;

use std::future::Future;
use std::time::Duration;

use url::Url;

pub use http::HttpBackend;

use crate::error::Result;
use crate::record::{ConversationRecord, MessageRecord, SendMessageRequest, UnreadCount};

/// Configuration for the durable API client.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://api.example.com/api/`.
    pub base_url: Url,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Bearer token sent with every request.
    pub token: Option<String>,
}

impl ApiConfig {
    /// Creates a configuration for the given base URL with a 15 second timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            request_timeout: Duration::from_secs(15),
            token: None,
        })
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// The durable backend of record.
///
/// Implemented over HTTP by [`HttpBackend`]; tests substitute scripted
/// implementations.
pub trait Backend: Send + Sync + 'static {
    /// Persists a message. `POST /messages/send`.
    fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> impl Future<Output = Result<MessageRecord>> + Send;

    /// Lists conversations. `GET /messages/conversations`.
    fn conversations(&self) -> impl Future<Output = Result<Vec<ConversationRecord>>> + Send;

    /// Message history with one participant. `GET /messages/conversation/{id}`.
    fn conversation_messages(
        &self,
        participant: String,
    ) -> impl Future<Output = Result<Vec<MessageRecord>>> + Send;

    /// Total unread count. `GET /messages/unread-count`.
    fn unread_count(&self) -> impl Future<Output = Result<UnreadCount>> + Send;

    /// Marks every message from `participant` as read.
    fn mark_conversation_read(
        &self,
        participant: String,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Marks one message as read.
    fn mark_message_read(&self, message_id: String) -> impl Future<Output = Result<()>> + Send;
}
