//! Durable-first send path.
//!
//! A send is validated, appended optimistically, then written to the
//! backend. What happens when the write fails depends on why it failed and
//! on connectivity; [`route`] holds that decision.

mod route;
mod validation;

use std::future::Future;
use std::sync::Arc;

use parley_net::api::Backend;
use parley_net::{MessageRecord, MessageType};

pub use route::{DurableOutcome, SendRoute, route};
pub use validation::{MAX_CONTENT_CHARS, ValidationError, ValidationResult, validate_send};

use crate::message::{Message, ParticipantId, TempId};
use crate::store::ConversationStore;

/// A message the user asked to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    /// Recipient.
    pub recipient: ParticipantId,
    /// Text payload.
    pub content: String,
    /// Payload kind.
    pub message_type: MessageType,
}

impl SendRequest {
    /// A text message.
    #[must_use]
    pub fn text(recipient: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            recipient: ParticipantId::new(recipient),
            content: content.into(),
            message_type: MessageType::Text,
        }
    }
}

/// Entry point for outgoing messages.
#[derive(Debug)]
pub struct DurableSendGateway<B> {
    backend: Arc<B>,
}

impl<B> Clone for DurableSendGateway<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: Backend> DurableSendGateway<B> {
    /// Creates a gateway over `backend`.
    pub const fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Validates `request` and appends the optimistic copy to `store`.
    ///
    /// Nothing is appended when validation fails.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn begin(
        &self,
        store: &mut ConversationStore,
        request: SendRequest,
    ) -> ValidationResult<(TempId, Message)> {
        validate_send(&request, store)?;
        let temp_id = TempId::generate();
        let message = Message::pending(
            temp_id.clone(),
            store.me().clone(),
            request.recipient,
            request.content.trim(),
            request.message_type,
        );
        Ok((temp_id, store.append_optimistic(message).message))
    }

    /// The durable write for `message`, detached from the caller's borrows.
    pub fn persist(
        &self,
        message: &Message,
    ) -> impl Future<Output = parley_net::Result<MessageRecord>> + Send + 'static {
        let backend = Arc::clone(&self.backend);
        let request = message.send_request();
        async move { backend.send_message(request).await }
    }
}
