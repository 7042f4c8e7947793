//! Send request validation.

use super::SendRequest;
use crate::store::ConversationStore;

/// Longest accepted message, in characters.
pub const MAX_CONTENT_CHARS: usize = 5000;

/// Validation error for a send request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Content is empty or whitespace.
    EmptyContent,
    /// Content exceeds [`MAX_CONTENT_CHARS`].
    ContentTooLong,
    /// Recipient is the sender.
    SelfRecipient,
    /// Recipient is not a known participant.
    UnknownRecipient,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyContent => "Message cannot be empty",
            Self::ContentTooLong => "Message is too long",
            Self::SelfRecipient => "You cannot message yourself",
            Self::UnknownRecipient => "Recipient not found",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyContent | Self::ContentTooLong => "content",
            Self::SelfRecipient | Self::UnknownRecipient => "recipient",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validation.
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Checks a send request against the store's directory.
///
/// # Errors
///
/// Returns the first problem found.
pub fn validate_send(request: &SendRequest, store: &ConversationStore) -> ValidationResult<()> {
    let content = request.content.trim();
    if content.is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ValidationError::ContentTooLong);
    }
    if &request.recipient == store.me() {
        return Err(ValidationError::SelfRecipient);
    }
    if !store.knows(&request.recipient) {
        return Err(ValidationError::UnknownRecipient);
    }
    Ok(())
}
