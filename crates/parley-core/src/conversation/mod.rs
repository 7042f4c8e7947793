//! Conversations and the participants they are held with.

mod model;

pub use model::{Conversation, ConversationPhase, Participant};
