//! In-memory conversation state.
//!
//! Every message view, whether an optimistic append, a server confirmation,
//! a pushed event or a history fetch, enters through the same merge, so a
//! logical message appears at most once per thread.

mod conversations;
mod thread;

pub use conversations::{ConversationStore, Receipt};
pub use thread::{MergeOutcome, Thread};
