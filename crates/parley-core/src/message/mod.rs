//! Messages and their delivery lifecycle.
//!
//! A message starts as an optimistic local copy keyed by a [`TempId`] and
//! becomes authoritative once the backend assigns a [`MessageId`].

mod model;

pub use model::{Message, MessageId, MessageStatus, ParticipantId, TempId};
