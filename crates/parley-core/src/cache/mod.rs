//! Local cache of server-confirmed state.
//!
//! Conversations and messages fetched from the backend are written here so
//! the last known state can be shown before the network answers.

mod repository;

pub use repository::CacheRepository;
