//! Durable offline queue.
//!
//! Messages that could not be delivered wait here, in send order, until a
//! live channel and network are both available. Entries survive restarts.

mod model;
mod repository;

pub use model::QueuedMessage;
pub use repository::QueueRepository;
