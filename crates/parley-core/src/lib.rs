//! # parley-core
//!
//! Delivery and offline-reconciliation engine for Parley messaging.
//!
//! This crate provides:
//! - Conversation state with one merge path for every message view
//! - **Durable-first sends** - backend write, then live channel, then offline queue
//! - **Offline queue** - FIFO, persisted in `SQLite`, replayed on reconnect
//! - Reconciliation with the backend after reconnects
//! - Presence and connectivity notices
//! - Local cache and session storage (`SQLite`, system keyring)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod conversation;
pub mod engine;
mod error;
pub mod gateway;
pub mod message;
pub mod presence;
pub mod probe;
pub mod queue;
pub mod reconciler;
pub mod session;
pub mod store;

pub use cache::CacheRepository;
pub use conversation::{Conversation, ConversationPhase, Participant};
pub use engine::{ChannelSink, Engine, EngineConfig, EngineEvent, EngineHandle, EngineSnapshot};
pub use error::{Error, Result};
pub use gateway::{SendRequest, ValidationError};
pub use message::{Message, MessageId, MessageStatus, ParticipantId, TempId};
pub use presence::{ConnectionState, NOTICE_WINDOW, NoticeKind};
pub use queue::{QueueRepository, QueuedMessage};
pub use session::credentials;
pub use session::{CredentialError, CredentialResult, CurrentUser, SessionRepository};
pub use store::ConversationStore;
