//! # parley-net
//!
//! Network layer for the Parley messaging engine.
//!
//! ## Features
//!
//! - **Durable API**: `reqwest` client for the backend of record
//!   (send, conversations, history, unread counts, read receipts)
//! - **Duplex channel**: JSON event frames over WebSocket, with HTTP long
//!   polling as a fallback transport
//! - **Connection manager**: one live channel per session, authentication
//!   handshake, room re-join and bounded linear-backoff reconnection
//! - **Failure classification**: transient connectivity failures vs.
//!   backend rejections, so callers can decide between retrying and failing
//!
//! ## Quick Start
//!
//! ```ignore
//! use parley_net::api::{ApiConfig, Backend, HttpBackend};
//! use parley_net::channel::{ChannelConfig, ConnectionManager, DefaultConnector};
//!
//! let api = HttpBackend::new(ApiConfig::new("https://api.example.com/api/")?.with_token(token))?;
//! let conversations = api.conversations().await?;
//!
//! let (events_tx, mut events) = tokio::sync::mpsc::channel(256);
//! let config = ChannelConfig::builder("https://api.example.com", "alice")?.build();
//! let (channel, _task) = ConnectionManager::spawn(config, DefaultConnector::new()?, events_tx);
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod api;
pub mod channel;
mod error;
pub mod record;

pub use error::{Error, FailureKind, Result};
pub use record::{
    ConversationRecord, MessageRecord, MessageType, ParticipantRecord, SendMessageRequest,
    UnreadCount,
};
