//! Duplex channel for server-pushed events.
//!
//! The channel is advisory: it carries broadcasts, presence and the
//! best-effort send path. Durable state lives behind [`crate::api`].

mod config;
pub mod event;
mod manager;
mod transport;

pub use config::{ChannelConfig, ChannelConfigBuilder, TransportKind};
pub use event::{ClientEvent, MessageNotification, OutgoingMessage, RoomId, ServerEvent};
pub use manager::{AppState, ChannelEvent, ChannelHandle, ConnectionManager};
pub use transport::{
    AnyTransport, Connector, DefaultConnector, PollingTransport, Transport, WebSocketTransport,
};
