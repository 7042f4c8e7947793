//! The engine's view of the duplex channel.

use parley_net::channel::{AppState, ChannelHandle, ClientEvent, RoomId};

/// Outbound side of the channel.
///
/// The engine learns about connectivity from channel events, not from the
/// sink, so implementations only forward.
pub trait ChannelSink: Send + Sync + 'static {
    /// Emits an event on the live channel.
    ///
    /// # Errors
    ///
    /// Returns an error when no live channel exists.
    fn emit(&self, event: ClientEvent) -> parley_net::Result<()>;

    /// Joins a room now and after reconnects.
    ///
    /// # Errors
    ///
    /// Returns an error after the channel was shut down.
    fn join_room(&self, room: RoomId) -> parley_net::Result<()>;

    /// Leaves a room.
    ///
    /// # Errors
    ///
    /// Returns an error after the channel was shut down.
    fn leave_room(&self, room: RoomId) -> parley_net::Result<()>;

    /// Forwards a host lifecycle change.
    ///
    /// # Errors
    ///
    /// Returns an error after the channel was shut down.
    fn app_state_changed(&self, state: AppState) -> parley_net::Result<()>;
}

impl ChannelSink for ChannelHandle {
    fn emit(&self, event: ClientEvent) -> parley_net::Result<()> {
        Self::emit(self, event)
    }

    fn join_room(&self, room: RoomId) -> parley_net::Result<()> {
        Self::join_room(self, room)
    }

    fn leave_room(&self, room: RoomId) -> parley_net::Result<()> {
        Self::leave_room(self, room)
    }

    fn app_state_changed(&self, state: AppState) -> parley_net::Result<()> {
        Self::app_state_changed(self, state)
    }
}
