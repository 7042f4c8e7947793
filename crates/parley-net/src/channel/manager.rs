//! Connection manager with bounded automatic reconnection.
//!
//! The manager owns the one live transport for a session and runs as its
//! own task. Everything else talks to it through a [`ChannelHandle`] and
//! hears from it through [`ChannelEvent`]s.
//!
//! ## Lifecycle
//!
//! 1. Connect, trying each configured transport in order.
//! 2. Send `authenticate`, then re-join every remembered room.
//! 3. Forward server events until the transport drops.
//! 4. Retry up to `max_reconnect_attempts` times with linear backoff.
//! 5. When the bound is exhausted (or the server rejects the identity),
//!    stay disconnected until [`ChannelHandle::foreground`] asks for one
//!    more attempt.
//!
//! Connection errors never surface to callers as errors; callers observe
//! [`ChannelHandle::is_connected`] and the event stream.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::{ChannelConfig, TransportKind};
use super::event::{self, ClientEvent, RoomId, ServerEvent};
use super::transport::{Connector, Transport};
use crate::error::{Error, Result};

/// Notifications from the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel is up and authenticated.
    Connected {
        /// Transport that succeeded.
        transport: TransportKind,
    },
    /// The live channel dropped; reconnection is under way.
    Disconnected {
        /// Why the session ended.
        reason: String,
    },
    /// Retrying stopped; waiting for the app to come to the foreground.
    RetriesExhausted {
        /// Attempts made in the last round.
        attempts: u32,
    },
    /// An event pushed by the server.
    Server(ServerEvent),
}

/// Host application lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// Visible and interactive.
    Active,
    /// Hidden or suspended.
    Background,
}

#[derive(Debug)]
enum Command {
    Emit(ClientEvent),
    Join(RoomId),
    Leave(RoomId),
    Foreground,
    Shutdown,
}

/// Clonable front for a running [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    commands: mpsc::UnboundedSender<Command>,
    connected: watch::Receiver<bool>,
}

impl ChannelHandle {
    /// Returns true while a live, authenticated channel exists.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Emits an event on the live channel.
    ///
    /// Delivery is best effort: `Ok` means the frame was handed to the
    /// channel task, not that the server received it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] when the channel is down and
    /// [`Error::ChannelClosed`] after shutdown.
    pub fn emit(&self, event: ClientEvent) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.command(Command::Emit(event))
    }

    /// Joins a room now and after every reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] after shutdown.
    pub fn join_room(&self, room: RoomId) -> Result<()> {
        self.command(Command::Join(room))
    }

    /// Leaves a room and forgets it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] after shutdown.
    pub fn leave_room(&self, room: RoomId) -> Result<()> {
        self.command(Command::Leave(room))
    }

    /// Reports a host lifecycle change. Becoming active after retries were
    /// exhausted triggers one more connection attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] after shutdown.
    pub fn app_state_changed(&self, state: AppState) -> Result<()> {
        match state {
            AppState::Active => self.foreground(),
            AppState::Background => Ok(()),
        }
    }

    /// Asks for one more connection attempt if retries were exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] after shutdown.
    pub fn foreground(&self) -> Result<()> {
        self.command(Command::Foreground)
    }

    /// Closes the channel and stops the manager.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::ChannelClosed)
    }
}

enum Established<T> {
    Connected(T, TransportKind),
    Exhausted(u32),
    Shutdown,
}

enum SessionEnd {
    Lost(String),
    AuthRejected(String),
    Shutdown,
}

/// Owns the duplex channel for one session.
pub struct ConnectionManager<C: Connector> {
    config: ChannelConfig,
    connector: C,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<ChannelEvent>,
    connected: watch::Sender<bool>,
    rooms: BTreeSet<RoomId>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a manager and its handle. Events are delivered on `events`.
    #[must_use]
    pub fn new(
        config: ChannelConfig,
        connector: C,
        events: mpsc::Sender<ChannelEvent>,
    ) -> (Self, ChannelHandle) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (connected, connected_rx) = watch::channel(false);

        let manager = Self {
            config,
            connector,
            commands,
            events,
            connected,
            rooms: BTreeSet::new(),
        };
        let handle = ChannelHandle {
            commands: command_tx,
            connected: connected_rx,
        };
        (manager, handle)
    }

    /// Creates a manager and runs it on a new task.
    #[must_use]
    pub fn spawn(
        config: ChannelConfig,
        connector: C,
        events: mpsc::Sender<ChannelEvent>,
    ) -> (ChannelHandle, JoinHandle<()>) {
        let (manager, handle) = Self::new(config, connector, events);
        let task = tokio::spawn(manager.run());
        (handle, task)
    }

    /// Runs until [`ChannelHandle::shutdown`] or every handle is dropped.
    pub async fn run(mut self) {
        let mut budget = self.config.max_reconnect_attempts;

        loop {
            match self.establish(budget).await {
                Established::Connected(transport, kind) => {
                    info!(transport = %kind, "Channel connected");
                    self.connected.send_replace(true);
                    if !self.publish(ChannelEvent::Connected { transport: kind }).await {
                        break;
                    }

                    let end = self.session(transport).await;
                    self.connected.send_replace(false);

                    match end {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost(reason) => {
                            warn!(%reason, "Channel lost");
                            if !self.publish(ChannelEvent::Disconnected { reason }).await
                                || !self.pause(self.config.reconnect_delay).await
                            {
                                break;
                            }
                            budget = self.config.max_reconnect_attempts;
                        }
                        SessionEnd::AuthRejected(reason) => {
                            warn!(%reason, "Channel identity rejected");
                            if !self.publish(ChannelEvent::Disconnected { reason }).await
                                || !self.wait_for_foreground().await
                            {
                                break;
                            }
                            budget = 1;
                        }
                    }
                }
                Established::Exhausted(attempts) => {
                    warn!(attempts, "Giving up on channel until foreground");
                    if !self.publish(ChannelEvent::RetriesExhausted { attempts }).await
                        || !self.wait_for_foreground().await
                    {
                        break;
                    }
                    budget = 1;
                }
                Established::Shutdown => break,
            }
        }

        self.connected.send_replace(false);
        info!("Channel manager stopped");
    }

    /// Connects with up to `attempts` tries.
    async fn establish(&mut self, attempts: u32) -> Established<C::Transport> {
        for attempt in 1..=attempts {
            info!(attempt, "Connecting channel");

            match self.connect_once().await {
                Ok((transport, kind)) => return Established::Connected(transport, kind),
                Err(e) => warn!(?e, attempt, "Channel connection attempt failed"),
            }

            if attempt < attempts && !self.pause(self.config.backoff(attempt)).await {
                return Established::Shutdown;
            }
        }

        Established::Exhausted(attempts)
    }

    /// One attempt across the configured transports, including the handshake.
    async fn connect_once(&self) -> Result<(C::Transport, TransportKind)> {
        let mut last_error = Error::NotConnected;

        for &kind in &self.config.transports {
            let connect = self.connector.connect(kind, &self.config);
            let mut transport = match tokio::time::timeout(self.config.connect_timeout, connect).await
            {
                Ok(Ok(transport)) => transport,
                Ok(Err(e)) => {
                    debug!(?e, transport = %kind, "Transport failed, trying next");
                    last_error = e;
                    continue;
                }
                Err(_) => {
                    debug!(transport = %kind, "Transport timed out, trying next");
                    last_error = Error::Timeout(self.config.connect_timeout);
                    continue;
                }
            };

            match self.handshake(&mut transport).await {
                Ok(()) => return Ok((transport, kind)),
                Err(e) => {
                    debug!(?e, transport = %kind, "Handshake failed, trying next");
                    let _ = transport.close().await;
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn handshake(&self, transport: &mut C::Transport) -> Result<()> {
        let authenticate = ClientEvent::Authenticate(self.config.participant.clone());
        transport.send(event::encode(&authenticate)?).await?;

        for room in &self.rooms {
            transport
                .send(event::encode(&ClientEvent::JoinRoom(room.clone()))?)
                .await?;
        }
        Ok(())
    }

    async fn session(&mut self, mut transport: C::Transport) -> SessionEnd {
        loop {
            tokio::select! {
                frame = transport.recv() => match frame {
                    Ok(Some(text)) => match event::decode(&text) {
                        Ok(ServerEvent::AuthError(reason)) => {
                            let _ = transport.close().await;
                            return SessionEnd::AuthRejected(reason);
                        }
                        Ok(server_event) => {
                            if !self.publish(ChannelEvent::Server(server_event)).await {
                                let _ = transport.close().await;
                                return SessionEnd::Shutdown;
                            }
                        }
                        Err(e) => warn!(?e, "Skipping undecodable frame"),
                    },
                    Ok(None) => return SessionEnd::Lost("closed by server".to_string()),
                    Err(e) => return SessionEnd::Lost(e.to_string()),
                },
                command = self.commands.recv() => {
                    let outbound = match command {
                        Some(Command::Emit(event)) => Some(event),
                        Some(Command::Join(room)) => self
                            .rooms
                            .insert(room.clone())
                            .then(|| ClientEvent::JoinRoom(room)),
                        Some(Command::Leave(room)) => self
                            .rooms
                            .remove(&room)
                            .then(|| ClientEvent::LeaveRoom(room)),
                        Some(Command::Foreground) => None,
                        Some(Command::Shutdown) | None => {
                            let _ = transport.close().await;
                            return SessionEnd::Shutdown;
                        }
                    };

                    if let Some(event) = outbound {
                        let sent = match event::encode(&event) {
                            Ok(frame) => transport.send(frame).await,
                            Err(e) => Err(e),
                        };
                        if let Err(e) = sent {
                            warn!(?e, ?event, "Channel send failed, frame dropped");
                            return SessionEnd::Lost(e.to_string());
                        }
                    }
                }
            }
        }
    }

    /// Sleeps for `delay` while still honouring commands. Returns false on shutdown.
    async fn pause(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return true,
                command = self.commands.recv() => {
                    if !self.absorb_offline(command) {
                        return false;
                    }
                }
            }
        }
    }

    /// Blocks until the app is foregrounded. Returns false on shutdown.
    async fn wait_for_foreground(&mut self) -> bool {
        loop {
            let command = self.commands.recv().await;
            if matches!(command, Some(Command::Foreground)) {
                info!("Foregrounded, retrying channel");
                return true;
            }
            if !self.absorb_offline(command) {
                return false;
            }
        }
    }

    /// Applies a command received while disconnected. Returns false on shutdown.
    fn absorb_offline(&mut self, command: Option<Command>) -> bool {
        match command {
            Some(Command::Join(room)) => {
                self.rooms.insert(room);
            }
            Some(Command::Leave(room)) => {
                self.rooms.remove(&room);
            }
            Some(Command::Emit(event)) => {
                warn!(?event, "Dropping emit while disconnected");
            }
            Some(Command::Foreground) => {}
            Some(Command::Shutdown) | None => return false,
        }
        true
    }

    async fn publish(&self, event: ChannelEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.config.url.as_str())
            .field("participant", &self.config.participant)
            .field("connected", &*self.connected.borrow())
            .field("rooms", &self.rooms)
            .finish_non_exhaustive()
    }
}
