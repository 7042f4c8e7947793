//! Channel configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Wire transport used by the duplex channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Persistent WebSocket (`/channel/ws`). **Preferred.**
    WebSocket,
    /// HTTP long polling (`/channel/poll`). Works through restrictive proxies.
    Polling,
}

impl TransportKind {
    /// Short name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::Polling => "polling",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Duplex channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Channel server base URL (`http`/`https`).
    pub url: Url,
    /// Identity sent in the `authenticate` handshake.
    pub participant: String,
    /// Transports to try, in order, on every connection attempt.
    pub transports: Vec<TransportKind>,
    /// Connection attempts before giving up until the app is foregrounded.
    pub max_reconnect_attempts: u32,
    /// Base delay; attempt `n` waits `n * reconnect_delay`.
    pub reconnect_delay: Duration,
    /// Timeout for establishing one transport.
    pub connect_timeout: Duration,
    /// Pause between empty long polls.
    pub poll_interval: Duration,
}

impl ChannelConfig {
    /// Creates a configuration builder.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or is not `http`/`https`.
    pub fn builder(url: &str, participant: impl Into<String>) -> Result<ChannelConfigBuilder> {
        ChannelConfigBuilder::new(url, participant)
    }

    /// Delay before the retry that follows failed attempt `attempt`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.reconnect_delay.saturating_mul(attempt.max(1))
    }

    /// WebSocket endpoint derived from the base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot carry a `ws` scheme.
    pub fn websocket_url(&self) -> Result<Url> {
        let mut url = self.endpoint("ws")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| Error::Protocol(format!("cannot derive WebSocket URL from {}", self.url)))?;
        Ok(url)
    }

    /// HTTP endpoint under `/channel/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot be a base.
    pub fn endpoint(&self, action: &str) -> Result<Url> {
        let mut url = self.url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Protocol(format!("{} cannot be a base URL", self.url)))?
            .pop_if_empty()
            .extend(["channel", action]);
        Ok(url)
    }
}

/// Builder for channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfigBuilder {
    url: Url,
    participant: String,
    transports: Vec<TransportKind>,
    max_reconnect_attempts: u32,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    poll_interval: Duration,
}

impl ChannelConfigBuilder {
    /// Creates a new builder with the default reconnection policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or is not `http`/`https`.
    pub fn new(url: &str, participant: impl Into<String>) -> Result<Self> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Protocol(format!(
                "channel URL must be http or https, got {}",
                url.scheme()
            )));
        }

        Ok(Self {
            url,
            participant: participant.into(),
            transports: vec![TransportKind::WebSocket, TransportKind::Polling],
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(1000),
            connect_timeout: Duration::from_secs(20),
            poll_interval: Duration::from_secs(1),
        })
    }

    /// Sets the transport order.
    #[must_use]
    pub fn transports(mut self, transports: impl Into<Vec<TransportKind>>) -> Self {
        self.transports = transports.into();
        self
    }

    /// Sets the retry bound.
    #[must_use]
    pub const fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the base reconnect delay.
    #[must_use]
    pub const fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the per-transport connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the long-poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ChannelConfig {
        let transports = if self.transports.is_empty() {
            vec![TransportKind::WebSocket]
        } else {
            self.transports
        };

        ChannelConfig {
            url: self.url,
            participant: self.participant,
            transports,
            max_reconnect_attempts: self.max_reconnect_attempts.max(1),
            reconnect_delay: self.reconnect_delay,
            connect_timeout: self.connect_timeout,
            poll_interval: self.poll_interval,
        }
    }
}
