//! Client configuration persisted as JSON.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use parley_net::api::ApiConfig;
use parley_net::channel::{ChannelConfig, TransportKind};
use serde::{Deserialize, Serialize};
use url::Url;

/// Settings that persist across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Durable API base URL.
    pub api_url: String,
    /// Channel server URL.
    pub channel_url: String,
    /// Channel transports in preference order.
    pub transports: Vec<TransportKind>,
    /// Connection attempts before waiting for foreground.
    pub max_reconnect_attempts: u32,
    /// Base reconnect delay in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Durable request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Reachability probe interval in seconds; `None` disables the probe.
    pub probe_interval_secs: Option<u64>,
    /// Show desktop notifications for messages in closed conversations.
    pub desktop_notifications: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000/api/".to_string(),
            channel_url: "http://localhost:5000".to_string(),
            transports: vec![TransportKind::WebSocket, TransportKind::Polling],
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
            request_timeout_secs: 15,
            probe_interval_secs: Some(10),
            desktop_notifications: true,
        }
    }
}

impl ClientConfig {
    /// Durable API configuration carrying `token`.
    pub fn api(&self, token: String) -> Result<ApiConfig> {
        Ok(ApiConfig::new(&self.api_url)
            .with_context(|| format!("Invalid API URL {}", self.api_url))?
            .with_token(token)
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs)))
    }

    /// Channel configuration for `participant`.
    pub fn channel(&self, participant: &str) -> Result<ChannelConfig> {
        Ok(ChannelConfig::builder(&self.channel_url, participant)
            .with_context(|| format!("Invalid channel URL {}", self.channel_url))?
            .transports(self.transports.clone())
            .max_reconnect_attempts(self.max_reconnect_attempts)
            .reconnect_delay(Duration::from_millis(self.reconnect_delay_ms))
            .build())
    }

    /// `host:port` of the API server, for the reachability probe.
    pub fn probe_target(&self) -> Result<String> {
        let url = Url::parse(&self.api_url)?;
        let host = url.host_str().context("API URL has no host")?;
        let port = url
            .port_or_known_default()
            .context("API URL has no port")?;
        Ok(format!("{host}:{port}"))
    }
}

/// Default config file location.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parley")
        .join("config.json")
}

/// Database file location, creating its directory.
pub fn database_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parley");
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    Ok(data_dir.join("parley.db"))
}

/// Loads the configuration, falling back to defaults when the file is absent.
pub async fn load(path: &Path) -> Result<ClientConfig> {
    if !path.exists() {
        return Ok(ClientConfig::default());
    }

    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Invalid config {}", path.display()))
}

/// Saves the configuration.
pub async fn save(path: &Path, config: &ClientConfig) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    let contents = serde_json::to_string_pretty(config)?;
    tokio::fs::write(path, contents).await?;

    tracing::info!("Configuration saved to {:?}", path);
    Ok(())
}
