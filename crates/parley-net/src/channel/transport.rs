//! Wire transports for the duplex channel.
//!
//! A [`Transport`] moves text frames in both directions; a [`Connector`]
//! builds one for a given [`TransportKind`]. The connection manager only
//! sees these traits, so tests drive it with in-memory transports.

use std::future::Future;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::config::{ChannelConfig, TransportKind};
use crate::error::{Error, Result};

/// A connected, bidirectional frame pipe.
pub trait Transport: Send + 'static {
    /// Sends one text frame.
    fn send(&mut self, frame: String) -> impl Future<Output = Result<()>> + Send;

    /// Receives the next text frame; `None` once the peer has closed.
    ///
    /// Must be cancel-safe: the manager polls it inside `select!`.
    fn recv(&mut self) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Closes the transport.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Builds transports.
pub trait Connector: Send + Sync + 'static {
    /// Transport produced by this connector.
    type Transport: Transport;

    /// Opens a transport of the given kind.
    fn connect(
        &self,
        kind: TransportKind,
        config: &ChannelConfig,
    ) -> impl Future<Output = Result<Self::Transport>> + Send;
}

/// WebSocket transport.
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketTransport {
    /// Connects to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP, TLS or WebSocket handshake fails.
    pub async fn connect(url: &Url) -> Result<Self> {
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        Ok(Self { stream })
    }
}

impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.stream.send(Message::text(frame)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                // Pings are answered by tungstenite on the next read or write.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Binary(_))) => {
                    tracing::debug!("Ignoring binary frame");
                }
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct OpenResponse {
    sid: String,
}

/// HTTP long-polling transport.
///
/// A background task keeps one poll outstanding and forwards frames into a
/// buffer, which keeps [`Transport::recv`] cancel-safe.
pub struct PollingTransport {
    http_client: reqwest::Client,
    emit_url: Url,
    close_url: Url,
    inbound: mpsc::Receiver<Result<String>>,
    poller: JoinHandle<()>,
}

impl PollingTransport {
    /// Opens a polling session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be opened.
    pub async fn connect(http_client: reqwest::Client, config: &ChannelConfig) -> Result<Self> {
        let response = http_client
            .post(config.endpoint("open")?)
            .send()
            .await?
            .error_for_status()?;
        let OpenResponse { sid } = response.json().await?;

        let with_sid = |action: &str| -> Result<Url> {
            let mut url = config.endpoint(action)?;
            url.query_pairs_mut().append_pair("sid", &sid);
            Ok(url)
        };
        let poll_url = with_sid("poll")?;
        let emit_url = with_sid("emit")?;
        let close_url = with_sid("close")?;

        let (tx, inbound) = mpsc::channel(64);
        let poller = tokio::spawn(poll_loop(
            http_client.clone(),
            poll_url,
            config.poll_interval,
            tx,
        ));

        Ok(Self {
            http_client,
            emit_url,
            close_url,
            inbound,
            poller,
        })
    }
}

async fn poll_loop(
    http_client: reqwest::Client,
    url: Url,
    interval: std::time::Duration,
    tx: mpsc::Sender<Result<String>>,
) {
    loop {
        let batch = async {
            let response = http_client
                .get(url.clone())
                .send()
                .await?
                .error_for_status()?;
            Ok::<Vec<serde_json::Value>, Error>(response.json().await?)
        }
        .await;

        match batch {
            Ok(frames) if frames.is_empty() => tokio::time::sleep(interval).await,
            Ok(frames) => {
                for frame in frames {
                    if tx.send(Ok(frame.to_string())).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        }
    }
}

impl Transport for PollingTransport {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.http_client
            .post(self.emit_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(frame)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        match self.inbound.recv().await {
            Some(frame) => frame.map(Some),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.poller.abort();
        self.http_client
            .post(self.close_url.clone())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl Drop for PollingTransport {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

/// Either of the built-in transports.
pub enum AnyTransport {
    /// WebSocket.
    WebSocket(Box<WebSocketTransport>),
    /// Long polling.
    Polling(PollingTransport),
}

impl Transport for AnyTransport {
    async fn send(&mut self, frame: String) -> Result<()> {
        match self {
            Self::WebSocket(t) => t.send(frame).await,
            Self::Polling(t) => t.send(frame).await,
        }
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        match self {
            Self::WebSocket(t) => t.recv().await,
            Self::Polling(t) => t.recv().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            Self::WebSocket(t) => t.close().await,
            Self::Polling(t) => t.close().await,
        }
    }
}

/// Connector for the built-in WebSocket and polling transports.
#[derive(Debug, Clone)]
pub struct DefaultConnector {
    http_client: reqwest::Client,
}

impl DefaultConnector {
    /// Creates a connector.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Ok(Self {
            http_client: reqwest::Client::builder().build()?,
        })
    }
}

impl Connector for DefaultConnector {
    type Transport = AnyTransport;

    async fn connect(&self, kind: TransportKind, config: &ChannelConfig) -> Result<AnyTransport> {
        match kind {
            TransportKind::WebSocket => {
                let url = config.websocket_url()?;
                let transport = WebSocketTransport::connect(&url).await?;
                Ok(AnyTransport::WebSocket(Box::new(transport)))
            }
            TransportKind::Polling => {
                let transport = PollingTransport::connect(self.http_client.clone(), config).await?;
                Ok(AnyTransport::Polling(transport))
            }
        }
    }
}
