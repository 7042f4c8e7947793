//! `reqwest` implementation of [`Backend`].

use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::{ApiConfig, Backend};
use crate::error::{Error, Result};
use crate::record::{ConversationRecord, MessageRecord, SendMessageRequest, UnreadCount};

/// Responses come either bare or wrapped as `{ "success": …, "data": … }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Payload<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Payload<T> {
    fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "error")]
    message: String,
}

/// HTTP client for the durable backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    config: ApiConfig,
    http_client: Client,
}

impl HttpBackend {
    /// Creates a new backend client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Returns the configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Protocol(format!("{} cannot be a base URL", self.config.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn dispatch(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let request = match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(self.config.request_timeout)
            } else {
                Error::Http(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body).map_or(body, |b| b.message);
        tracing::debug!(status = status.as_u16(), %message, "Backend request failed");
        Err(Error::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.dispatch(request).await?;
        let payload: Payload<T> = response.json().await?;
        Ok(payload.into_inner())
    }
}

impl Backend for HttpBackend {
    async fn send_message(&self, request: SendMessageRequest) -> Result<MessageRecord> {
        let url = self.endpoint(&["messages", "send"])?;
        self.fetch(self.http_client.post(url).json(&request)).await
    }

    async fn conversations(&self) -> Result<Vec<ConversationRecord>> {
        let url = self.endpoint(&["messages", "conversations"])?;
        self.fetch(self.http_client.get(url)).await
    }

    async fn conversation_messages(&self, participant: String) -> Result<Vec<MessageRecord>> {
        let url = self.endpoint(&["messages", "conversation", &participant])?;
        self.fetch(self.http_client.get(url)).await
    }

    async fn unread_count(&self) -> Result<UnreadCount> {
        let url = self.endpoint(&["messages", "unread-count"])?;
        self.fetch(self.http_client.get(url)).await
    }

    async fn mark_conversation_read(&self, participant: String) -> Result<()> {
        let url = self.endpoint(&["messages", "conversation", &participant, "read"])?;
        self.dispatch(self.http_client.patch(url)).await?;
        Ok(())
    }

    async fn mark_message_read(&self, message_id: String) -> Result<()> {
        let url = self.endpoint(&["messages", &message_id, "read"])?;
        self.dispatch(self.http_client.patch(url)).await?;
        Ok(())
    }
}
