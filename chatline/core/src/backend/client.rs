//! Chat API Client
//!
//! HTTP access to the chat backend.
//!
//! # Endpoints
//!
//! - `POST /chat/stream` - start a generation, response is an event stream
//! - `GET /history/chats` - list conversations
//! - `GET /history/chats/{id}` - list a conversation's messages
//! - `POST /history/chats` - create an empty conversation
//! - `GET /health` - backend and dependency status
//!
//! Every request carries `Authorization: Bearer <token>` when the credential
//! provider has one.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::credentials::CredentialProvider;
use crate::config::ClientConfig;
use crate::messages::{Chat, ChatId, Message, RequestId};
use crate::transport::{EventReader, EventStream};

/// Timeout for establishing the TCP/TLS connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the health probe
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from the chat API client
#[derive(Debug, Error)]
pub enum ClientError {
    /// No backend URL configured; nothing was sent
    #[error("backend URL not configured")]
    MissingBackend,

    /// Sending requires a credential and none is available
    #[error("authentication required")]
    AuthRequired,

    /// Request could not be sent or the body could not be read
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (or reason phrase when the body was empty)
        body: String,
    },

    /// The request was cancelled before the stream opened
    #[error("request cancelled")]
    Cancelled,
}

/// Body of `POST /chat/stream`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Existing conversation, or `None` to let the server create one
    pub chat_id: Option<ChatId>,
    /// The user's message
    pub message: String,
    /// Model to generate with
    pub model: String,
    /// Attachment references (uploaded file URLs)
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Client request identifier
    pub request_id: RequestId,
    /// Whether to ground the answer with web search
    #[serde(default)]
    pub grounding: bool,
}

impl ChatRequest {
    /// Create a request with a fresh request ID
    pub fn new(message: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            chat_id: None,
            message: message.into(),
            model: model.into(),
            attachments: Vec::new(),
            request_id: RequestId::new(),
            grounding: false,
        }
    }

    /// Target an existing conversation
    #[must_use]
    pub fn with_chat(mut self, chat_id: Option<ChatId>) -> Self {
        self.chat_id = chat_id;
        self
    }

    /// Attach uploaded files
    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Enable search grounding
    #[must_use]
    pub fn with_grounding(mut self, grounding: bool) -> Self {
        self.grounding = grounding;
        self
    }
}

/// Response of `GET /health`
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct HealthReport {
    /// Overall status string (e.g. `"ok"`)
    #[serde(default)]
    pub status: String,
    /// Per-dependency availability
    #[serde(default)]
    pub checks: BTreeMap<String, bool>,
}

impl HealthReport {
    /// Whether a named dependency reported healthy
    #[must_use]
    pub fn check(&self, name: &str) -> bool {
        self.checks.get(name).copied().unwrap_or(false)
    }
}

#[derive(Deserialize)]
struct ChatsResponse {
    #[serde(default)]
    chats: Vec<Chat>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct CreateChatResponse {
    chat_id: ChatId,
}

/// Chat backend client
#[derive(Clone)]
pub struct ChatClient {
    config: ClientConfig,
    http_client: reqwest::Client,
}

impl ChatClient {
    /// Create a client for the configured backend
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Http` if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// The configuration this client was built with
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether a backend URL is configured
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.config.backend_url.is_some()
    }

    fn url(&self, path: &str) -> Result<String, ClientError> {
        let base = self
            .config
            .backend_url
            .as_deref()
            .ok_or(ClientError::MissingBackend)?;
        Ok(format!("{base}{path}"))
    }

    fn authorize(
        builder: reqwest::RequestBuilder,
        credentials: &dyn CredentialProvider,
    ) -> reqwest::RequestBuilder {
        match credentials.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let body = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            body
        };
        Err(ClientError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Start a generation and return its event stream
    ///
    /// Fails fast with `MissingBackend` before any I/O when no backend is
    /// configured. Cancelling `cancel` while the request is in flight returns
    /// `Cancelled`; cancelling later ends the event stream.
    ///
    /// # Errors
    ///
    /// `MissingBackend`, `Cancelled`, `Http` for connection failures and
    /// `Status` for non-success responses.
    pub async fn open_stream(
        &self,
        request: &ChatRequest,
        credentials: &dyn CredentialProvider,
        cancel: CancellationToken,
    ) -> Result<EventStream, ClientError> {
        let url = self.url("/chat/stream")?;

        tracing::debug!(
            request_id = %request.request_id,
            chat_id = ?request.chat_id,
            model = %request.model,
            "Opening chat stream"
        );

        let send = Self::authorize(self.http_client.post(&url), credentials)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send();

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ClientError::Cancelled),
            response = send => response?,
        };
        let response = Self::check_status(response).await?;

        Ok(EventReader::new(response.bytes_stream(), cancel).into_stream())
    }

    /// Probe `GET /health`; any failure yields `None`
    pub async fn health(&self) -> Option<HealthReport> {
        let url = self.url("/health").ok()?;
        let response = self
            .http_client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json().await.ok()
    }

    /// List the user's conversations
    ///
    /// # Errors
    ///
    /// Returns an error for missing configuration, transport failure, a
    /// non-success status or an undecodable body.
    pub async fn list_chats(
        &self,
        credentials: &dyn CredentialProvider,
    ) -> Result<Vec<Chat>, ClientError> {
        let url = self.url("/history/chats")?;
        let response = Self::authorize(self.http_client.get(&url), credentials)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        let body: ChatsResponse = Self::check_status(response).await?.json().await?;
        Ok(body.chats)
    }

    /// List the messages of one conversation
    ///
    /// # Errors
    ///
    /// Same as [`ChatClient::list_chats`].
    pub async fn list_messages(
        &self,
        chat_id: &ChatId,
        credentials: &dyn CredentialProvider,
    ) -> Result<Vec<Message>, ClientError> {
        let url = self.url(&format!("/history/chats/{chat_id}"))?;
        let response = Self::authorize(self.http_client.get(&url), credentials)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        let body: MessagesResponse = Self::check_status(response).await?.json().await?;
        Ok(body.messages)
    }

    /// Create an empty conversation
    ///
    /// # Errors
    ///
    /// Same as [`ChatClient::list_chats`].
    pub async fn create_chat(
        &self,
        title: &str,
        credentials: &dyn CredentialProvider,
    ) -> Result<ChatId, ClientError> {
        let url = self.url("/history/chats")?;
        let response = Self::authorize(self.http_client.post(&url), credentials)
            .timeout(self.config.request_timeout)
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await?;
        let body: CreateChatResponse = Self::check_status(response).await?.json().await?;
        Ok(body.chat_id)
    }
}
