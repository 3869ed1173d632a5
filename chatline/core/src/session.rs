//! Chat Session
//!
//! The entry point a UI drives: send a message, stop it, retry it, switch
//! conversations, and observe the resulting state.
//!
//! # Design Philosophy
//!
//! A session owns the shared [`ConversationState`] and at most one
//! [`PendingRequest`]. Starting a send cancels whatever was in flight, so two
//! streams never write to the visible conversation at once. Everything that
//! can fail before I/O (no backend configured, sign-in required) is reported
//! synchronously from [`ChatSession::send`]; everything after that surfaces as
//! the [`StreamOutcome`] of the returned [`StreamHandle`].

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{
    ChatClient, ChatRequest, ClientError, CredentialProvider, HealthReport, HistoryError,
    HistoryStore, HttpHistoryStore,
};
use crate::config::ClientConfig;
use crate::messages::{Chat, ChatId, Message, MessageId, MessageRole, RequestId};
use crate::reconciler::{StreamOutcome, StreamReconciler};
use crate::state::{ConversationState, SharedConversation};

/// Errors returned synchronously by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// The request could not be started
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Loading history failed
    #[error(transparent)]
    History(#[from] HistoryError),

    /// No user message precedes the given message
    #[error("nothing to retry for message {0}")]
    NothingToRetry(MessageId),
}

/// What to send
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// The user's message
    pub message: String,
    /// Model override; the configured default when `None`
    pub model: Option<String>,
    /// Uploaded attachment references
    pub attachments: Vec<String>,
    /// Ground the answer with web search
    pub grounding: bool,
}

impl SendOptions {
    /// Send `message` with default settings
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Use a specific model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
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

/// The single request a session has in flight
#[derive(Clone, Debug)]
pub struct PendingRequest {
    /// Client request ID
    pub request_id: RequestId,
    /// Conversation the request was sent to (`None` for a new chat)
    pub target_chat_id: Option<ChatId>,
    /// Assistant message receiving tokens, once the server has named it
    pub assistant_message_id: Option<MessageId>,
    /// Cancels the request and its stream
    pub cancel: CancellationToken,
}

/// Handle to a running stream
#[derive(Debug)]
pub struct StreamHandle {
    request_id: RequestId,
    cancel: CancellationToken,
    task: JoinHandle<StreamOutcome>,
}

impl StreamHandle {
    /// The request this handle tracks
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Stop the stream; the outcome becomes `Cancelled`
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the stream to finish
    pub async fn outcome(self) -> StreamOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(request_id = %self.request_id, error = %e, "Stream task failed");
                StreamOutcome::Failed {
                    message: format!("stream task failed: {e}"),
                }
            }
        }
    }
}

/// A chat session against one backend
pub struct ChatSession {
    client: ChatClient,
    history: Arc<dyn HistoryStore>,
    credentials: Arc<dyn CredentialProvider>,
    state: SharedConversation,
    pending: Arc<Mutex<Option<PendingRequest>>>,
}

impl ChatSession {
    /// Create a session from its collaborators
    pub fn new(
        client: ChatClient,
        history: Arc<dyn HistoryStore>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            client,
            history,
            credentials,
            state: SharedConversation::new(),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a session that reads history over HTTP from the same backend
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Http` if the HTTP client cannot be built.
    pub fn from_config(
        config: ClientConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ClientError> {
        let client = ChatClient::new(config)?;
        let history = Arc::new(HttpHistoryStore::new(client.clone(), credentials.clone()));
        Ok(Self::new(client, history, credentials))
    }

    /// The session's configuration
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        self.client.config()
    }

    /// Send a message to the active conversation (or a new one)
    ///
    /// Any request already in flight is cancelled first.
    ///
    /// # Errors
    ///
    /// `ClientError::MissingBackend` when no backend is configured and
    /// `ClientError::AuthRequired` when sign-in is required but no credential
    /// is available. Nothing is sent and the state is untouched in both cases.
    pub fn send(&self, options: SendOptions) -> Result<StreamHandle, SessionError> {
        let config = self.client.config();
        if !self.client.is_configured() {
            return Err(ClientError::MissingBackend.into());
        }
        if config.require_auth && !self.credentials.is_available() {
            return Err(ClientError::AuthRequired.into());
        }

        self.stop();

        let chat_id = self.state.read(|s| s.active_chat_id.clone());
        let model = options
            .model
            .unwrap_or_else(|| config.default_model.clone());
        let request = ChatRequest::new(options.message.clone(), model)
            .with_chat(chat_id.clone())
            .with_attachments(options.attachments)
            .with_grounding(options.grounding);
        let request_id = request.request_id.clone();
        let cancel = CancellationToken::new();

        tracing::info!(
            request_id = %request_id,
            chat_id = ?chat_id,
            model = %request.model,
            "Sending message"
        );

        self.state.update(|s| {
            s.begin_request(request_id.clone());
            s.current_assistant_id = None;
            s.messages.push(Message::new(
                format!("local-{request_id}"),
                MessageRole::User,
                options.message,
            ));
            true
        });

        *self.pending.lock() = Some(PendingRequest {
            request_id: request_id.clone(),
            target_chat_id: chat_id,
            assistant_message_id: None,
            cancel: cancel.clone(),
        });

        let task = tokio::spawn(drive_request(
            self.client.clone(),
            self.history.clone(),
            self.credentials.clone(),
            self.state.clone(),
            self.pending.clone(),
            request,
            cancel.clone(),
        ));

        Ok(StreamHandle {
            request_id,
            cancel,
            task,
        })
    }

    /// Cancel the request in flight; returns whether there was one
    pub fn stop(&self) -> bool {
        match self.pending.lock().take() {
            Some(pending) => {
                tracing::info!(request_id = %pending.request_id, "Stopping request");
                pending.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Resend the user message that prompted `message_id`
    ///
    /// # Errors
    ///
    /// `SessionError::NothingToRetry` when no user message immediately
    /// precedes `message_id`, otherwise the errors of [`ChatSession::send`].
    pub fn retry(&self, message_id: &MessageId) -> Result<StreamHandle, SessionError> {
        let prompt = self
            .state
            .read(|s| s.prompt_for(message_id).map(|m| m.content.clone()))
            .ok_or_else(|| SessionError::NothingToRetry(message_id.clone()))?;

        tracing::debug!(message_id = %message_id, "Retrying message");
        self.send(SendOptions::new(prompt))
    }

    /// Switch to a conversation and load its messages
    ///
    /// A stream in flight is stopped first.
    ///
    /// # Errors
    ///
    /// Returns the history store's error; the state is left unchanged.
    pub async fn select_chat(&self, chat_id: ChatId) -> Result<(), SessionError> {
        self.stop();
        let messages = self.history.list_messages(&chat_id).await?;

        tracing::debug!(chat_id = %chat_id, count = messages.len(), "Selected chat");
        self.state.update(|s| {
            s.active_chat_id = Some(chat_id);
            s.messages = messages;
            s.current_assistant_id = None;
            s.last_error = None;
            true
        });
        Ok(())
    }

    /// Start a fresh conversation; the server assigns its ID on first send
    pub fn new_chat(&self) {
        self.stop();
        self.state.update(|s| {
            let changed = s.active_chat_id.is_some() || !s.messages.is_empty();
            s.active_chat_id = None;
            s.messages.clear();
            s.current_assistant_id = None;
            changed
        });
    }

    /// Reload the conversation list
    ///
    /// # Errors
    ///
    /// Returns the history store's error; the state is left unchanged.
    pub async fn refresh_chats(&self) -> Result<Vec<Chat>, SessionError> {
        let chats = self.history.list_chats().await?;
        let listed = chats.clone();
        self.state.update(|s| {
            if s.chats == chats {
                return false;
            }
            s.chats = chats;
            true
        });
        Ok(listed)
    }

    /// Probe the backend's health endpoint
    pub async fn health(&self) -> Option<HealthReport> {
        self.client.health().await
    }

    /// The request in flight, if any
    #[must_use]
    pub fn pending_request(&self) -> Option<PendingRequest> {
        let mut pending = self.pending.lock().clone()?;
        pending.assistant_message_id = self.state.read(|s| {
            s.owned_by(&pending.request_id)
                .then(|| s.current_assistant_id.clone())
                .flatten()
        });
        Some(pending)
    }

    /// Snapshot of the conversation state
    #[must_use]
    pub fn state(&self) -> ConversationState {
        self.state.snapshot()
    }

    /// Shared handle to the conversation state
    #[must_use]
    pub fn shared_state(&self) -> SharedConversation {
        self.state.clone()
    }

    /// Subscribe to state revisions
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.state.subscribe()
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Open the stream and reconcile it; runs on its own task
async fn drive_request(
    client: ChatClient,
    history: Arc<dyn HistoryStore>,
    credentials: Arc<dyn CredentialProvider>,
    state: SharedConversation,
    pending: Arc<Mutex<Option<PendingRequest>>>,
    request: ChatRequest,
    cancel: CancellationToken,
) -> StreamOutcome {
    let request_id = request.request_id.clone();
    let flush_interval = client.config().flush_interval;

    let outcome = match client
        .open_stream(&request, credentials.as_ref(), cancel.clone())
        .await
    {
        Ok(events) => {
            StreamReconciler::new(state.clone(), history, request_id.clone(), flush_interval)
                .run(events, cancel)
                .await
        }
        Err(ClientError::Cancelled) => {
            tracing::info!(request_id = %request_id, "Request cancelled before the stream opened");
            state.update(|s| s.finish_request(&request_id));
            StreamOutcome::Cancelled
        }
        Err(e) => {
            let message = e.to_string();
            tracing::warn!(request_id = %request_id, error = %message, "Failed to open stream");
            state.update(|s| {
                if s.owned_by(&request_id) {
                    s.last_error = Some(message.clone());
                }
                s.finish_request(&request_id)
            });
            StreamOutcome::Failed { message }
        }
    };

    let mut pending = pending.lock();
    if pending
        .as_ref()
        .is_some_and(|p| p.request_id == request_id)
    {
        *pending = None;
    }

    outcome
}
