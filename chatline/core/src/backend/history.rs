//! History Store
//!
//! The history store is the durable record of conversations. The reconciler
//! consults it after `Meta` (to pick up what the server already persisted)
//! and after `Done` (so displayed content matches what was saved).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use super::client::{ChatClient, ClientError};
use super::credentials::CredentialProvider;
use crate::messages::{Chat, ChatId, Message};

/// Errors from a history store
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The HTTP request failed
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The store could not serve the request
    #[error("history unavailable: {0}")]
    Unavailable(String),
}

/// Read access to persisted conversations
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// List all conversations
    async fn list_chats(&self) -> Result<Vec<Chat>, HistoryError>;

    /// List the messages of a conversation, oldest first
    async fn list_messages(&self, chat_id: &ChatId) -> Result<Vec<Message>, HistoryError>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// History store backed by the chat API's `/history` endpoints
#[derive(Clone)]
pub struct HttpHistoryStore {
    client: ChatClient,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpHistoryStore {
    /// Create a store sharing the chat client
    pub fn new(client: ChatClient, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            client,
            credentials,
        }
    }
}

#[async_trait]
impl HistoryStore for HttpHistoryStore {
    async fn list_chats(&self) -> Result<Vec<Chat>, HistoryError> {
        Ok(self.client.list_chats(self.credentials.as_ref()).await?)
    }

    async fn list_messages(&self, chat_id: &ChatId) -> Result<Vec<Message>, HistoryError> {
        Ok(self
            .client
            .list_messages(chat_id, self.credentials.as_ref())
            .await?)
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// In-memory history store for offline use and tests
///
/// Each chat holds a queue of message-list snapshots: every `list_messages`
/// call returns the next snapshot and the last one repeats. This models a
/// server whose persisted record changes while a stream is running.
#[derive(Default)]
pub struct MemoryHistoryStore {
    chats: Mutex<Vec<Chat>>,
    snapshots: Mutex<HashMap<ChatId, VecDeque<Vec<Message>>>>,
    failure: Mutex<Option<String>>,
    list_chats_calls: AtomicUsize,
    list_messages_calls: AtomicUsize,
}

impl MemoryHistoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the chat list
    pub fn set_chats(&self, chats: Vec<Chat>) {
        *self.chats.lock() = chats;
    }

    /// Queue a message-list snapshot for a chat
    pub fn push_messages(&self, chat_id: impl Into<ChatId>, messages: Vec<Message>) {
        self.snapshots
            .lock()
            .entry(chat_id.into())
            .or_default()
            .push_back(messages);
    }

    /// Make every call fail with `message` (or succeed again with `None`)
    pub fn set_failure(&self, message: Option<String>) {
        *self.failure.lock() = message;
    }

    /// Number of `list_chats` calls served
    #[must_use]
    pub fn list_chats_calls(&self) -> usize {
        self.list_chats_calls.load(Ordering::SeqCst)
    }

    /// Number of `list_messages` calls served
    #[must_use]
    pub fn list_messages_calls(&self) -> usize {
        self.list_messages_calls.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<(), HistoryError> {
        match self.failure.lock().as_ref() {
            Some(message) => Err(HistoryError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn list_chats(&self) -> Result<Vec<Chat>, HistoryError> {
        self.list_chats_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self.chats.lock().clone())
    }

    async fn list_messages(&self, chat_id: &ChatId) -> Result<Vec<Message>, HistoryError> {
        self.list_messages_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let mut snapshots = self.snapshots.lock();
        let Some(queue) = snapshots.get_mut(chat_id) else {
            return Ok(Vec::new());
        };
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap_or_default())
        } else {
            Ok(queue.front().cloned().unwrap_or_default())
        }
    }
}
