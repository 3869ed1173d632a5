//! Conversation State
//!
//! The UI-visible view of the chat: known conversations, the messages of the
//! active one, and the fields that describe an in-flight stream.
//!
//! State is shared between the session (readers, history loading) and the
//! single active reconciler (writer of streamed content). Every change that
//! is visible to a reader bumps a revision number, published on a
//! `tokio::sync::watch` channel so a UI can await updates instead of polling.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::messages::{Chat, ChatId, Message, MessageId, MessageStatus, RequestId};

/// Snapshot of everything a chat UI renders
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversationState {
    /// Conversations known to the history store
    pub chats: Vec<Chat>,
    /// Messages of the active conversation, oldest first
    pub messages: Vec<Message>,
    /// Conversation currently displayed
    pub active_chat_id: Option<ChatId>,
    /// Assistant message receiving tokens
    pub current_assistant_id: Option<MessageId>,
    /// Whether a stream is in progress
    pub streaming: bool,
    /// Request sent but not yet acknowledged by a `Meta` event
    pub in_flight_request: Option<RequestId>,
    /// Request whose stream currently writes to this state
    pub active_request: Option<RequestId>,
    /// Last failure to show the user
    pub last_error: Option<String>,
    revision: u64,
}

impl ConversationState {
    /// Monotonic change counter
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Find a message by ID
    #[must_use]
    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Find a message by ID, mutably
    pub fn message_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| &m.id == id)
    }

    /// The assistant message currently (or last) targeted by a stream
    #[must_use]
    pub fn current_assistant(&self) -> Option<&Message> {
        self.current_assistant_id
            .as_ref()
            .and_then(|id| self.message(id))
    }

    /// Set a message's status; returns whether anything changed
    pub fn set_status(&mut self, id: &MessageId, status: MessageStatus) -> bool {
        match self.message_mut(id) {
            Some(message) if message.status != status => {
                message.status = status;
                true
            }
            _ => false,
        }
    }

    /// Replace the message list with the server's, keeping `keep` if the
    /// server does not know it yet
    pub fn replace_messages(&mut self, server: Vec<Message>, keep: Option<&MessageId>) {
        let retained = keep.and_then(|id| {
            if server.iter().any(|m| &m.id == id) {
                None
            } else {
                self.message(id).cloned()
            }
        });
        self.messages = server;
        if let Some(message) = retained {
            self.messages.push(message);
        }
    }

    /// Take the server's message list but keep the local copy of `streaming`
    ///
    /// The server persists text while it generates, so its copy of the
    /// streaming message may already hold tokens that are still queued
    /// locally.
    pub fn merge_while_streaming(&mut self, server: Vec<Message>, streaming: &MessageId) {
        let local = self.message(streaming).cloned();
        self.messages = server;
        let Some(local) = local else {
            return;
        };
        match self.message_mut(streaming) {
            Some(slot) => *slot = local,
            None => self.messages.push(local),
        }
    }

    /// Mark `request_id` as the stream that owns this state
    pub fn begin_request(&mut self, request_id: RequestId) {
        self.streaming = true;
        self.in_flight_request = Some(request_id.clone());
        self.active_request = Some(request_id);
        self.last_error = None;
    }

    /// Release ownership if `request_id` still holds it; returns whether it did
    ///
    /// A superseded stream finishing late must not clear the flags of the
    /// request that replaced it.
    pub fn finish_request(&mut self, request_id: &RequestId) -> bool {
        if self.active_request.as_ref() != Some(request_id) {
            return false;
        }
        self.streaming = false;
        self.in_flight_request = None;
        self.active_request = None;
        true
    }

    /// Whether `request_id` owns this state
    #[must_use]
    pub fn owned_by(&self, request_id: &RequestId) -> bool {
        self.active_request.as_ref() == Some(request_id)
    }

    /// The user message that prompted the given assistant message
    #[must_use]
    pub fn prompt_for(&self, assistant_id: &MessageId) -> Option<&Message> {
        let idx = self.messages.iter().position(|m| &m.id == assistant_id)?;
        let prev = self.messages.get(idx.checked_sub(1)?)?;
        (prev.role == crate::messages::MessageRole::User).then_some(prev)
    }
}

/// Shared, observable conversation state
#[derive(Clone)]
pub struct SharedConversation {
    inner: Arc<Mutex<ConversationState>>,
    revisions: Arc<watch::Sender<u64>>,
}

impl Default for SharedConversation {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedConversation {
    /// Create empty state
    #[must_use]
    pub fn new() -> Self {
        let (revisions, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(ConversationState::default())),
            revisions: Arc::new(revisions),
        }
    }

    /// Clone the current state
    #[must_use]
    pub fn snapshot(&self) -> ConversationState {
        self.inner.lock().clone()
    }

    /// Read the state without cloning it
    pub fn read<R>(&self, f: impl FnOnce(&ConversationState) -> R) -> R {
        f(&*self.inner.lock())
    }

    /// Mutate the state; `f` returns whether it changed anything visible
    ///
    /// The revision is bumped (and subscribers woken) only on change, so
    /// no-op updates are invisible to observers.
    pub fn update(&self, f: impl FnOnce(&mut ConversationState) -> bool) -> bool {
        let revision = {
            let mut state = self.inner.lock();
            if !f(&mut state) {
                return false;
            }
            state.revision += 1;
            state.revision
        };
        self.revisions.send_replace(revision);
        true
    }

    /// Current revision
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.lock().revision
    }

    /// Subscribe to revision changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revisions.subscribe()
    }
}
