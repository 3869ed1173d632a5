//! Conversation Data Model
//!
//! Identifiers, messages and chats as they exist both on the wire (history
//! endpoints) and in the client-side conversation state.
//!
//! # Ownership
//!
//! While a stream is active the reconciler is the only writer of an
//! assistant message's content. Once the stream reaches a terminal state the
//! history store becomes the source of truth again.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

/// Server-assigned conversation identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub String);

/// Message identifier (assigned by the server for persisted messages)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

/// Client-generated identifier for one streaming request
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new random request ID
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            /// Borrow the raw identifier
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(ChatId);
string_id!(MessageId);
string_id!(RequestId);

// ============================================================================
// Messages
// ============================================================================

/// Who authored a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The human user
    User,
    /// The model
    Assistant,
}

/// Lifecycle of a message's content
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Created, no content received yet
    Pending,
    /// Receiving tokens; content is append-only
    Streaming,
    /// Generation finished (also the status of anything loaded from history)
    #[default]
    Complete,
    /// Generation failed
    Errored,
    /// The caller stopped the stream; content may be truncated
    Stopped,
}

impl MessageStatus {
    /// Whether no further content will arrive
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Errored | Self::Stopped)
    }
}

/// A chat message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID
    pub id: MessageId,
    /// Author
    pub role: MessageRole,
    /// Text content
    #[serde(default)]
    pub content: String,
    /// Client-side status; persisted messages are always complete
    #[serde(default, skip_serializing)]
    pub status: MessageStatus,
    /// Creation time (Unix ms) when the server reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl Message {
    /// Create a complete message
    pub fn new(id: impl Into<MessageId>, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            status: MessageStatus::Complete,
            timestamp: Some(now_ms()),
        }
    }

    /// Create an empty assistant message that is about to receive tokens
    pub fn streaming_placeholder(id: impl Into<MessageId>) -> Self {
        Self {
            id: id.into(),
            role: MessageRole::Assistant,
            content: String::new(),
            status: MessageStatus::Streaming,
            timestamp: Some(now_ms()),
        }
    }

    /// Append streamed text
    pub fn append(&mut self, text: &str) {
        self.content.push_str(text);
    }
}

// ============================================================================
// Chats
// ============================================================================

/// A conversation as listed by the history store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Chat ID
    pub id: ChatId,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Creation time (Unix ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    /// Last update time (Unix ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
    /// Model used for the conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Current time in milliseconds since the Unix epoch
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
