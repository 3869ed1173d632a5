//! Stream Events
//!
//! Typed events carried by the chat event stream. Each SSE record names one
//! of these events in its `event:` field and carries the JSON payload in its
//! `data:` field.
//!
//! # Ordering
//!
//! A well-formed stream carries at most one `Meta` (before any `Token`), any
//! number of `Token`s, and exactly one terminal `Done` or `Error`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::{ChatId, MessageId};

/// Message used when the server reports an error without a description
pub const DEFAULT_SERVER_ERROR: &str = "Generation error from server";

/// An event from the chat stream
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum StreamEvent {
    /// The server assigned (or confirmed) the chat and assistant message
    Meta {
        /// Conversation the request landed in
        chat_id: ChatId,
        /// Assistant message that will receive the tokens
        message_id: MessageId,
    },
    /// Incremental text for the assistant message
    Token {
        /// The fragment
        text: String,
    },
    /// Generation completed
    Done,
    /// Generation failed
    Error {
        /// Server-supplied (or synthesized) description
        message: String,
    },
}

impl StreamEvent {
    /// Whether this event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }

    /// Wire name of the event
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Meta { .. } => "meta",
            Self::Token { .. } => "token",
            Self::Done => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Build an event from an SSE event name and its JSON data
    ///
    /// # Errors
    ///
    /// Returns an error when the name is unknown, the data is not JSON, or the
    /// JSON does not have the shape the event requires.
    pub fn from_parts(name: &str, data: &str) -> Result<Self, EventParseError> {
        match name {
            "meta" => {
                let payload: MetaPayload = serde_json::from_str(data)?;
                Ok(Self::Meta {
                    chat_id: payload.chat_id,
                    message_id: payload.message_id,
                })
            }
            "token" => {
                let payload: TokenPayload = serde_json::from_str(data)?;
                Ok(Self::Token { text: payload.text })
            }
            "done" => {
                let _: serde_json::Value = serde_json::from_str(data)?;
                Ok(Self::Done)
            }
            "error" => {
                let payload: ErrorPayload = serde_json::from_str(data)?;
                Ok(Self::Error {
                    message: payload
                        .message
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| DEFAULT_SERVER_ERROR.to_string()),
                })
            }
            other => Err(EventParseError::UnknownEvent(other.to_string())),
        }
    }
}

/// Why a record could not be turned into a [`StreamEvent`]
#[derive(Debug, Error)]
pub enum EventParseError {
    /// The `event:` name is not part of the protocol
    #[error("unknown event type: {0}")]
    UnknownEvent(String),

    /// The `data:` field is not valid JSON for this event
    #[error("invalid event payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct MetaPayload {
    chat_id: ChatId,
    message_id: MessageId,
}

#[derive(Deserialize)]
struct TokenPayload {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: Option<String>,
}
