//! Chatline Core - Streaming Chat Transport
//!
//! This crate turns a chat backend's server-sent event stream into an
//! incrementally updated conversation, independent of any UI framework. It
//! can drive a terminal client, a desktop app, or run headless for tests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          UI / CLI                                │
//! │        ChatSession::send / stop / retry / select_chat            │
//! │        watch::Receiver<u64> revisions ──► state() snapshot       │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                        CHATLINE CORE                             │
//! │                               │                                  │
//! │  ┌────────────┐   bytes   ┌───┴────────┐  events  ┌────────────┐ │
//! │  │ ChatClient │ ────────► │ EventReader│ ───────► │ Reconciler │ │
//! │  │  (reqwest) │           │ (SSE+UTF-8)│          │ TokenBuffer│ │
//! │  └─────┬──────┘           └────────────┘          └─────┬──────┘ │
//! │        │                                                │        │
//! │  ┌─────┴──────┐                                  ┌──────┴──────┐ │
//! │  │HistoryStore│ ◄──────── refresh on Meta/Done ──│ Conversation│ │
//! │  └────────────┘                                  │    State    │ │
//! │                                                  └─────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ChatSession`]: owns the conversation state and the request in flight
//! - [`StreamEvent`]: `Meta`, `Token`, `Done`, `Error`
//! - [`EventReader`]: bytes to a lazy, cancellable event stream
//! - [`StreamReconciler`]: applies events to [`SharedConversation`]
//! - [`HistoryStore`]: durable record of chats and messages
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use chatline_core::{load_config, ChatSession, SendOptions, StaticCredential};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let session = ChatSession::from_config(config, Arc::new(StaticCredential::new("token")))?;
//!
//!     let mut revisions = session.subscribe();
//!     let handle = session.send(SendOptions::new("Plan a weekend in Lisbon"))?;
//!
//!     tokio::spawn(async move {
//!         while revisions.changed().await.is_ok() {
//!             // Render session.state()
//!         }
//!     });
//!
//!     println!("{:?}", handle.outcome().await);
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: chat API client, history store, credentials
//! - [`config`]: configuration file, environment and CLI overrides
//! - [`events`]: stream event types
//! - [`messages`]: identifiers, messages and chats
//! - [`reconciler`]: token buffering and event application
//! - [`session`]: the chat session API
//! - [`state`]: observable conversation state
//! - [`transport`]: event-stream framing and the event reader
//!
//! # No UI Dependencies
//!
//! Logging goes through `tracing`; installing a subscriber is left to the
//! binary embedding this crate.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod events;
pub mod messages;
pub mod reconciler;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use backend::{
    ChatClient, ChatRequest, ClientError, CredentialProvider, HealthReport, HistoryError,
    HistoryStore, HttpHistoryStore, MemoryHistoryStore, NoCredential, StaticCredential,
};
pub use events::{EventParseError, StreamEvent};
pub use messages::{Chat, ChatId, Message, MessageId, MessageRole, MessageStatus, RequestId};
pub use reconciler::{StreamOutcome, StreamReconciler, TokenBuffer};
pub use session::{ChatSession, PendingRequest, SendOptions, SessionError, StreamHandle};
pub use state::{ConversationState, SharedConversation};
pub use transport::{EventReader, EventStream, SseDecoder};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env,
    ChatlineToml, ClientConfig, ConfigError, ConfigOverrides, ConfigSource,
};
