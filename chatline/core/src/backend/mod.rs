//! Chat Backend Integration
//!
//! Collaborators at the edge of the streaming core:
//!
//! - **Chat client**: the HTTP API (`/chat/stream`, `/history`, `/health`)
//! - **History store**: durable conversations, behind a trait so the
//!   reconciler can be driven by the HTTP store or an in-memory one
//! - **Credentials**: an opaque bearer token with an availability flag
//!
//! # Usage
//!
//! ```ignore
//! use chatline_core::backend::{ChatClient, ChatRequest, StaticCredential};
//!
//! let client = ChatClient::new(config)?;
//! let events = client
//!     .open_stream(&ChatRequest::new("Hello!", "gemini-2.0-flash"), &StaticCredential::new(token), cancel)
//!     .await?;
//! ```

mod client;
mod credentials;
mod history;

pub use client::{ChatClient, ChatRequest, ClientError, HealthReport};
pub use credentials::{CredentialProvider, NoCredential, StaticCredential};
pub use history::{HistoryError, HistoryStore, HttpHistoryStore, MemoryHistoryStore};
