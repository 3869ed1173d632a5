//! Stream Reconciliation
//!
//! Turns a stream of [`StreamEvent`](crate::events::StreamEvent)s into
//! conversation state changes.
//!
//! # Flow
//!
//! ```text
//! EventStream ──► StreamReconciler ──► TokenBuffer ──(flush tick)──► SharedConversation
//!                       │                                                  ▲
//!                       └──── Meta / Done ──► HistoryStore refresh ────────┘
//! ```
//!
//! Tokens are buffered and applied on a periodic flush (120 ms by default)
//! rather than one state update per token. `Done` forces a final flush and an
//! authoritative refresh from the history store. `Error` and cancellation
//! drop whatever was not yet flushed.

mod buffer;
mod stream_reconciler;

pub use buffer::TokenBuffer;
pub use stream_reconciler::{
    StreamOutcome, StreamReconciler, MIN_FLUSH_INTERVAL, UNEXPECTED_END_MESSAGE,
};
