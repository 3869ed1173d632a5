//! Chat Stream Transport
//!
//! Everything between the HTTP response body and typed stream events:
//! - [`sse`]: incremental event-stream framing (bytes to records)
//! - [`reader`]: the pull-based event sequence with cancellation
//!
//! # Failure Handling
//!
//! Framing-level problems (bad JSON, records without data, unknown event
//! names) are absorbed here and never reach the reconciler. A network failure
//! surfaces exactly once, as an `Error` event with a generic message.

pub mod reader;
pub mod sse;

// Re-exports for convenience
pub use reader::{EventReader, EventStream, CONNECTION_LOST_MESSAGE};
pub use sse::{SseDecoder, SseRecord, DEFAULT_EVENT_NAME};
