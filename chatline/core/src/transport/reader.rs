//! Transport Reader
//!
//! Turns the raw byte stream of one HTTP response into a lazy, ordered
//! sequence of [`StreamEvent`]s.
//!
//! The sequence ends when:
//! - a terminal event (`Done` / `Error`) has been yielded,
//! - the byte source closes, or
//! - the cancellation token fires (nothing else is yielded after that point).
//!
//! A transport failure is reported once as a synthetic `Error` event and ends
//! the sequence. Cancellation is never reported as an error.

use std::fmt::Display;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::sse::{SseDecoder, SseRecord};
use crate::events::StreamEvent;

/// Message carried by the synthetic `Error` event on network failure
pub const CONNECTION_LOST_MESSAGE: &str = "connection to the server was lost";

/// Boxed event sequence handed from the transport to the reconciler
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Reads one response body and yields typed events
pub struct EventReader<S> {
    source: S,
    cancel: CancellationToken,
    decoder: SseDecoder,
}

impl<S, B, E> EventReader<S>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    /// Wrap a byte stream; `cancel` aborts the read loop
    pub fn new(source: S, cancel: CancellationToken) -> Self {
        Self {
            source,
            cancel,
            decoder: SseDecoder::new(),
        }
    }

    /// Consume the reader, producing the event sequence
    ///
    /// Nothing is read from the source until the returned stream is polled.
    #[must_use]
    pub fn into_stream(self) -> EventStream {
        let Self {
            source,
            cancel,
            mut decoder,
        } = self;

        Box::pin(async_stream::stream! {
            let mut source = Box::pin(source);

            loop {
                let chunk = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        tracing::debug!("Stream read cancelled");
                        return;
                    }
                    chunk = source.next() => chunk,
                };

                match chunk {
                    Some(Ok(bytes)) => {
                        decoder.push(bytes.as_ref());
                        while let Some(event) = decoder.next_event() {
                            if cancel.is_cancelled() {
                                return;
                            }
                            let terminal = event.is_terminal();
                            yield event;
                            if terminal {
                                return;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        if cancel.is_cancelled() {
                            return;
                        }
                        tracing::warn!(error = %e, "Chat stream transport failed");
                        yield StreamEvent::Error {
                            message: CONNECTION_LOST_MESSAGE.to_string(),
                        };
                        return;
                    }
                    None => {
                        if let Some(event) = decoder.finish().and_then(SseRecord::into_event) {
                            if !cancel.is_cancelled() {
                                yield event;
                            }
                        }
                        tracing::trace!("Chat stream source closed");
                        return;
                    }
                }
            }
        })
    }
}
