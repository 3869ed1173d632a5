//! Stream Reconciler Implementation
//!
//! Applies one stream's events to the shared conversation state.
//!
//! A reconciler runs on a single task: cancellation, the flush ticker and
//! the next event are awaited in one `select!`, so a flush can never
//! interleave with a token append and no lock is held across an await.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::buffer::TokenBuffer;
use crate::backend::{HistoryError, HistoryStore};
use crate::events::StreamEvent;
use crate::messages::{Chat, ChatId, Message, MessageId, MessageStatus, RequestId};
use crate::state::SharedConversation;
use crate::transport::EventStream;

/// Message recorded when the source ends without `Done` or `Error`
pub const UNEXPECTED_END_MESSAGE: &str = "stream ended unexpectedly";

/// Shortest flush interval; tokio intervals reject a zero period
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

/// How a stream ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The server finished generating
    Completed {
        /// Conversation the stream wrote to, if the server named one
        chat_id: Option<ChatId>,
        /// Assistant message that received the text
        message_id: Option<MessageId>,
    },
    /// The stream failed; `message` is what the user should see
    Failed {
        /// Error message (server text verbatim when it sent one)
        message: String,
    },
    /// The caller stopped the stream
    Cancelled,
}

impl StreamOutcome {
    /// Whether the generation completed normally
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

enum Step {
    Continue,
    Finished(StreamOutcome),
}

/// Applies a stream of events to conversation state
pub struct StreamReconciler {
    state: SharedConversation,
    history: Arc<dyn HistoryStore>,
    request_id: RequestId,
    flush_interval: Duration,
    buffer: TokenBuffer,
    ticker: Option<Interval>,
    chat_id: Option<ChatId>,
    target: Option<MessageId>,
}

impl StreamReconciler {
    /// Create a reconciler for one request
    ///
    /// `flush_interval` is raised to [`MIN_FLUSH_INTERVAL`] if shorter.
    pub fn new(
        state: SharedConversation,
        history: Arc<dyn HistoryStore>,
        request_id: RequestId,
        flush_interval: Duration,
    ) -> Self {
        Self {
            state,
            history,
            request_id,
            flush_interval: flush_interval.max(MIN_FLUSH_INTERVAL),
            buffer: TokenBuffer::new(),
            ticker: None,
            chat_id: None,
            target: None,
        }
    }

    /// Consume `events` until a terminal event, the end of the source or
    /// cancellation
    pub async fn run(mut self, mut events: EventStream, cancel: CancellationToken) -> StreamOutcome {
        tracing::debug!(request_id = %self.request_id, "Reconciler started");

        loop {
            let step = tokio::select! {
                biased;
                () = cancel.cancelled() => Step::Finished(self.on_cancel()),
                () = next_tick(&mut self.ticker) => {
                    self.flush();
                    Step::Continue
                }
                event = events.next() => match event {
                    Some(event) => self.apply(event, &cancel).await,
                    // The reader ends quietly when cancelled mid-poll
                    None if cancel.is_cancelled() => Step::Finished(self.on_cancel()),
                    None => {
                        tracing::warn!(
                            request_id = %self.request_id,
                            "Stream ended without a terminal event"
                        );
                        Step::Finished(self.on_error(UNEXPECTED_END_MESSAGE.to_string()))
                    }
                },
            };

            if let Step::Finished(outcome) = step {
                tracing::debug!(
                    request_id = %self.request_id,
                    outcome = ?outcome,
                    "Reconciler finished"
                );
                return outcome;
            }
        }
    }

    async fn apply(&mut self, event: StreamEvent, cancel: &CancellationToken) -> Step {
        match event {
            StreamEvent::Meta {
                chat_id,
                message_id,
            } => self.on_meta(chat_id, message_id, cancel).await,
            StreamEvent::Token { text } => {
                self.on_token(&text);
                Step::Continue
            }
            StreamEvent::Done => Step::Finished(self.on_done(cancel).await),
            StreamEvent::Error { message } => Step::Finished(self.on_error(message)),
        }
    }

    async fn on_meta(
        &mut self,
        chat_id: ChatId,
        message_id: MessageId,
        cancel: &CancellationToken,
    ) -> Step {
        if let Some(target) = &self.target {
            tracing::warn!(
                request_id = %self.request_id,
                target = %target,
                ignored = %message_id,
                "Ignoring repeated meta event"
            );
            return Step::Continue;
        }

        tracing::debug!(
            request_id = %self.request_id,
            chat_id = %chat_id,
            message_id = %message_id,
            "Stream identity assigned"
        );

        self.chat_id = Some(chat_id.clone());
        self.target = Some(message_id.clone());
        self.buffer.assign(&message_id);

        let request_id = self.request_id.clone();
        self.state.update(|s| {
            match &s.active_chat_id {
                None => s.active_chat_id = Some(chat_id.clone()),
                Some(active) if active != &chat_id => {
                    tracing::warn!(
                        request_id = %request_id,
                        active = %active,
                        streamed = %chat_id,
                        "Server streamed into a different chat, keeping the active one"
                    );
                }
                Some(_) => {}
            }
            s.current_assistant_id = Some(message_id.clone());
            if s.in_flight_request.as_ref() == Some(&request_id) {
                s.in_flight_request = None;
            }
            ensure_streaming(&mut s.messages, &message_id);
            true
        });

        let refreshed = tokio::select! {
            biased;
            () = cancel.cancelled() => return Step::Finished(self.on_cancel()),
            refreshed = refresh(self.history.as_ref(), &chat_id) => refreshed,
        };

        let (chats, messages) = refreshed;
        if chats.is_some() || messages.is_some() {
            self.state.update(|s| {
                if let Some(chats) = chats {
                    s.chats = chats;
                }
                if let Some(messages) = messages {
                    if s.active_chat_id.as_ref() == Some(&chat_id) {
                        s.merge_while_streaming(messages, &message_id);
                        ensure_streaming(&mut s.messages, &message_id);
                    }
                }
                true
            });
        }

        if self.buffer.has_pending() {
            self.start_ticker();
        }
        Step::Continue
    }

    fn on_token(&mut self, text: &str) {
        match &self.target {
            Some(target) => {
                self.buffer.push(target, text);
                if self.buffer.has_pending() {
                    self.start_ticker();
                }
            }
            None => {
                tracing::trace!(
                    request_id = %self.request_id,
                    len = text.len(),
                    "Holding token until meta"
                );
                self.buffer.hold(text);
            }
        }
    }

    async fn on_done(&mut self, cancel: &CancellationToken) -> StreamOutcome {
        self.flush();
        self.ticker = None;

        let held = self.buffer.discard();
        if held > 0 {
            tracing::warn!(
                request_id = %self.request_id,
                bytes = held,
                "Discarding text that never received a message identity"
            );
        }

        let request_id = self.request_id.clone();
        let target = self.target.clone();
        self.state.update(|s| {
            let marked = target
                .as_ref()
                .is_some_and(|id| s.set_status(id, MessageStatus::Complete));
            s.finish_request(&request_id) || marked
        });

        if let (Some(chat_id), Some(target)) = (&self.chat_id, &self.target) {
            let fetched = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                fetched = self.history.list_messages(chat_id) => Some(fetched),
            };
            match fetched {
                Some(Ok(messages)) => {
                    self.state.update(|s| {
                        if s.active_chat_id.as_ref() != Some(chat_id) {
                            return false;
                        }
                        s.replace_messages(messages, Some(target));
                        s.set_status(target, MessageStatus::Complete);
                        true
                    });
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        request_id = %self.request_id,
                        chat_id = %chat_id,
                        error = %e,
                        "Final history refresh failed, keeping streamed content"
                    );
                }
                None => {
                    tracing::debug!(request_id = %self.request_id, "Final refresh skipped");
                }
            }
        }

        StreamOutcome::Completed {
            chat_id: self.chat_id.clone(),
            message_id: self.target.clone(),
        }
    }

    fn on_error(&mut self, message: String) -> StreamOutcome {
        self.ticker = None;
        let dropped = self.buffer.discard();

        tracing::warn!(
            request_id = %self.request_id,
            message = %message,
            discarded_bytes = dropped,
            "Stream failed"
        );

        let request_id = self.request_id.clone();
        let target = self.target.clone();
        let recorded = message.clone();
        self.state.update(|s| {
            if let Some(id) = &target {
                s.set_status(id, MessageStatus::Errored);
            }
            if s.owned_by(&request_id) {
                s.last_error = Some(recorded);
            }
            s.finish_request(&request_id);
            true
        });

        StreamOutcome::Failed { message }
    }

    fn on_cancel(&mut self) -> StreamOutcome {
        self.ticker = None;
        let dropped = self.buffer.discard();

        tracing::info!(
            request_id = %self.request_id,
            discarded_bytes = dropped,
            "Stream cancelled"
        );

        let request_id = self.request_id.clone();
        let target = self.target.clone();
        self.state.update(|s| {
            let marked = target
                .as_ref()
                .is_some_and(|id| s.set_status(id, MessageStatus::Stopped));
            s.finish_request(&request_id) || marked
        });

        StreamOutcome::Cancelled
    }

    /// Apply buffered text and stop the ticker
    fn flush(&mut self) {
        self.ticker = None;
        let pending = self.buffer.take();
        if pending.is_empty() {
            return;
        }

        let applied = self.state.update(|s| {
            let mut changed = false;
            for (id, text) in &pending {
                match s.message_mut(id) {
                    Some(message) => {
                        message.append(text);
                        changed = true;
                    }
                    None => {
                        tracing::debug!(message_id = %id, "Flush target not in view");
                    }
                }
            }
            changed
        });

        tracing::trace!(request_id = %self.request_id, applied, "Flushed tokens");
    }

    fn start_ticker(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        let mut ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Make sure `id` is present and marked streaming
fn ensure_streaming(messages: &mut Vec<Message>, id: &MessageId) {
    match messages.iter_mut().find(|m| &m.id == id) {
        Some(message) => message.status = MessageStatus::Streaming,
        None => messages.push(Message::streaming_placeholder(id.clone())),
    }
}

/// Load chats and messages; failures are logged and reported as `None`
async fn refresh(
    history: &dyn HistoryStore,
    chat_id: &ChatId,
) -> (Option<Vec<Chat>>, Option<Vec<Message>>) {
    let chats = log_failure(history.list_chats().await, "list chats");
    let messages = log_failure(history.list_messages(chat_id).await, "list messages");
    (chats, messages)
}

fn log_failure<T>(result: Result<T, HistoryError>, what: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "History refresh failed to {what}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryHistoryStore;
    use crate::messages::MessageRole;
    use futures::channel::mpsc;
    use pretty_assertions::assert_eq;
    use std::task::Poll;

    const FLUSH: Duration = Duration::from_millis(120);

    fn meta(chat: &str, message: &str) -> StreamEvent {
        StreamEvent::Meta {
            chat_id: ChatId::from(chat),
            message_id: MessageId::from(message),
        }
    }

    fn token(text: &str) -> StreamEvent {
        StreamEvent::Token {
            text: text.to_string(),
        }
    }

    fn setup() -> (SharedConversation, Arc<MemoryHistoryStore>, RequestId) {
        let state = SharedConversation::new();
        let request_id = RequestId::from("r1");
        state.update(|s| {
            s.begin_request(request_id.clone());
            true
        });
        (state, Arc::new(MemoryHistoryStore::new()), request_id)
    }

    fn spawn(
        state: &SharedConversation,
        history: &Arc<MemoryHistoryStore>,
        request_id: &RequestId,
        cancel: &CancellationToken,
    ) -> (
        mpsc::UnboundedSender<StreamEvent>,
        tokio::task::JoinHandle<StreamOutcome>,
    ) {
        let (tx, rx) = mpsc::unbounded();
        let reconciler = StreamReconciler::new(
            state.clone(),
            history.clone(),
            request_id.clone(),
            FLUSH,
        );
        let handle = tokio::spawn(reconciler.run(Box::pin(rx), cancel.clone()));
        (tx, handle)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn content(state: &SharedConversation, id: &str) -> Option<(String, MessageStatus)> {
        state.read(|s| {
            s.message(&MessageId::from(id))
                .map(|m| (m.content.clone(), m.status))
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_completes_with_server_content() {
        let (state, history, request_id) = setup();
        history.push_messages(
            "c1",
            vec![
                Message::new("u1", MessageRole::User, "Hi"),
                Message::new("m1", MessageRole::Assistant, ""),
            ],
        );
        history.push_messages(
            "c1",
            vec![
                Message::new("u1", MessageRole::User, "Hi"),
                Message::new("m1", MessageRole::Assistant, "AB"),
            ],
        );

        let events: EventStream = Box::pin(futures::stream::iter(vec![
            meta("c1", "m1"),
            token("A"),
            token("B"),
            StreamEvent::Done,
        ]));
        let outcome = StreamReconciler::new(state.clone(), history.clone(), request_id, FLUSH)
            .run(events, CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            StreamOutcome::Completed {
                chat_id: Some(ChatId::from("c1")),
                message_id: Some(MessageId::from("m1")),
            }
        );
        assert_eq!(
            content(&state, "m1"),
            Some(("AB".to_string(), MessageStatus::Complete))
        );
        assert_eq!(history.list_chats_calls(), 1);
        assert_eq!(history.list_messages_calls(), 2);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.active_chat_id, Some(ChatId::from("c1")));
        assert!(!snapshot.streaming);
        assert_eq!(snapshot.in_flight_request, None);
        assert_eq!(snapshot.messages.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_flush_on_interval() {
        let (state, history, request_id) = setup();
        let cancel = CancellationToken::new();
        let (tx, handle) = spawn(&state, &history, &request_id, &cancel);

        tx.unbounded_send(meta("c1", "m1")).unwrap();
        tx.unbounded_send(token("Hel")).unwrap();
        tx.unbounded_send(token("lo")).unwrap();
        settle().await;

        // Buffered, not yet visible
        assert_eq!(
            content(&state, "m1"),
            Some((String::new(), MessageStatus::Streaming))
        );

        tokio::time::advance(FLUSH).await;
        settle().await;
        assert_eq!(
            content(&state, "m1"),
            Some(("Hello".to_string(), MessageStatus::Streaming))
        );

        tx.unbounded_send(StreamEvent::Done).unwrap();
        assert!(handle.await.unwrap().is_completed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_marks_errored_with_message() {
        let (state, history, request_id) = setup();
        let events: EventStream = Box::pin(futures::stream::iter(vec![
            meta("c1", "m1"),
            token("partial"),
            StreamEvent::Error {
                message: "quota exceeded".to_string(),
            },
        ]));

        let outcome = StreamReconciler::new(state.clone(), history, request_id, FLUSH)
            .run(events, CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            StreamOutcome::Failed {
                message: "quota exceeded".to_string()
            }
        );
        // Unflushed text is discarded on error
        assert_eq!(
            content(&state, "m1"),
            Some((String::new(), MessageStatus::Errored))
        );
        let snapshot = state.snapshot();
        assert_eq!(snapshot.last_error.as_deref(), Some("quota exceeded"));
        assert!(!snapshot.streaming);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_keeps_flushed_content() {
        let (state, history, request_id) = setup();
        let cancel = CancellationToken::new();
        let (tx, handle) = spawn(&state, &history, &request_id, &cancel);

        tx.unbounded_send(meta("c1", "m1")).unwrap();
        tx.unbounded_send(token("kept")).unwrap();
        settle().await;
        tokio::time::advance(FLUSH).await;
        settle().await;

        tx.unbounded_send(token(" dropped")).unwrap();
        settle().await;
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), StreamOutcome::Cancelled);
        assert_eq!(
            content(&state, "m1"),
            Some(("kept".to_string(), MessageStatus::Stopped))
        );
        let snapshot = state.snapshot();
        assert!(!snapshot.streaming);
        assert_eq!(snapshot.last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_ticks_do_not_bump_revision() {
        let (state, history, request_id) = setup();
        let cancel = CancellationToken::new();
        let (tx, handle) = spawn(&state, &history, &request_id, &cancel);

        tx.unbounded_send(meta("c1", "m1")).unwrap();
        tx.unbounded_send(token("x")).unwrap();
        settle().await;
        tokio::time::advance(FLUSH).await;
        settle().await;

        let revision = state.revision();
        for _ in 0..5 {
            tokio::time::advance(FLUSH).await;
            settle().await;
        }
        assert_eq!(state.revision(), revision);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_before_meta_are_attributed() {
        let (state, history, request_id) = setup();
        let events: EventStream = Box::pin(futures::stream::iter(vec![
            token("early "),
            meta("c1", "m1"),
            token("late"),
            StreamEvent::Done,
        ]));

        StreamReconciler::new(state.clone(), history, request_id, FLUSH)
            .run(events, CancellationToken::new())
            .await;

        // The memory store has no snapshot, so the streamed copy is kept
        assert_eq!(
            content(&state, "m1"),
            Some(("early late".to_string(), MessageStatus::Complete))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_without_meta_are_discarded() {
        let (state, history, request_id) = setup();
        let events: EventStream = Box::pin(futures::stream::iter(vec![
            token("orphan"),
            StreamEvent::Done,
        ]));

        let outcome = StreamReconciler::new(state.clone(), history.clone(), request_id, FLUSH)
            .run(events, CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            StreamOutcome::Completed {
                chat_id: None,
                message_id: None,
            }
        );
        assert!(state.snapshot().messages.is_empty());
        assert_eq!(history.list_messages_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_without_terminal_event_fails() {
        let (state, history, request_id) = setup();
        let events: EventStream = Box::pin(futures::stream::iter(vec![meta("c1", "m1")]));

        let outcome = StreamReconciler::new(state.clone(), history, request_id, FLUSH)
            .run(events, CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            StreamOutcome::Failed {
                message: UNEXPECTED_END_MESSAGE.to_string()
            }
        );
        assert_eq!(
            content(&state, "m1"),
            Some((String::new(), MessageStatus::Errored))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_failure_keeps_local_state() {
        let (state, history, request_id) = setup();
        history.set_failure(Some("offline".to_string()));
        let events: EventStream = Box::pin(futures::stream::iter(vec![
            meta("c1", "m1"),
            token("still here"),
            StreamEvent::Done,
        ]));

        let outcome = StreamReconciler::new(state.clone(), history, request_id, FLUSH)
            .run(events, CancellationToken::new())
            .await;

        assert!(outcome.is_completed());
        assert_eq!(
            content(&state, "m1"),
            Some(("still here".to_string(), MessageStatus::Complete))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_meta_is_ignored() {
        let (state, history, request_id) = setup();
        let events: EventStream = Box::pin(futures::stream::iter(vec![
            meta("c1", "m1"),
            token("a"),
            meta("c2", "m2"),
            token("b"),
            StreamEvent::Done,
        ]));

        StreamReconciler::new(state.clone(), history.clone(), request_id, FLUSH)
            .run(events, CancellationToken::new())
            .await;

        assert_eq!(content(&state, "m1").map(|(c, _)| c), Some("ab".to_string()));
        assert!(content(&state, "m2").is_none());
        assert_eq!(history.list_chats_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_ending_after_cancel_is_not_an_error() {
        let (state, history, request_id) = setup();
        let cancel = CancellationToken::new();
        let reader_cancel = cancel.clone();
        let mut queued = vec![meta("c1", "m1"), token("lost")].into_iter();
        // Mirrors the reader: cancelled while being polled, it just ends
        let events: EventStream = Box::pin(futures::stream::poll_fn(move |_| {
            match queued.next() {
                Some(event) => Poll::Ready(Some(event)),
                None => {
                    reader_cancel.cancel();
                    Poll::Ready(None)
                }
            }
        }));

        let outcome = StreamReconciler::new(state.clone(), history, request_id, FLUSH)
            .run(events, cancel)
            .await;

        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert_eq!(
            content(&state, "m1"),
            Some((String::new(), MessageStatus::Stopped))
        );
        let snapshot = state.snapshot();
        assert_eq!(snapshot.last_error, None);
        assert!(!snapshot.streaming);
    }

    #[tokio::test(start_paused = true)]
    async fn test_meta_refresh_does_not_duplicate_persisted_text() {
        let (state, history, request_id) = setup();
        // The server already persisted the first token when meta is handled
        history.push_messages(
            "c1",
            vec![
                Message::new("u1", MessageRole::User, "Hi"),
                Message::new("m1", MessageRole::Assistant, "A"),
            ],
        );
        let cancel = CancellationToken::new();
        let (tx, handle) = spawn(&state, &history, &request_id, &cancel);

        tx.unbounded_send(meta("c1", "m1")).unwrap();
        tx.unbounded_send(token("A")).unwrap();
        settle().await;
        tokio::time::advance(FLUSH).await;
        settle().await;
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), StreamOutcome::Cancelled);
        assert_eq!(
            content(&state, "m1"),
            Some(("A".to_string(), MessageStatus::Stopped))
        );
        assert_eq!(
            content(&state, "u1"),
            Some(("Hi".to_string(), MessageStatus::Complete))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_flush_interval_still_streams() {
        let (state, history, request_id) = setup();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded();
        let reconciler =
            StreamReconciler::new(state.clone(), history, request_id, Duration::ZERO);
        let handle = tokio::spawn(reconciler.run(Box::pin(rx), cancel));

        tx.unbounded_send(meta("c1", "m1")).unwrap();
        tx.unbounded_send(token("fast")).unwrap();
        settle().await;
        tokio::time::advance(MIN_FLUSH_INTERVAL).await;
        settle().await;
        assert_eq!(
            content(&state, "m1"),
            Some(("fast".to_string(), MessageStatus::Streaming))
        );

        tx.unbounded_send(StreamEvent::Done).unwrap();
        assert!(handle.await.unwrap().is_completed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_chat_is_not_replaced_by_meta() {
        let (state, history, request_id) = setup();
        state.update(|s| {
            s.active_chat_id = Some(ChatId::from("c0"));
            true
        });
        history.push_messages("c1", vec![Message::new("u9", MessageRole::User, "elsewhere")]);
        let events: EventStream = Box::pin(futures::stream::iter(vec![
            meta("c1", "m1"),
            token("reply"),
            StreamEvent::Done,
        ]));

        let outcome = StreamReconciler::new(state.clone(), history, request_id, FLUSH)
            .run(events, CancellationToken::new())
            .await;

        assert!(outcome.is_completed());
        let snapshot = state.snapshot();
        assert_eq!(snapshot.active_chat_id, Some(ChatId::from("c0")));
        assert!(snapshot.message(&MessageId::from("u9")).is_none());
        assert_eq!(
            content(&state, "m1"),
            Some(("reply".to_string(), MessageStatus::Complete))
        );
    }
}
