//! Token Buffer
//!
//! Accumulates streamed text between flushes so visible state is updated at a
//! bounded rate instead of once per token.
//!
//! Fragments that arrive before the stream has named its assistant message
//! are held separately and attributed on [`TokenBuffer::assign`]. Order is
//! preserved throughout: the text applied for a message is always the
//! concatenation of its fragments in arrival order.

use crate::messages::MessageId;

/// Per-message buffer of unflushed text
#[derive(Debug, Default)]
pub struct TokenBuffer {
    /// Unflushed text per message, in first-arrival order
    entries: Vec<(MessageId, String)>,
    /// Text received before any message identity was known
    unassigned: String,
}

impl TokenBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer text for a known message
    pub fn push(&mut self, message_id: &MessageId, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.entries.iter_mut().find(|(id, _)| id == message_id) {
            Some((_, pending)) => pending.push_str(text),
            None => self.entries.push((message_id.clone(), text.to_string())),
        }
    }

    /// Hold text until a message identity is assigned
    pub fn hold(&mut self, text: &str) {
        self.unassigned.push_str(text);
    }

    /// Attribute held text to `message_id`, ahead of anything buffered for it
    pub fn assign(&mut self, message_id: &MessageId) {
        if self.unassigned.is_empty() {
            return;
        }
        let held = std::mem::take(&mut self.unassigned);
        match self.entries.iter_mut().find(|(id, _)| id == message_id) {
            Some((_, pending)) => pending.insert_str(0, &held),
            None => self.entries.push((message_id.clone(), held)),
        }
    }

    /// Remove and return everything ready to flush
    pub fn take(&mut self) -> Vec<(MessageId, String)> {
        std::mem::take(&mut self.entries)
    }

    /// Whether there is text ready to flush
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Length in bytes of text still waiting for an identity
    #[must_use]
    pub fn unassigned_len(&self) -> usize {
        self.unassigned.len()
    }

    /// Drop everything; returns the number of bytes discarded
    pub fn discard(&mut self) -> usize {
        let dropped = self.unassigned.len()
            + self
                .entries
                .iter()
                .map(|(_, text)| text.len())
                .sum::<usize>();
        self.entries.clear();
        self.unassigned.clear();
        dropped
    }
}
