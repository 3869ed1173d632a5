//! Event-Stream Framing
//!
//! Incremental decoder for the `text/event-stream` framing used by the chat
//! endpoint.
//!
//! # Record Format
//!
//! ```text
//! event: token
//! data: {"text":"Hi"}
//!
//! ```
//!
//! Records are separated by a blank line. Read boundaries never need to
//! line up with record boundaries (or with UTF-8 character boundaries): the
//! decoder keeps whatever trails the last separator for the next push.
//!
//! Malformed records are not errors at this layer. A record without data, with
//! a payload that is not JSON, or with an unknown event name is dropped.

use crate::events::StreamEvent;

/// Event name used when a record carries no `event:` field
pub const DEFAULT_EVENT_NAME: &str = "message";

/// Record separator (after CR normalisation)
const RECORD_SEPARATOR: &str = "\n\n";

/// Initial text buffer capacity
const MIN_BUFFER_CAPACITY: usize = 4096;

/// One parsed SSE record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseRecord {
    /// Value of the `event:` field
    pub event: String,
    /// Concatenated `data:` lines
    pub data: String,
}

impl SseRecord {
    /// Parse the fields of a single record (without its trailing blank line)
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut event = None;
        let mut data_lines: Vec<&str> = Vec::new();

        for line in raw.lines().map(str::trim) {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(value) = line.strip_prefix("event:") {
                event = Some(value.trim());
            } else if let Some(value) = line.strip_prefix("data:") {
                data_lines.push(value.trim());
            }
        }

        Self {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or(DEFAULT_EVENT_NAME)
                .to_string(),
            data: data_lines.join("\n"),
        }
    }

    /// Convert to a typed event, dropping anything malformed
    #[must_use]
    pub fn into_event(self) -> Option<StreamEvent> {
        if self.data.is_empty() {
            tracing::trace!(event = %self.event, "Dropping record without data");
            return None;
        }

        match StreamEvent::from_parts(&self.event, &self.data) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::debug!(event = %self.event, error = %e, "Dropping malformed record");
                None
            }
        }
    }
}

/// Streaming decoder: bytes in, complete records out
#[derive(Debug)]
pub struct SseDecoder {
    /// Decoded text not yet split into records
    text: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    partial_utf8: Vec<u8>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self {
            text: String::with_capacity(MIN_BUFFER_CAPACITY),
            partial_utf8: Vec::new(),
        }
    }

    /// Append bytes read from the response body
    pub fn push(&mut self, data: &[u8]) {
        self.partial_utf8.extend_from_slice(data);

        let bytes = std::mem::take(&mut self.partial_utf8);
        let mut rest = bytes.as_slice();

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    self.push_text(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // valid_up_to guarantees this prefix is UTF-8
                    self.push_text(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes
                            self.partial_utf8 = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Take the next complete record, if one is buffered
    pub fn next_record(&mut self) -> Option<SseRecord> {
        loop {
            let pos = self.text.find(RECORD_SEPARATOR)?;
            let raw: String = self.text.drain(..pos + RECORD_SEPARATOR.len()).collect();
            let raw = &raw[..pos];
            if raw.trim().is_empty() {
                continue;
            }
            return Some(SseRecord::parse(raw));
        }
    }

    /// Take the next complete record that converts to a typed event
    pub fn next_event(&mut self) -> Option<StreamEvent> {
        while let Some(record) = self.next_record() {
            if let Some(event) = record.into_event() {
                return Some(event);
            }
        }
        None
    }

    /// Flush whatever remains once the source has closed
    ///
    /// A final record that was never followed by a blank line is still parsed.
    pub fn finish(&mut self) -> Option<SseRecord> {
        if !self.partial_utf8.is_empty() {
            let tail = std::mem::take(&mut self.partial_utf8);
            self.push_text(&String::from_utf8_lossy(&tail));
        }

        let raw = std::mem::take(&mut self.text);
        if raw.trim().is_empty() {
            None
        } else {
            Some(SseRecord::parse(&raw))
        }
    }

    /// Number of buffered characters not yet returned as records
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.text.len() + self.partial_utf8.len()
    }

    /// Discard all buffered input
    pub fn clear(&mut self) {
        self.text.clear();
        self.partial_utf8.clear();
    }

    fn push_text(&mut self, text: &str) {
        // CRLF line endings are folded to LF so the separator search only
        // needs to look for "\n\n".
        self.text.extend(text.chars().filter(|c| *c != '\r'));
    }
}
