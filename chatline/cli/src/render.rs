//! Incremental terminal output
//!
//! Prints only the text appended to the streaming assistant message since the
//! last revision, so the reply appears as it is flushed.

use std::io::{self, Write};

use chatline_core::{ConversationState, MessageId};

/// Writes the growing assistant reply to `out`
pub struct StreamPrinter<W: Write> {
    out: W,
    message_id: Option<MessageId>,
    printed: String,
}

impl<W: Write> StreamPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            message_id: None,
            printed: String::new(),
        }
    }

    /// Print whatever the current assistant message gained
    pub fn render(&mut self, state: &ConversationState) -> io::Result<()> {
        let Some(message) = state.current_assistant() else {
            return Ok(());
        };

        if self.message_id.as_ref() != Some(&message.id) {
            if !self.printed.is_empty() {
                writeln!(self.out)?;
            }
            self.message_id = Some(message.id.clone());
            self.printed.clear();
        }

        // The final history refresh may rewrite the message; keep what was shown
        let Some(delta) = message.content.strip_prefix(self.printed.as_str()) else {
            return Ok(());
        };
        if delta.is_empty() {
            return Ok(());
        }

        self.out.write_all(delta.as_bytes())?;
        self.out.flush()?;
        self.printed.push_str(delta);
        Ok(())
    }

    /// End the reply with a newline
    pub fn finish(&mut self) -> io::Result<()> {
        if !self.printed.is_empty() {
            writeln!(self.out)?;
            self.out.flush()?;
        }
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}
