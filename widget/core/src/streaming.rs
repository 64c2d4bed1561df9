//! Stream Simulator
//!
//! Reveals a complete answer one character per tick so it appears to be
//! typed out. The simulator only tracks the cursor; the session driver owns
//! the ticker and asks for a re-render after every step.
//!
//! For an answer of N characters the visible buffer passes through exactly
//! N+1 states: the empty buffer published at start, then one state per
//! character. The tick after the last character reports
//! [`StreamStep::Finished`], at which point the caller folds the full text
//! into the log.

use std::time::Duration;

/// Default delay between two revealed characters
pub const DEFAULT_STREAM_TICK: Duration = Duration::from_millis(6);

/// Result of one tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamStep<'a> {
    /// One more character was revealed; this is the new buffer
    Revealed(&'a str),
    /// Nothing left to reveal
    Finished,
}

/// Typewriter cursor over a full answer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamSimulator {
    text: String,
    // Byte offset, always on a char boundary
    cursor: usize,
}

impl StreamSimulator {
    /// Start revealing `full_text`; the buffer begins empty
    pub fn start(full_text: impl Into<String>) -> Self {
        Self {
            text: full_text.into(),
            cursor: 0,
        }
    }

    /// Currently visible prefix
    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.text[..self.cursor]
    }

    /// The complete answer
    #[must_use]
    pub fn full_text(&self) -> &str {
        &self.text
    }

    /// Whether every character has been revealed
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.text.len()
    }

    /// Number of characters in the answer
    #[must_use]
    pub fn total_chars(&self) -> usize {
        self.text.chars().count()
    }

    /// Reveal the next character
    pub fn advance(&mut self) -> StreamStep<'_> {
        match self.text[self.cursor..].chars().next() {
            Some(next) => {
                self.cursor += next.len_utf8();
                StreamStep::Revealed(&self.text[..self.cursor])
            }
            None => StreamStep::Finished,
        }
    }

    /// Consume the simulator, yielding the full answer
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }
}
