//! Conversation History
//!
//! Lazily loads earlier question/answer pairs from the history endpoint and
//! merges them in front of the live log.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   PageRequest    ┌──────────────────────┐
//! │ HistoryPaginator │ ───────────────► │   HistoryProvider    │
//! │ offset / hasMore │                  │ (HTTP, or scripted)  │
//! │ in-flight guard  │ ◄─────────────── │ newest-first → oldest│
//! └──────────────────┘   HistoryPage    └──────────────────────┘
//! ```
//!
//! The paginator is pure state; the provider does the I/O. The session
//! driver connects the two so a fetch never blocks the event loop.

mod paginator;
mod provider;

pub use paginator::{HistoryPaginator, LoadKind, PageOutcome, PageRequest};
pub use provider::{
    HistoryFetchError, HistoryProvider, HttpHistoryProvider, DEFAULT_HISTORY_TIMEOUT,
};

use serde::{Deserialize, Serialize};

use crate::messages::Message;

/// Default number of records requested per page
pub const DEFAULT_PAGE_SIZE: usize = 8;

/// One past exchange as returned by the history endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// What the user asked
    pub question: String,
    /// What the bot answered
    pub answer: String,
}

impl HistoryRecord {
    /// Create a record
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Where a page came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageSource {
    /// Returned by the backend
    Backend,
    /// Substituted for a failed fetch
    FetchFailed,
}

/// One window of history, ordered oldest-first
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryPage {
    records: Vec<HistoryRecord>,
    source: PageSource,
}

impl HistoryPage {
    /// Build a page from records in backend order (newest-first)
    #[must_use]
    pub fn from_newest_first(mut records: Vec<HistoryRecord>) -> Self {
        records.reverse();
        Self {
            records,
            source: PageSource::Backend,
        }
    }

    /// Build a page from records already ordered oldest-first
    #[must_use]
    pub fn from_oldest_first(records: Vec<HistoryRecord>) -> Self {
        Self {
            records,
            source: PageSource::Backend,
        }
    }

    /// Empty stand-in for a fetch that failed
    #[must_use]
    pub fn fetch_failed() -> Self {
        Self {
            records: Vec::new(),
            source: PageSource::FetchFailed,
        }
    }

    /// Records, oldest-first
    #[must_use]
    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    /// Number of records received
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records were received
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Where the page came from
    #[must_use]
    pub fn source(&self) -> PageSource {
        self.source
    }

    /// Map to messages: user question then bot answer, per record
    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        self.records
            .into_iter()
            .flat_map(|record| [Message::user(record.question), Message::bot(record.answer)])
            .collect()
    }
}
