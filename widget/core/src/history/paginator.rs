//! History Paginator
//!
//! Offset/exhaustion bookkeeping for history loads. Holds no I/O: callers
//! ask for a [`PageRequest`], perform the fetch, and hand the resulting page
//! back to [`HistoryPaginator::complete`].

use crate::messages::Message;

use super::{HistoryPage, PageSource, DEFAULT_PAGE_SIZE};

/// Why a page is being loaded
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadKind {
    /// First page, loaded when the widget opens
    Initial,
    /// An older page, requested by scrolling to the top
    Older {
        /// Content height of the scroll container right before the fetch
        anchor_height: f64,
    },
}

/// A page fetch the caller should perform
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    /// Records to skip (newest-first)
    pub offset: usize,
    /// Maximum records to return
    pub limit: usize,
}

/// Result of merging a completed fetch
#[derive(Clone, Debug, PartialEq)]
pub struct PageOutcome {
    /// Which load this completes
    pub kind: LoadKind,
    /// Messages to prepend, oldest-first (empty when nothing arrived)
    pub messages: Vec<Message>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct PendingLoad {
    kind: LoadKind,
    request: PageRequest,
}

/// Tracks how far back history has been loaded
#[derive(Clone, Debug)]
pub struct HistoryPaginator {
    limit: usize,
    offset: usize,
    has_more: bool,
    initial_requested: bool,
    pending: Option<PendingLoad>,
}

impl Default for HistoryPaginator {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl HistoryPaginator {
    /// Create a paginator fetching `limit` records per page
    ///
    /// A zero limit is raised to 1.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            offset: 0,
            has_more: true,
            initial_requested: false,
            pending: None,
        }
    }

    /// Records per page
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Records received so far
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Whether older records may still exist
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Whether a fetch is in flight
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Start the first load
    ///
    /// Returns `None` if it was already requested or a load is in flight.
    pub fn begin_initial(&mut self) -> Option<PageRequest> {
        if self.initial_requested || self.pending.is_some() {
            return None;
        }
        self.initial_requested = true;
        Some(self.begin(LoadKind::Initial))
    }

    /// Start loading an older page
    ///
    /// Returns `None` (nothing changes) while a load is in flight or once
    /// history is exhausted.
    pub fn begin_older(&mut self, anchor_height: f64) -> Option<PageRequest> {
        if self.pending.is_some() || !self.has_more {
            return None;
        }
        self.initial_requested = true;
        Some(self.begin(LoadKind::Older { anchor_height }))
    }

    fn begin(&mut self, kind: LoadKind) -> PageRequest {
        let request = PageRequest {
            offset: self.offset,
            limit: self.limit,
        };
        self.pending = Some(PendingLoad { kind, request });
        request
    }

    /// Merge a completed fetch
    ///
    /// Returns `None` if `request` does not match the load in flight.
    pub fn complete(&mut self, request: PageRequest, page: HistoryPage) -> Option<PageOutcome> {
        let pending = match self.pending {
            Some(pending) if pending.request == request => pending,
            _ => return None,
        };
        self.pending = None;

        if page.source() == PageSource::FetchFailed {
            // Keep offset and has_more so the next scroll-to-top retries
            return Some(PageOutcome {
                kind: pending.kind,
                messages: Vec::new(),
            });
        }

        let received = page.len();
        if received < self.limit {
            self.has_more = false;
        }
        self.offset += received;

        Some(PageOutcome {
            kind: pending.kind,
            messages: page.into_messages(),
        })
    }

    /// Forget the load in flight (teardown)
    pub fn abandon(&mut self) {
        self.pending = None;
    }
}
