//! Subcategory crawl state definitions
//!
//! A subcategory moves strictly forward through its pages:
//! `FetchingFirstPage → FetchingPage(2) → … → FetchingPage(last) → Done`,
//! or drops to `Aborted` from any active state.

use std::fmt;

/// Represents where a subcategory crawl stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlState {
    // ===== Active States =====
    /// Fetching page 1, which also reveals the last page number
    FetchingFirstPage,

    /// Fetching the given page (2 or later)
    FetchingPage(u32),

    // ===== Terminal States =====
    /// Every page was fetched; the batch may be emitted
    Done,

    /// A fatal error ended the crawl; the batch is discarded
    Aborted,
}

impl CrawlState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }

    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Page number being fetched in this state, if any
    pub fn page(&self) -> Option<u32> {
        match self {
            Self::FetchingFirstPage => Some(1),
            Self::FetchingPage(page) => Some(*page),
            Self::Done | Self::Aborted => None,
        }
    }

    /// Moves to the state following a successfully fetched page
    ///
    /// `last_page` is the last page number reported by the first page.
    /// Terminal states stay where they are.
    pub fn advance(self, last_page: u32) -> Self {
        match self.page() {
            Some(page) if page < last_page => Self::FetchingPage(page + 1),
            Some(_) => Self::Done,
            None => self,
        }
    }

    /// Moves to `Aborted`, unless the crawl already finished
    pub fn abort(self) -> Self {
        if self.is_terminal() {
            self
        } else {
            Self::Aborted
        }
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchingFirstPage => write!(f, "fetching page 1"),
            Self::FetchingPage(page) => write!(f, "fetching page {}", page),
            Self::Done => write!(f, "done"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}
