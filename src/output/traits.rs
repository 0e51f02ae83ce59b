//! Result sink trait and its error type
//!
//! A sink receives the complete record batch of one subcategory. It is
//! shared by every worker, so implementations must be thread-safe.

use crate::catalog::ProductRecord;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while delivering a batch
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize records: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Index request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Index rejected documents (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
}

impl SinkError {
    /// Stable name of the error kind, used in logs
    pub fn kind(&self) -> &'static str {
        "sink-failure"
    }
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Receiver of completed subcategory batches
///
/// `accept` is only ever called with the full record set of a subcategory
/// whose every page was fetched. A failed delivery is reported to the
/// caller; it never undoes work done elsewhere.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Delivers the records of one subcategory
    ///
    /// # Arguments
    ///
    /// * `subcategory_id` - Subcategory the records were crawled from
    /// * `records` - Every record of that subcategory, in page order
    async fn accept(&self, subcategory_id: u64, records: &[ProductRecord]) -> SinkResult<()>;
}
