//! Paginated crawl of one subcategory
//!
//! Page 1 tells how many pages there are; pages 2 through the last one
//! follow in order. Every page runs under the retry executor with an
//! identity renewal between attempts. The records of a subcategory are
//! only released once its last page arrived: an abort throws away
//! everything fetched so far.

use crate::catalog::{PageResult, ProductRecord, SubCategory};
use crate::crawler::{Classification, RetryExecutor, RetryOutcome};
use crate::state::CrawlState;
use crate::transport::{AnonymizingTransport, FetchError, TransportError};
use std::collections::BTreeSet;
use thiserror::Error;

/// Why a subcategory was not completed
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The subcategory is abandoned; the worker moves on
    #[error("Subcategory {id} abandoned at page {page}: {reason}")]
    SubcategoryFatal { id: u64, page: u32, reason: String },

    /// The worker's transport is unusable; the worker must stop
    #[error("Transport failed during subcategory {id}: {source}")]
    TransportFatal {
        id: u64,
        #[source]
        source: TransportError,
    },
}

impl CrawlError {
    /// Stable name of the error kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubcategoryFatal { .. } => "subcategory-fatal",
            Self::TransportFatal { .. } => "transport-fatal",
        }
    }
}

/// Complete output of one subcategory
#[derive(Debug, Clone, Default)]
pub struct SubCategoryBatch {
    pub subcategory_id: u64,
    /// Every record, in page order
    pub records: Vec<ProductRecord>,
    /// Datasheet URLs referenced by the records
    pub datasheets: BTreeSet<String>,
    /// Pages fetched
    pub pages: u32,
}

/// Crawls subcategories through one worker's transport
pub struct SubCategoryCrawler<'a> {
    transport: &'a AnonymizingTransport,
    executor: RetryExecutor,
}

impl<'a> SubCategoryCrawler<'a> {
    /// Creates a crawler allowing `page_retry_ceiling` attempts per page
    pub fn new(transport: &'a AnonymizingTransport, page_retry_ceiling: u32) -> Self {
        Self {
            transport,
            executor: RetryExecutor::new(page_retry_ceiling),
        }
    }

    /// Fetches every page of `subcategory`
    ///
    /// # Returns
    ///
    /// * `Ok(SubCategoryBatch)` - All pages fetched
    /// * `Err(CrawlError::SubcategoryFatal)` - A page failed fatally or hit the retry ceiling
    /// * `Err(CrawlError::TransportFatal)` - Identity renewal failed
    pub async fn crawl(&self, subcategory: &SubCategory) -> Result<SubCategoryBatch, CrawlError> {
        let id = subcategory.id;
        let mut state = CrawlState::FetchingFirstPage;
        let mut last_page = 1;
        let mut batch = SubCategoryBatch {
            subcategory_id: id,
            ..SubCategoryBatch::default()
        };

        while let Some(page) = state.page() {
            let result = match self.fetch_page(id, page).await {
                Ok(result) => result,
                Err(err) => {
                    state = state.abort();
                    tracing::debug!(
                        worker = self.transport.worker_id(),
                        subcategory = id,
                        "Crawl {} after {} pages, discarding {} records",
                        state,
                        batch.pages,
                        batch.records.len()
                    );
                    return Err(err);
                }
            };

            if page == 1 {
                last_page = result.last_page;
                tracing::debug!(
                    worker = self.transport.worker_id(),
                    subcategory = id,
                    "{} reports {} pages",
                    subcategory.name,
                    last_page
                );
            }

            batch.pages += 1;
            batch.records.extend(result.items);
            state = state.advance(last_page);
        }

        batch.datasheets = batch
            .records
            .iter()
            .flat_map(ProductRecord::datasheet_urls)
            .map(str::to_string)
            .collect();

        Ok(batch)
    }

    /// Fetches one page, renewing identity between attempts
    async fn fetch_page(&self, id: u64, page: u32) -> Result<PageResult, CrawlError> {
        let transport = self.transport;
        tracing::debug!(worker = transport.worker_id(), subcategory = id, "Fetching page {}", page);

        let outcome = self
            .executor
            .execute(
                &format!("subcategory {} page {}", id, page),
                move || async move {
                    let result = transport.search(page, id).await?;
                    if !result.success {
                        return Err(FetchError::SoftBlock {
                            page,
                            message: result.message,
                            code: result.code,
                        });
                    }
                    Ok(result)
                },
                classify_page_error,
                move || async move { transport.renew().await.map_err(FetchError::from) },
            )
            .await;

        match outcome {
            RetryOutcome::Success(result) => Ok(result),
            RetryOutcome::Fatal(FetchError::Transport(source)) => {
                Err(CrawlError::TransportFatal { id, source })
            }
            RetryOutcome::Fatal(err) => Err(CrawlError::SubcategoryFatal {
                id,
                page,
                reason: format!("{} ({})", err, err.kind()),
            }),
            RetryOutcome::RetriesExhausted {
                attempts,
                last_error,
                ..
            } => Err(CrawlError::SubcategoryFatal {
                id,
                page,
                reason: format!(
                    "retry ceiling of {} attempts reached, last error: {}",
                    attempts, last_error
                ),
            }),
        }
    }
}

/// Decides which page failures are worth a new identity and another attempt
///
/// Network errors, truncated or non-JSON bodies, and soft blocks are
/// transient. Well-formed JSON of the wrong shape will not change with a new
/// identity, so it is fatal along with unexpected statuses and transport
/// failures.
pub fn classify_page_error(error: &FetchError) -> Classification {
    match error {
        FetchError::Network { source, .. } if source.is_builder() => Classification::Fatal,
        FetchError::Network { .. } | FetchError::MalformedJson { .. } | FetchError::SoftBlock { .. } => {
            Classification::Transient
        }
        FetchError::SchemaMismatch { .. } | FetchError::Status { .. } | FetchError::Transport(_) => {
            Classification::Fatal
        }
    }
}
