//! Crawler module: the concurrent crawl engine
//!
//! This module contains the core crawling logic, including:
//! - Bounded retry with caller-supplied classification and recovery
//! - Paginated crawl of a single subcategory
//! - The worker pool spreading subcategories over isolated sessions
//! - Overall crawl coordination

mod coordinator;
mod pool;
mod retry;
mod subcategory;

pub use coordinator::{build_sink, run_crawl, Coordinator, CrawlOptions, CrawlReport};
pub use pool::{JobQueue, PoolContext, PoolReport, WorkerExit, WorkerPool};
pub use retry::{Classification, RetryExecutor, RetryOutcome};
pub use subcategory::{classify_page_error, CrawlError, SubCategoryBatch, SubCategoryCrawler};
