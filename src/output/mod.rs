//! Output module: where crawl results go
//!
//! This module handles:
//! - The [`ResultSink`] seam and its JSON file, search index and fan-out implementations
//! - The shared [`DatasheetCollector`]
//! - Batch import of earlier JSON output
//! - Crawl progress counters and the final statistics

mod datasheets;
mod fanout;
mod import;
mod index;
mod json_sink;
pub mod stats;
mod traits;

pub use datasheets::DatasheetCollector;
pub use fanout::FanoutSink;
pub use import::{import_folder, ImportReport};
pub use index::{IndexDocument, IndexSink};
pub use json_sink::JsonFileSink;
pub use stats::{print_statistics, CrawlProgress, CrawlStatistics};
pub use traits::{ResultSink, SinkError, SinkResult};
