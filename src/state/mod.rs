//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlState`: where a subcategory crawl stands in its page sequence

mod crawl_state;

pub use crawl_state::CrawlState;
