//! Nargh: a concurrent crawler for a paginated product catalog
//!
//! This crate fetches the category tree of the catalog once, then fans the
//! subcategories out over a pool of workers. Each worker owns one isolated
//! network session routed through its own anonymized circuit, paginates the
//! search API, and hands finished batches to a result sink while collecting
//! datasheet URLs into a shared deduplicating set.

pub mod catalog;
pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod transport;

use thiserror::Error;

pub use output::SinkError;
pub use transport::TransportError;

/// Main error type for Nargh operations
#[derive(Debug, Error)]
pub enum NarghError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Category data changed shape: {reason}")]
    SchemaDrift { reason: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Category page could not be fetched: {0}")]
    CategoryFetch(String),

    #[error("All workers failed, {unprocessed} subcategories left unprocessed")]
    WorkersExhausted { unprocessed: usize },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NarghError {
    /// Stable name of the error kind, used in operator-facing logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::SchemaDrift { .. } => "schema-drift",
            Self::Transport(_) | Self::WorkersExhausted { .. } => "transport-fatal",
            Self::Sink(_) => "sink-failure",
            Self::CategoryFetch(_) | Self::Reqwest(_) => "transient-network",
            Self::Json(_) | Self::Io(_) => "io",
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Nargh operations
pub type Result<T> = std::result::Result<T, NarghError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use catalog::{Category, ProductRecord, SubCategory};
pub use config::Config;
pub use crawler::{run_crawl, CrawlOptions, CrawlReport};
pub use output::{DatasheetCollector, ResultSink};
pub use state::CrawlState;
