//! Configuration module for Nargh
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section has defaults, so a missing file means "crawl with defaults".
//!
//! # Example
//!
//! ```no_run
//! use nargh::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("nargh.toml")).unwrap();
//! println!("Crawler will start {} workers", config.crawler.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, IndexConfig, OutputConfig, TargetConfig, TorConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
