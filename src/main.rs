//! Nargh main entry point
//!
//! This is the command-line interface for the Nargh catalog crawler.

use anyhow::{bail, Context};
use clap::Parser;
use nargh::config::{load_config_with_hash, Config, IndexConfig};
use nargh::crawler::{run_crawl, CrawlOptions};
use nargh::output::{import_folder, print_statistics, IndexSink};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Nargh: a concurrent crawler for the LCSC product catalog
///
/// Nargh fetches the category tree, spreads the subcategories over a pool
/// of workers each routed through its own Tor circuit, and writes one JSON
/// file per subcategory plus a list of every datasheet URL found.
#[derive(Parser, Debug)]
#[command(name = "nargh")]
#[command(version = "1.0.0")]
#[command(about = "A concurrent product catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Search index host to push records to, e.g. http://127.0.0.1:7700
    #[arg(long, value_name = "URL")]
    index_host: Option<String>,

    /// Import a folder of JSON files into the search index instead of crawling
    #[arg(long, value_name = "DIR", conflicts_with = "category")]
    import: Option<PathBuf>,

    /// Crawl a single subcategory, skipping the category tree
    #[arg(long, value_name = "ID")]
    category: Option<u64>,

    /// Number of workers (overrides the config file)
    #[arg(short, long, value_name = "N")]
    workers: Option<u32>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = load(&cli)?;

    match &cli.import {
        Some(dir) => handle_import(config, dir).await,
        None => handle_crawl(config, cli.category).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("nargh=info,warn"),
            1 => EnvFilter::new("nargh=debug,info"),
            2 => EnvFilter::new("nargh=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the config file, if any, and applies command-line overrides
fn load(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            Config::default()
        }
    };

    if let Some(host) = &cli.index_host {
        match config.index.as_mut() {
            Some(index) => index.host = host.clone(),
            None => config.index = Some(IndexConfig::with_host(host.clone())),
        }
    }
    if let Some(workers) = cli.workers {
        config.crawler.workers = workers;
    }

    Ok(config)
}

/// Handles --import: pushes earlier JSON output to the search index
async fn handle_import(config: Config, dir: &Path) -> anyhow::Result<()> {
    let Some(index) = config.index else {
        bail!("--import needs a search index: pass --index-host or add an [index] section");
    };

    let sink = IndexSink::connect(index).await?;
    let report = import_folder(dir, &sink).await?;

    println!(
        "Imported {} records from {} files ({} empty)",
        report.records, report.files, report.skipped
    );
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, category: Option<u64>) -> anyhow::Result<()> {
    tracing::info!(
        "Crawling {} with {} workers ({})",
        config.target.base_url,
        config.crawler.workers,
        if config.tor.enabled { "via Tor" } else { "direct" }
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, finishing subcategories in progress");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    match run_crawl(config, CrawlOptions { category }, stop).await {
        Ok(report) => {
            print_statistics(&report.statistics);
            println!("\nDatasheet list: {}", report.datasheet_path.display());
            if report.stopped {
                tracing::warn!("Crawl stopped before every subcategory was claimed");
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!(kind = e.kind(), "Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
