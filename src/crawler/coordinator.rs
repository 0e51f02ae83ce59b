//! Crawler coordinator - whole-run orchestration
//!
//! A run goes through these steps:
//! - fetch the category tree once (or take a single subcategory from the caller)
//! - flatten it into jobs and start one worker per isolated session
//! - wait for every worker to exit
//! - write the datasheet list and report statistics

use crate::catalog::{flatten, Category, CategoryFetcher};
use crate::config::{validate, Config};
use crate::crawler::{PoolContext, WorkerPool};
use crate::output::{
    CrawlProgress, CrawlStatistics, DatasheetCollector, FanoutSink, IndexSink, JsonFileSink,
    ResultSink,
};
use crate::transport::{
    AnonymizingTransport, DirectIdentity, IdentityProvider, TorControl, TransportSettings,
};
use crate::NarghError;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Per-run choices that do not belong in the config file
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Crawl only this subcategory and skip the category tree fetch
    pub category: Option<u64>,
}

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub statistics: CrawlStatistics,

    /// The run was cut short by the stop flag
    pub stopped: bool,

    /// Where the datasheet list was written
    pub datasheet_path: PathBuf,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    settings: Arc<TransportSettings>,
    provider: Arc<dyn IdentityProvider>,
}

impl Coordinator {
    /// Creates a coordinator using the identity provider the config asks for
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Config is valid
    /// * `Err(NarghError)` - Config is invalid or names an unusable target
    pub fn new(config: Config) -> Result<Self, NarghError> {
        let provider: Arc<dyn IdentityProvider> = if config.tor.enabled {
            Arc::new(TorControl::new(
                config.tor.control_addr.clone(),
                config.tor.control_password.clone(),
            ))
        } else {
            Arc::new(DirectIdentity)
        };

        Self::with_provider(config, provider)
    }

    /// Creates a coordinator with an explicit identity provider
    pub fn with_provider(
        config: Config,
        provider: Arc<dyn IdentityProvider>,
    ) -> Result<Self, NarghError> {
        validate(&config)?;
        let settings = TransportSettings::from_config(&config)?;

        Ok(Self {
            config: Arc::new(config),
            settings: Arc::new(settings),
            provider,
        })
    }

    /// Fetches the category tree through a dedicated session
    pub async fn fetch_categories(&self) -> Result<Vec<Category>, NarghError> {
        // One past the last worker id, so the fetch gets a circuit of its own
        let transport = self.transport(self.config.crawler.workers as usize)?;
        let fetcher = CategoryFetcher::new(
            &transport,
            self.config.crawler.max_attempts,
            self.config.target.category_marker.as_str(),
            Duration::from_millis(self.config.crawler.retry_delay_ms),
        );

        fetcher.fetch().await
    }

    /// Picks the categories a run covers: the caller's single subcategory, or
    /// the whole tree fetched from the target
    pub async fn resolve_categories(
        &self,
        options: &CrawlOptions,
    ) -> Result<Vec<Category>, NarghError> {
        match options.category {
            Some(id) => {
                tracing::info!("Crawling single subcategory {}", id);
                Ok(vec![Category::single(id)])
            }
            None => self.fetch_categories().await.map_err(|err| {
                tracing::error!(kind = err.kind(), "Category fetch failed: {}", err);
                err
            }),
        }
    }

    /// Runs a complete crawl
    ///
    /// Nothing is written when the category tree cannot be read. Otherwise
    /// the datasheet list is written once every worker has exited, even if
    /// some of them failed.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - All jobs were claimed, or the run was stopped
    /// * `Err(NarghError::WorkersExhausted)` - Every worker failed with jobs left
    pub async fn crawl(
        &self,
        options: &CrawlOptions,
        sink: Arc<dyn ResultSink>,
        stop: Arc<AtomicBool>,
    ) -> Result<CrawlReport, NarghError> {
        let categories = self.resolve_categories(options).await?;
        self.crawl_categories(&categories, sink, stop).await
    }

    /// Crawls every subcategory of an already resolved category list
    pub async fn crawl_categories(
        &self,
        categories: &[Category],
        sink: Arc<dyn ResultSink>,
        stop: Arc<AtomicBool>,
    ) -> Result<CrawlReport, NarghError> {
        let jobs = flatten(categories);
        let pool = WorkerPool::new(
            (0..self.config.crawler.workers as usize)
                .map(|worker_id| self.transport(worker_id))
                .collect::<Result<Vec<_>, _>>()?,
            self.config.crawler.page_retry_ceiling,
        );

        let collector = Arc::new(DatasheetCollector::new());
        let progress = Arc::new(CrawlProgress::new(jobs.len()));
        let context = PoolContext {
            collector: Arc::clone(&collector),
            sink,
            progress: Arc::clone(&progress),
        };

        let report = pool.run(jobs, context, stop).await;

        let datasheet_path = PathBuf::from(&self.config.output.datasheet_path);
        collector.write_to(&datasheet_path).await?;

        let mut statistics = progress.snapshot();
        statistics.datasheets = collector.len() as u64;
        statistics.worker_failures = report.failed_workers() as u64;

        if report.unprocessed > 0 && !report.stopped {
            tracing::error!(
                kind = "transport-fatal",
                "Every worker failed, {} subcategories left",
                report.unprocessed
            );
            return Err(NarghError::WorkersExhausted {
                unprocessed: report.unprocessed,
            });
        }

        tracing::info!(
            "Crawl finished: {} completed, {} aborted, {} records in {:.1?}",
            statistics.completed,
            statistics.aborted,
            statistics.records,
            statistics.elapsed
        );

        Ok(CrawlReport {
            statistics,
            stopped: report.stopped,
            datasheet_path,
        })
    }

    fn transport(&self, worker_id: usize) -> Result<AnonymizingTransport, NarghError> {
        Ok(AnonymizingTransport::new(
            worker_id,
            Arc::clone(&self.settings),
            Arc::clone(&self.provider),
        )?)
    }
}

/// Builds the sink the config asks for: JSON files, plus the index if configured
pub async fn build_sink(config: &Config) -> Result<Arc<dyn ResultSink>, NarghError> {
    let json: Arc<dyn ResultSink> = Arc::new(JsonFileSink::new(Path::new(&config.output.json_dir)));

    match &config.index {
        Some(index) => {
            let index_sink = IndexSink::connect(index.clone()).await?;
            Ok(Arc::new(FanoutSink::new().with(json).with(Arc::new(index_sink))))
        }
        None => Ok(json),
    }
}

/// Runs a crawl with the sinks and identity provider described by `config`
///
/// The category tree is read before any sink is set up, so a run that cannot
/// start leaves the output directory and the index untouched.
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `options` - Per-run options
/// * `stop` - Raised to stop the workers at their next job boundary
pub async fn run_crawl(
    config: Config,
    options: CrawlOptions,
    stop: Arc<AtomicBool>,
) -> Result<CrawlReport, NarghError> {
    let coordinator = Coordinator::new(config.clone())?;
    let categories = coordinator.resolve_categories(&options).await?;
    let sink = build_sink(&config).await?;
    coordinator.crawl_categories(&categories, sink, stop).await
}
