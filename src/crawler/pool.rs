//! Worker pool fanning subcategories over isolated sessions
//!
//! Each worker owns one transport for its whole life and pulls jobs from a
//! shared FIFO queue. A job is handed to exactly one worker. The stop flag
//! is honored between jobs only, so a subcategory in progress is always
//! finished or aborted, never cut off mid-page.

use crate::catalog::SubCategory;
use crate::crawler::{CrawlError, SubCategoryBatch, SubCategoryCrawler};
use crate::output::{CrawlProgress, DatasheetCollector, ResultSink};
use crate::transport::{AnonymizingTransport, TransportError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// FIFO queue of subcategories, filled once before the workers start
///
/// Once empty the queue is closed: nothing is ever added back.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<SubCategory>>,
}

impl JobQueue {
    pub fn new(jobs: impl IntoIterator<Item = SubCategory>) -> Self {
        Self {
            jobs: Mutex::new(jobs.into_iter().collect()),
        }
    }

    /// Claims the next job; `None` once the queue is drained
    pub fn next_job(&self) -> Option<SubCategory> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Jobs not claimed by any worker
    pub fn remaining(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Where completed work goes, shared by every worker
#[derive(Clone)]
pub struct PoolContext {
    pub collector: Arc<DatasheetCollector>,
    pub sink: Arc<dyn ResultSink>,
    pub progress: Arc<CrawlProgress>,
}

/// Why a worker stopped pulling jobs
#[derive(Debug)]
pub enum WorkerExit {
    /// The queue ran dry
    Drained,

    /// The stop flag was raised
    Stopped,

    /// The worker's transport failed; its remaining share goes to the others
    TransportFailed(TransportError),

    /// The worker task panicked
    Panicked(String),
}

impl WorkerExit {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::TransportFailed(_) | Self::Panicked(_))
    }
}

/// Outcome of a whole pool run
#[derive(Debug)]
pub struct PoolReport {
    /// Exit reason per worker, in worker id order
    pub exits: Vec<(usize, WorkerExit)>,

    /// Jobs never claimed
    pub unprocessed: usize,

    /// Whether the stop flag was raised during the run
    pub stopped: bool,
}

impl PoolReport {
    /// Number of workers that ended on a failure
    pub fn failed_workers(&self) -> usize {
        self.exits.iter().filter(|(_, exit)| exit.is_failure()).count()
    }
}

/// A fixed set of workers, one transport each
pub struct WorkerPool {
    transports: Vec<AnonymizingTransport>,
    page_retry_ceiling: u32,
}

impl WorkerPool {
    /// Creates a pool with one worker per transport
    pub fn new(transports: Vec<AnonymizingTransport>, page_retry_ceiling: u32) -> Self {
        Self {
            transports,
            page_retry_ceiling,
        }
    }

    pub fn size(&self) -> usize {
        self.transports.len()
    }

    /// Runs every job to completion, or until stopped
    ///
    /// Returns after all workers have exited. Jobs a failed worker never
    /// claimed stay in the queue for the others.
    pub async fn run(
        self,
        jobs: Vec<SubCategory>,
        context: PoolContext,
        stop: Arc<AtomicBool>,
    ) -> PoolReport {
        let queue = Arc::new(JobQueue::new(jobs));
        tracing::info!(
            "Starting {} workers for {} subcategories",
            self.transports.len(),
            queue.remaining()
        );

        let mut handles = Vec::with_capacity(self.transports.len());
        for transport in self.transports {
            let worker_id = transport.worker_id();
            let queue = Arc::clone(&queue);
            let context = context.clone();
            let stop = Arc::clone(&stop);
            let ceiling = self.page_retry_ceiling;

            handles.push((
                worker_id,
                tokio::spawn(async move {
                    run_worker(transport, queue, context, stop, ceiling).await
                }),
            ));
        }

        let mut exits = Vec::with_capacity(handles.len());
        for (worker_id, handle) in handles {
            let exit = match handle.await {
                Ok(exit) => exit,
                Err(err) => {
                    tracing::error!(worker = worker_id, "Worker task failed: {}", err);
                    WorkerExit::Panicked(err.to_string())
                }
            };
            exits.push((worker_id, exit));
        }

        let report = PoolReport {
            exits,
            unprocessed: queue.remaining(),
            stopped: stop.load(Ordering::SeqCst),
        };
        tracing::info!(
            "All workers exited ({} failed, {} subcategories unprocessed)",
            report.failed_workers(),
            report.unprocessed
        );
        report
    }
}

/// One worker's loop: establish a session, then claim jobs until done
async fn run_worker(
    transport: AnonymizingTransport,
    queue: Arc<JobQueue>,
    context: PoolContext,
    stop: Arc<AtomicBool>,
    page_retry_ceiling: u32,
) -> WorkerExit {
    let worker_id = transport.worker_id();

    if let Err(err) = transport.acquire().await {
        tracing::error!(worker = worker_id, kind = "transport-fatal", "Session setup failed: {}", err);
        return WorkerExit::TransportFailed(err);
    }

    let crawler = SubCategoryCrawler::new(&transport, page_retry_ceiling);

    loop {
        if stop.load(Ordering::SeqCst) {
            tracing::info!(worker = worker_id, "Stop requested, leaving the queue");
            return WorkerExit::Stopped;
        }

        let Some(job) = queue.next_job() else {
            tracing::debug!(worker = worker_id, "Queue drained");
            return WorkerExit::Drained;
        };

        let rotations_before = transport.rotations();
        let result = crawler.crawl(&job).await;
        context
            .progress
            .record_rotations(transport.rotations() - rotations_before);

        match result {
            Ok(batch) => deliver(worker_id, &job, batch, &context).await,
            Err(err @ CrawlError::SubcategoryFatal { .. }) => {
                context.progress.record_aborted();
                tracing::error!(
                    worker = worker_id,
                    subcategory = job.id,
                    kind = err.kind(),
                    "{}",
                    err
                );
            }
            Err(CrawlError::TransportFatal { id, source }) => {
                context.progress.record_aborted();
                tracing::error!(
                    worker = worker_id,
                    subcategory = id,
                    kind = "transport-fatal",
                    "Worker stopping: {}",
                    source
                );
                return WorkerExit::TransportFailed(source);
            }
        }
    }
}

/// Hands a completed batch to the collector and the sink
///
/// The collector is fed first; a failing sink does not take the URLs back.
async fn deliver(worker_id: usize, job: &SubCategory, batch: SubCategoryBatch, context: &PoolContext) {
    let new_datasheets = context.collector.extend(batch.datasheets);
    context
        .progress
        .record_completed(batch.pages, batch.records.len());

    tracing::info!(
        worker = worker_id,
        subcategory = job.id,
        "{}: {} records over {} pages, {} new datasheets ({}/{})",
        job.name,
        batch.records.len(),
        batch.pages,
        new_datasheets,
        context.progress.finished(),
        context.progress.total()
    );

    if batch.records.is_empty() {
        tracing::debug!(worker = worker_id, subcategory = job.id, "Empty batch, nothing to deliver");
        return;
    }

    if let Err(err) = context.sink.accept(job.id, &batch.records).await {
        context.progress.record_sink_failure();
        tracing::error!(
            worker = worker_id,
            subcategory = job.id,
            kind = err.kind(),
            "Delivering batch failed: {}",
            err
        );
    }
}
