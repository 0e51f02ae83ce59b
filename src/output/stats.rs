//! Crawl progress counters and the end-of-run summary
//!
//! Workers bump the shared [`CrawlProgress`] counters as they go; the
//! coordinator takes a [`CrawlStatistics`] snapshot once the pool drains.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters shared by every worker
#[derive(Debug)]
pub struct CrawlProgress {
    started: Instant,
    total: AtomicU64,
    completed: AtomicU64,
    aborted: AtomicU64,
    empty: AtomicU64,
    pages: AtomicU64,
    records: AtomicU64,
    rotations: AtomicU64,
    sink_failures: AtomicU64,
}

impl CrawlProgress {
    /// Starts the clock for a crawl of `total` subcategories
    pub fn new(total: usize) -> Self {
        Self {
            started: Instant::now(),
            total: AtomicU64::new(total as u64),
            completed: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
            empty: AtomicU64::new(0),
            pages: AtomicU64::new(0),
            records: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
        }
    }

    /// Records a subcategory whose every page was fetched
    pub fn record_completed(&self, pages: u32, records: usize) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.pages.fetch_add(u64::from(pages), Ordering::Relaxed);
        self.records.fetch_add(records as u64, Ordering::Relaxed);
        if records == 0 {
            self.empty.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a subcategory abandoned before its last page
    pub fn record_aborted(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rotations(&self, rotations: u64) {
        self.rotations.fetch_add(rotations, Ordering::Relaxed);
    }

    pub fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Subcategories finished so far, completed or aborted
    pub fn finished(&self) -> u64 {
        self.completed.load(Ordering::Relaxed) + self.aborted.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Takes a snapshot of the counters
    pub fn snapshot(&self) -> CrawlStatistics {
        CrawlStatistics {
            subcategories: self.total(),
            completed: self.completed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            pages: self.pages.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            datasheets: 0,
            worker_failures: 0,
            elapsed: self.elapsed(),
        }
    }
}

/// Crawl statistics summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlStatistics {
    /// Subcategories scheduled
    pub subcategories: u64,

    /// Subcategories whose every page was fetched
    pub completed: u64,

    /// Subcategories abandoned, their partial output discarded
    pub aborted: u64,

    /// Completed subcategories without a single record
    pub empty: u64,

    pub pages: u64,
    pub records: u64,

    /// Unique datasheet URLs collected
    pub datasheets: u64,

    /// Identity rotations across all workers
    pub rotations: u64,

    pub sink_failures: u64,

    /// Workers that stopped on a transport failure
    pub worker_failures: u64,

    pub elapsed: Duration,
}

impl CrawlStatistics {
    /// Subcategories never picked up by a worker
    pub fn unprocessed(&self) -> u64 {
        self.subcategories
            .saturating_sub(self.completed + self.aborted)
    }

    /// Share of scheduled subcategories that completed, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.subcategories == 0 {
            return 0.0;
        }
        (self.completed as f64 / self.subcategories as f64) * 100.0
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Subcategories:");
    println!("  Scheduled: {}", stats.subcategories);
    println!("  Completed: {} ({} empty)", stats.completed, stats.empty);
    println!("  Aborted: {}", stats.aborted);
    println!("  Unprocessed: {}", stats.unprocessed());
    println!();

    println!("Output:");
    println!("  Pages fetched: {}", stats.pages);
    println!("  Records: {}", stats.records);
    println!("  Datasheet URLs: {}", stats.datasheets);
    if stats.sink_failures > 0 {
        println!("  Sink failures: {}", stats.sink_failures);
    }
    println!();

    println!("Sessions:");
    println!("  Identity rotations: {}", stats.rotations);
    println!("  Worker failures: {}", stats.worker_failures);
    println!();

    println!(
        "Success Rate: {:.1}% ({} / {} subcategories in {:.1?})",
        stats.success_rate(),
        stats.completed,
        stats.subcategories,
        stats.elapsed
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let progress = CrawlProgress::new(5);
        progress.record_completed(3, 120);
        progress.record_completed(1, 0);
        progress.record_aborted();
        progress.record_rotations(2);

        let stats = progress.snapshot();
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.empty, 1);
        assert_eq!(stats.aborted, 1);
        assert_eq!(stats.pages, 4);
        assert_eq!(stats.records, 120);
        assert_eq!(stats.rotations, 2);
        assert_eq!(stats.unprocessed(), 2);
        assert_eq!(progress.finished(), 3);
    }

    #[test]
    fn test_success_rate() {
        let stats = CrawlStatistics {
            subcategories: 10,
            completed: 8,
            ..CrawlStatistics::default()
        };
        assert!((stats.success_rate() - 80.0).abs() < 0.01);
        assert_eq!(CrawlStatistics::default().success_rate(), 0.0);
    }
}
