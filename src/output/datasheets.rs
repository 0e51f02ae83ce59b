//! Deduplicated datasheet URLs shared by all workers

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::fs;

/// Thread-safe set of datasheet URLs
///
/// Workers add the URLs of every completed subcategory; the sorted,
/// duplicate-free list is read once after the pool has drained.
#[derive(Debug, Default)]
pub struct DatasheetCollector {
    urls: Mutex<BTreeSet<String>>,
}

impl DatasheetCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one URL; returns false if it was already present
    pub fn insert(&self, url: impl Into<String>) -> bool {
        self.lock().insert(url.into())
    }

    /// Adds many URLs under a single lock; returns how many were new
    pub fn extend<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = self.lock();
        urls.into_iter()
            .map(|url| set.insert(url.into()))
            .filter(|inserted| *inserted)
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Every collected URL, sorted ascending by byte value
    pub fn sorted_urls(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    /// Writes the sorted list to `path`, one URL per line
    ///
    /// Parent directories are created as needed.
    pub async fn write_to(&self, path: &Path) -> std::io::Result<usize> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let urls = self.sorted_urls();
        let mut body = urls.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        fs::write(path, body).await?;

        tracing::info!("Wrote {} datasheet URLs to {}", urls.len(), path.display());
        Ok(urls.len())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.urls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
