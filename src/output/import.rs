//! Batch import of previously written JSON files

use crate::catalog::ProductRecord;
use crate::output::ResultSink;
use crate::NarghError;
use std::path::{Path, PathBuf};

/// Totals of an import run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub files: usize,
    pub records: usize,
    /// Files holding `null` or an empty array
    pub skipped: usize,
}

/// Pushes every `*.json` file in `dir` to `sink`, in file name order
///
/// Each file must hold an array of product records, as written by
/// [`JsonFileSink`](crate::output::JsonFileSink). The file stem is used
/// as the subcategory id when it is numeric, `0` otherwise. The first
/// unreadable file or failed delivery stops the import.
pub async fn import_folder(dir: &Path, sink: &dyn ResultSink) -> Result<ImportReport, NarghError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    tracing::info!("Importing {} files from {}", files.len(), dir.display());

    let mut report = ImportReport::default();
    for path in files {
        let body = tokio::fs::read(&path).await?;
        let records: Option<Vec<ProductRecord>> = serde_json::from_slice(&body)?;
        let records = records.unwrap_or_default();

        report.files += 1;
        if records.is_empty() {
            tracing::debug!("Skipping {}, no records", path.display());
            report.skipped += 1;
            continue;
        }

        let id = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse().ok())
            .unwrap_or(0);

        sink.accept(id, &records).await.map_err(|err| {
            tracing::error!("Import of {} failed: {}", path.display(), err);
            NarghError::Sink(err)
        })?;
        report.records += records.len();
    }

    tracing::info!(
        "Imported {} records from {} files",
        report.records,
        report.files
    );
    Ok(report)
}
