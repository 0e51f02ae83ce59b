//! One JSON file per subcategory

use crate::catalog::ProductRecord;
use crate::output::{ResultSink, SinkResult};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::path::{Path, PathBuf};

/// Writes each batch to `<dir>/<subcategory id>.json`
///
/// Files are written to a temporary name and renamed into place, so a
/// reader never sees a half-written array. An existing file for the same
/// subcategory is replaced.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    /// Creates a sink writing into `dir`; the directory is created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file holding a subcategory's records
    pub fn path_for(&self, subcategory_id: u64) -> PathBuf {
        self.dir.join(format!("{}.json", subcategory_id))
    }

    /// Directory the files are written to
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ResultSink for JsonFileSink {
    async fn accept(&self, subcategory_id: u64, records: &[ProductRecord]) -> SinkResult<()> {
        let body = to_indented_json(records)?;

        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(subcategory_id);
        let tmp = self.dir.join(format!(".{}.json.tmp", subcategory_id));

        if let Err(err) = tokio::fs::write(&tmp, &body).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(
            "Wrote {} records to {}",
            records.len(),
            path.display()
        );
        Ok(())
    }
}

/// Serializes with a four-space indent
fn to_indented_json<T: Serialize + ?Sized>(value: &T) -> SinkResult<Vec<u8>> {
    let mut body = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut body, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;
    body.push(b'\n');
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(number: &str) -> ProductRecord {
        ProductRecord {
            number: number.to_string(),
            ..ProductRecord::default()
        }
    }

    #[tokio::test]
    async fn test_writes_indented_array() {
        let dir = TempDir::new().unwrap();
        let sink = JsonFileSink::new(dir.path().join("json"));

        sink.accept(42, &[record("C1"), record("C2")]).await.unwrap();

        let written = std::fs::read_to_string(sink.path_for(42)).unwrap();
        assert!(written.starts_with("[\n    {"));

        let parsed: Vec<ProductRecord> = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].number, "C2");
    }

    #[tokio::test]
    async fn test_replaces_existing_file_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let sink = JsonFileSink::new(dir.path());

        sink.accept(7, &[record("old")]).await.unwrap();
        sink.accept(7, &[record("new")]).await.unwrap();

        let parsed: Vec<ProductRecord> =
            serde_json::from_str(&std::fs::read_to_string(sink.path_for(7)).unwrap()).unwrap();
        assert_eq!(parsed[0].number, "new");

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
