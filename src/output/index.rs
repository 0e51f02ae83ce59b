//! Search index ingestion
//!
//! Speaks the document API of a Meilisearch-compatible server: the index
//! is created once, then every batch is added or updated as documents
//! keyed by the catalog number.

use crate::catalog::ProductRecord;
use crate::config::IndexConfig;
use crate::output::{ResultSink, SinkError, SinkResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

/// Searchable projection of a product record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct IndexDocument {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "MPN")]
    pub mpn: String,
    pub weight: f64,
    pub packaging: String,
    pub title: String,
    #[serde(rename = "URL")]
    pub url: String,
    pub manufacturer: String,
    pub stock: i64,
    pub datasheet: Vec<String>,
    pub package: String,
    pub categories: Vec<String>,
    pub status: String,
    #[serde(rename = "StockSZ")]
    pub stock_sz: i64,
    #[serde(rename = "StockJS")]
    pub stock_js: i64,
    #[serde(rename = "StockHK")]
    pub stock_hk: i64,
    pub updated: DateTime<Utc>,
}

impl IndexDocument {
    /// Projects a record, stamping it with the batch's update time
    pub fn from_record(record: &ProductRecord, updated: DateTime<Utc>) -> Self {
        Self {
            id: record.number.clone(),
            mpn: record.info.number.clone(),
            weight: record.info.weight,
            packaging: record.info.packaging.clone(),
            title: record.info.title.clone(),
            url: record.url.clone(),
            manufacturer: record.manufacturer.en.clone(),
            stock: record.stock,
            datasheet: record.datasheet_urls().map(str::to_string).collect(),
            package: record.package.clone(),
            categories: record.categories.clone(),
            status: record.status.clone(),
            stock_sz: record.stock_sz,
            stock_js: record.stock_js,
            stock_hk: record.stock_hk,
            updated,
        }
    }
}

/// Sink pushing batches into a search index
pub struct IndexSink {
    client: Client,
    config: IndexConfig,
}

impl IndexSink {
    /// Creates the sink and makes sure the index exists
    ///
    /// An index that already exists is fine; any other refusal is logged
    /// and ingestion is attempted anyway.
    pub async fn connect(config: IndexConfig) -> SinkResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let sink = Self { client, config };
        sink.ensure_index().await?;
        Ok(sink)
    }

    async fn ensure_index(&self) -> SinkResult<()> {
        let url = format!("{}/indexes", self.host());
        let body = json!({
            "uid": self.config.index_uid,
            "primaryKey": self.config.primary_key,
        });

        let response = self.authorized(self.client.post(&url).json(&body)).send().await?;
        let status = response.status();
        if status.is_success() {
            tracing::info!("Index {} ready at {}", self.config.index_uid, self.host());
        } else {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(
                "Index {} not created (HTTP {}): {}",
                self.config.index_uid,
                status.as_u16(),
                text
            );
        }
        Ok(())
    }

    fn host(&self) -> &str {
        self.config.host.trim_end_matches('/')
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl ResultSink for IndexSink {
    async fn accept(&self, subcategory_id: u64, records: &[ProductRecord]) -> SinkResult<()> {
        let updated = Utc::now();
        let documents: Vec<IndexDocument> = records
            .iter()
            .map(|record| IndexDocument::from_record(record, updated))
            .collect();

        let url = format!(
            "{}/indexes/{}/documents",
            self.host(),
            self.config.index_uid
        );
        let response = self
            .authorized(
                self.client
                    .post(&url)
                    .query(&[("primaryKey", self.config.primary_key.as_str())])
                    .json(&documents),
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(
            "Queued {} documents from subcategory {} for indexing",
            documents.len(),
            subcategory_id
        );
        Ok(())
    }
}
