//! Delivery to several sinks at once

use crate::catalog::ProductRecord;
use crate::output::{ResultSink, SinkResult};
use async_trait::async_trait;
use std::sync::Arc;

/// Hands every batch to each inner sink in order
///
/// A failing sink does not keep the batch from the others; the first
/// failure is returned once all of them have been tried.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink to the end of the delivery order
    pub fn with(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl ResultSink for FanoutSink {
    async fn accept(&self, subcategory_id: u64, records: &[ProductRecord]) -> SinkResult<()> {
        let mut first_error = None;

        for sink in &self.sinks {
            if let Err(err) = sink.accept(subcategory_id, records).await {
                tracing::warn!(
                    "Sink failed for subcategory {}: {}",
                    subcategory_id,
                    err
                );
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
