//! One-shot fetch of the category tree
//!
//! The products page embeds the tree as a JSON literal in an inline
//! script. The line ending with the category marker is followed by a line
//! of the form `var categories = '[...]';`, and the payload is whatever
//! sits between the first and the last single quote of that line.

use crate::catalog::Category;
use crate::crawler::{Classification, RetryExecutor, RetryOutcome};
use crate::transport::{AnonymizingTransport, FetchError};
use crate::NarghError;
use std::time::Duration;

/// Fetches and parses the category tree through one transport
pub struct CategoryFetcher<'a> {
    transport: &'a AnonymizingTransport,
    executor: RetryExecutor,
    marker: String,
    retry_delay: Duration,
}

impl<'a> CategoryFetcher<'a> {
    /// Creates a fetcher
    ///
    /// # Arguments
    ///
    /// * `transport` - Session used for the page fetch
    /// * `max_attempts` - Attempts before the fetch is given up
    /// * `marker` - Text ending the line before the embedded payload
    /// * `retry_delay` - Pause between attempts
    pub fn new(
        transport: &'a AnonymizingTransport,
        max_attempts: u32,
        marker: impl Into<String>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            transport,
            executor: RetryExecutor::new(max_attempts),
            marker: marker.into(),
            retry_delay,
        }
    }

    /// Fetches the products page and extracts the category tree
    ///
    /// Network failures are retried without rotating identity. A page that
    /// no longer carries the payload in the expected shape is reported as
    /// [`NarghError::SchemaDrift`] and never retried.
    pub async fn fetch(&self) -> Result<Vec<Category>, NarghError> {
        let transport = self.transport;
        let url = transport.products_url().to_string();
        let url = url.as_str();
        let delay = self.retry_delay;

        let outcome = self
            .executor
            .execute(
                "category page",
                move || async move { transport.get_text(url).await },
                classify_category_error,
                move || async move {
                    tokio::time::sleep(delay).await;
                    Ok(())
                },
            )
            .await;

        let page = match outcome {
            RetryOutcome::Success(page) => page,
            RetryOutcome::Fatal(error) => return Err(NarghError::CategoryFetch(error.to_string())),
            RetryOutcome::RetriesExhausted {
                attempts,
                last_error,
                ..
            } => {
                return Err(NarghError::CategoryFetch(format!(
                    "gave up after {} attempts: {}",
                    attempts, last_error
                )))
            }
        };

        let categories = parse_category_payload(&page, &self.marker)?;
        tracing::info!(
            "Fetched {} categories ({} subcategories)",
            categories.len(),
            categories.iter().map(|c| c.units().len()).sum::<usize>()
        );

        Ok(categories)
    }
}

/// Network trouble and server-side errors are worth another attempt
fn classify_category_error(error: &FetchError) -> Classification {
    match error {
        FetchError::Network { source, .. } if source.is_builder() => Classification::Fatal,
        FetchError::Network { .. } => Classification::Transient,
        FetchError::Status { status, .. } if *status == 429 || *status >= 500 => {
            Classification::Transient
        }
        _ => Classification::Fatal,
    }
}

/// Extracts the category tree embedded in the products page
///
/// # Example
///
/// ```
/// use nargh::catalog::parse_category_payload;
///
/// let page = "<script>\n// 分类数据\nvar categories = '[{\"ID\": 1, \"Name\": \"Resistors\"}]';\n</script>";
/// let categories = parse_category_payload(page, "分类数据").unwrap();
/// assert_eq!(categories[0].info.id, 1);
/// ```
pub fn parse_category_payload(page: &str, marker: &str) -> Result<Vec<Category>, NarghError> {
    let drift = |reason: String| NarghError::SchemaDrift { reason };

    let mut lines = page.lines();
    lines
        .by_ref()
        .find(|line| line.trim_end().ends_with(marker))
        .ok_or_else(|| drift(format!("category marker {:?} not found", marker)))?;

    let line = lines
        .next()
        .ok_or_else(|| drift("category marker is the last line of the page".to_string()))?;

    let start = line.find('\'');
    let end = line.rfind('\'');
    let payload = match (start, end) {
        (Some(start), Some(end)) if start < end => &line[start + 1..end],
        _ => return Err(drift("category payload is not quoted".to_string())),
    };

    serde_json::from_str(payload)
        .map_err(|e| drift(format!("category payload does not parse: {}", e)))
}
