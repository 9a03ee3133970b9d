//! Full-table scan driver.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info};

use lecturas_types::RawSensorItem;

use crate::error::{Error, Result};
use crate::retry::{RetryConfig, with_retry};
use crate::traits::SourceStore;

/// Tuning for [`scan_all`].
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Retry policy applied to each page independently.
    pub retry: RetryConfig,
    /// Upper bound for a single page request.
    pub page_timeout: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            page_timeout: Duration::from_secs(30),
        }
    }
}

impl ScanOptions {
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn page_timeout(mut self, page_timeout: Duration) -> Self {
        self.page_timeout = page_timeout;
        self
    }
}

/// Read every item in the source, following continuation keys until the
/// store reports no more pages.
///
/// Either every item comes back or an error does. Items appear in page
/// order; the order within the table is unspecified.
pub async fn scan_all(source: &dyn SourceStore, options: &ScanOptions) -> Result<Vec<RawSensorItem>> {
    let table = source.table();
    let mut items = Vec::new();
    let mut cursor = None;
    let mut pages = 0u32;

    loop {
        let start = cursor.as_ref();
        let page = with_retry(&options.retry, "scan_page", || async move {
            timeout(options.page_timeout, source.scan_page(start))
                .await
                .map_err(|_| Error::Timeout(options.page_timeout))?
        })
        .await?;

        pages += 1;
        debug!(
            "Scanned page {} of '{}': {} items",
            pages,
            table,
            page.items.len()
        );
        items.extend(page.items);

        match page.next {
            Some(next) if Some(&next) == cursor.as_ref() => {
                return Err(Error::StalledCursor(table.to_string()));
            }
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    info!(
        "Scanned {} items from '{}' in {} pages",
        items.len(),
        table,
        pages
    );
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSource;
    use lecturas_types::fields;

    fn items(count: u32) -> Vec<RawSensorItem> {
        (0..count)
            .map(|n| RawSensorItem::new().with_number(fields::TIMESTAMP, n))
            .collect()
    }

    fn fast_options() -> ScanOptions {
        ScanOptions::default().retry(
            RetryConfig::new(3)
                .initial_delay(Duration::from_millis(1))
                .jitter(false),
        )
    }

    #[tokio::test]
    async fn test_collects_every_page() {
        let source = MockSource::from_pages(vec![items(100), items(100), items(50)]);

        let all = scan_all(&source, &fast_options()).await.unwrap();

        assert_eq!(all.len(), 250);
        assert_eq!(source.scan_count(), 3);
    }

    #[tokio::test]
    async fn test_empty_table() {
        let source = MockSource::default();
        let all = scan_all(&source, &fast_options()).await.unwrap();
        assert!(all.is_empty());
        assert_eq!(source.scan_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_middle_page_still_continues() {
        let source = MockSource::from_pages(vec![items(3), Vec::new(), items(2)]);
        let all = scan_all(&source, &fast_options()).await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let source = MockSource::from_pages(vec![items(10), items(10)]);
        source.set_transient_failures(2);

        let all = scan_all(&source, &fast_options()).await.unwrap();

        assert_eq!(all.len(), 20);
        assert_eq!(source.scan_count(), 4);
    }

    #[tokio::test]
    async fn test_permanent_failure_returns_no_items() {
        let source = MockSource::from_pages(vec![items(10), items(10)]);
        source.set_should_fail(true, false);

        let result = scan_all(&source, &fast_options()).await;

        assert!(matches!(result, Err(Error::Scan { .. })));
        assert_eq!(source.scan_count(), 1);
    }

    #[tokio::test]
    async fn test_stalled_cursor_detected() {
        let source = MockSource::from_pages(vec![items(1), items(1)]);
        source.set_stalled(true);

        let result = scan_all(&source, &fast_options()).await;

        assert!(matches!(result, Err(Error::StalledCursor(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_page_times_out() {
        let source = MockSource::from_pages(vec![items(1)]);
        source.set_latency(Duration::from_secs(60));
        let options = ScanOptions::default()
            .retry(RetryConfig::none())
            .page_timeout(Duration::from_secs(5));

        let result = scan_all(&source, &options).await;

        assert!(matches!(result, Err(Error::Timeout(_))));
    }
}
