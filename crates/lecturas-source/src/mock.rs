//! In-memory source store for tests.
//!
//! [`MockSource`] serves a fixed list of pages and can be told to fail,
//! either permanently or for a number of calls before recovering, and to
//! answer slowly.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use lecturas_types::RawSensorItem;

use crate::error::{Error, Result};
use crate::traits::{CursorValue, ScanCursor, ScanPage, SourceStore};

const PAGE_KEY: &str = "page";

/// A paginated source store backed by memory.
///
/// ```
/// use lecturas_source::{MockSource, SourceStore};
/// use lecturas_types::RawSensorItem;
///
/// # #[tokio::main]
/// # async fn main() {
/// let source = MockSource::from_pages(vec![vec![RawSensorItem::new()], vec![]]);
/// let first = source.scan_page(None).await.unwrap();
/// assert_eq!(first.items.len(), 1);
/// assert!(first.next.is_some());
/// # }
/// ```
#[derive(Debug)]
pub struct MockSource {
    table: String,
    pages: RwLock<Vec<Vec<RawSensorItem>>>,
    scan_count: AtomicU32,
    should_fail: AtomicBool,
    fail_retryable: AtomicBool,
    remaining_failures: AtomicU32,
    stall: AtomicBool,
    latency_ms: AtomicU64,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::from_pages(Vec::new())
    }
}

impl MockSource {
    /// A source whose scan yields `pages` in order.
    pub fn from_pages(pages: Vec<Vec<RawSensorItem>>) -> Self {
        Self {
            table: "mock_sensores".to_string(),
            pages: RwLock::new(pages),
            scan_count: AtomicU32::new(0),
            should_fail: AtomicBool::new(false),
            fail_retryable: AtomicBool::new(false),
            remaining_failures: AtomicU32::new(0),
            stall: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Split `items` into pages of at most `page_size` items.
    pub fn from_items(items: Vec<RawSensorItem>, page_size: usize) -> Self {
        let pages = items
            .chunks(page_size.max(1))
            .map(<[RawSensorItem]>::to_vec)
            .collect();
        Self::from_pages(pages)
    }

    /// Replace the served pages.
    pub async fn set_pages(&self, pages: Vec<Vec<RawSensorItem>>) {
        *self.pages.write().await = pages;
    }

    /// Fail every call until cleared.
    pub fn set_should_fail(&self, fail: bool, retryable: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
        self.fail_retryable.store(retryable, Ordering::Relaxed);
    }

    /// Fail the next `count` calls with a retryable error, then recover.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Echo the incoming cursor instead of advancing.
    pub fn set_stalled(&self, stall: bool) {
        self.stall.store(stall, Ordering::Relaxed);
    }

    /// Delay every page by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::Relaxed);
    }

    /// Number of `scan_page` calls so far, failed ones included.
    pub fn scan_count(&self) -> u32 {
        self.scan_count.load(Ordering::Relaxed)
    }

    fn injected_failure(&self) -> Option<Error> {
        if self.should_fail.load(Ordering::Relaxed) {
            return Some(Error::Scan {
                table: self.table.clone(),
                message: "Mock failure".to_string(),
                retryable: self.fail_retryable.load(Ordering::Relaxed),
            });
        }
        let transient = self
            .remaining_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        transient.then(|| Error::Scan {
            table: self.table.clone(),
            message: "Mock transient failure".to_string(),
            retryable: true,
        })
    }

    fn page_index(&self, start: Option<&ScanCursor>) -> Result<usize> {
        let Some(cursor) = start else {
            return Ok(0);
        };
        match cursor.get(PAGE_KEY) {
            Some(CursorValue::N(n)) => n.parse().map_err(|_| self.bad_cursor()),
            _ => Err(self.bad_cursor()),
        }
    }

    fn bad_cursor(&self) -> Error {
        Error::Scan {
            table: self.table.clone(),
            message: "Invalid continuation key".to_string(),
            retryable: false,
        }
    }
}

fn cursor_for(index: usize) -> ScanCursor {
    ScanCursor::from([(PAGE_KEY.to_string(), CursorValue::N(index.to_string()))])
}

#[async_trait]
impl SourceStore for MockSource {
    fn table(&self) -> &str {
        &self.table
    }

    async fn scan_page(&self, start: Option<&ScanCursor>) -> Result<ScanPage> {
        self.scan_count.fetch_add(1, Ordering::Relaxed);

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if let Some(err) = self.injected_failure() {
            return Err(err);
        }

        let index = self.page_index(start)?;
        let pages = self.pages.read().await;
        let items = pages.get(index).cloned().unwrap_or_default();

        let next = if self.stall.load(Ordering::Relaxed) {
            Some(start.cloned().unwrap_or_else(|| cursor_for(0)))
        } else if index + 1 < pages.len() {
            Some(cursor_for(index + 1))
        } else {
            None
        };

        Ok(ScanPage { items, next })
    }
}
