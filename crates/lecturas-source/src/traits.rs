//! Trait abstraction over paginated source stores.

use std::collections::HashMap;

use async_trait::async_trait;

use lecturas_types::RawSensorItem;

use crate::error::Result;

/// One attribute of a continuation key. Key attributes are always scalar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorValue {
    /// String key attribute.
    S(String),
    /// Number key attribute, decimal text.
    N(String),
    /// Binary key attribute.
    B(Vec<u8>),
}

/// Continuation key returned by a page and sent back for the next one.
pub type ScanCursor = HashMap<String, CursorValue>;

/// One page of scan results.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    /// Items on this page, in no particular order.
    pub items: Vec<RawSensorItem>,
    /// Where to resume; `None` when the scan is complete.
    pub next: Option<ScanCursor>,
}

/// A store that can be read one scan page at a time.
///
/// Implementations only fetch single pages; pagination, retries and
/// timeouts are driven by [`crate::scan_all`].
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Table (or collection) name, for logs and errors.
    fn table(&self) -> &str;

    /// Fetch the page starting at `start`, or the first page when `None`.
    async fn scan_page(&self, start: Option<&ScanCursor>) -> Result<ScanPage>;
}
