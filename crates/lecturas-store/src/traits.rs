//! Trait abstraction over durable reading stores.

use async_trait::async_trait;

use lecturas_types::{NormalizedRow, PersistedReading};

use crate::error::Result;
use crate::queries::ReadingQuery;

/// A durable store of sensor readings keyed by reading id.
///
/// # Merge contract
///
/// [`merge`](ReadingStore::merge) is atomic and idempotent:
///
/// - rows whose reading id already exists are skipped, never updated
/// - duplicate ids inside one batch count once
/// - on any error nothing from the batch is visible afterwards
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Short backend name (`"postgres"`, `"sqlite"`) for logs and status.
    fn backend(&self) -> &'static str;

    /// Stage `rows` and move the new ones into permanent storage.
    ///
    /// Returns the number of rows actually inserted.
    async fn merge(&self, rows: &[NormalizedRow]) -> Result<u64>;

    /// Readings matching `query`.
    async fn query_readings(&self, query: &ReadingQuery) -> Result<Vec<PersistedReading>>;

    /// Total number of persisted readings.
    async fn count_readings(&self) -> Result<u64>;

    /// Every persisted reading, oldest first.
    async fn all_readings(&self) -> Result<Vec<PersistedReading>> {
        self.query_readings(&ReadingQuery::new()).await
    }
}
