//! Shared fixtures for unit tests.

use std::time::Duration;

use async_trait::async_trait;

use lecturas_store::{Error, ReadingQuery, ReadingStore, Result};
use lecturas_types::{NormalizedRow, PersistedReading, RawSensorItem, fields};

/// A complete raw item as the firmware writes it.
pub fn reading(id: &str, timestamp: i64) -> RawSensorItem {
    RawSensorItem::new()
        .with_string(fields::READING_ID, id)
        .with_string(fields::DEVICE_ID, "d1")
        .with_number(fields::TEMPERATURE, 22.5)
        .with_number(fields::HUMIDITY, 55)
        .with_number(fields::DISTANCE_CM, 10)
        .with_number(fields::LIGHT_PCT, 80)
        .with_string(fields::LIGHT_STATE, "on")
        .with_number(fields::TIMESTAMP, timestamp)
}

/// A store whose every operation fails as if the server stopped answering.
pub struct FailingStore;

#[async_trait]
impl ReadingStore for FailingStore {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn merge(&self, _rows: &[NormalizedRow]) -> Result<u64> {
        Err(Error::Timeout(Duration::from_secs(10)))
    }

    async fn query_readings(&self, _query: &ReadingQuery) -> Result<Vec<PersistedReading>> {
        Err(Error::Timeout(Duration::from_secs(10)))
    }

    async fn count_readings(&self) -> Result<u64> {
        Err(Error::Timeout(Duration::from_secs(10)))
    }
}

/// A store that takes `.0` to finish any merge.
pub struct SlowStore(pub Duration);

#[async_trait]
impl ReadingStore for SlowStore {
    fn backend(&self) -> &'static str {
        "slow"
    }

    async fn merge(&self, rows: &[NormalizedRow]) -> Result<u64> {
        tokio::time::sleep(self.0).await;
        Ok(rows.len() as u64)
    }

    async fn query_readings(&self, _query: &ReadingQuery) -> Result<Vec<PersistedReading>> {
        Ok(Vec::new())
    }

    async fn count_readings(&self) -> Result<u64> {
        Ok(0)
    }
}
