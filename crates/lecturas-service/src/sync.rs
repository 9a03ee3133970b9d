//! Sync orchestrator: scan, normalize, merge.
//!
//! One run is strictly linear:
//!
//! ```text
//! SCAN ──empty──▶ no_items
//!   │ fail ─────▶ error_source   (durable store untouched)
//!   ▼
//! NORMALIZE (malformed items skipped and counted)
//!   ▼
//! MERGE ─fail───▶ error_store    (transaction rolled back)
//!   ▼
//! success { new_records }
//! ```
//!
//! Runs never overlap: a trigger arriving while a run is active returns
//! `already_running` immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{error, info, warn};

use lecturas_source::{ScanOptions, SourceStore, scan_all};
use lecturas_store::ReadingStore;
use lecturas_types::normalize;

/// Outcome category of one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// The source held no items; nothing was merged.
    NoItems,
    /// Items were merged (possibly zero new ones).
    Success,
    /// The source could not be scanned.
    ErrorSource,
    /// The durable store rejected the merge.
    ErrorStore,
    /// Another run was active; this trigger did nothing.
    AlreadyRunning,
}

impl SyncStatus {
    pub fn is_error(self) -> bool {
        matches!(self, SyncStatus::ErrorSource | SyncStatus::ErrorStore)
    }
}

/// Structured result of [`Syncer::run_sync`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_records: Option<u64>,
    /// Items dropped as malformed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_records: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanned_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    fn with_status(status: SyncStatus) -> Self {
        Self {
            status,
            new_records: None,
            skipped_records: None,
            scanned_items: None,
            error: None,
        }
    }

    pub fn no_items() -> Self {
        Self::with_status(SyncStatus::NoItems)
    }

    pub fn already_running() -> Self {
        Self::with_status(SyncStatus::AlreadyRunning)
    }

    pub fn success(new_records: u64, skipped_records: usize, scanned_items: usize) -> Self {
        Self {
            new_records: Some(new_records),
            skipped_records: Some(skipped_records),
            scanned_items: Some(scanned_items),
            ..Self::with_status(SyncStatus::Success)
        }
    }

    pub fn from_error(err: &SyncError) -> Self {
        let status = match err {
            SyncError::SourceUnavailable(_) => SyncStatus::ErrorSource,
            SyncError::MergeUnavailable(_) => SyncStatus::ErrorStore,
        };
        Self {
            error: Some(err.to_string()),
            ..Self::with_status(status)
        }
    }
}

/// Run-level failures.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Source store unavailable: {0}")]
    SourceUnavailable(#[from] lecturas_source::Error),
    #[error("Durable store unavailable: {0}")]
    MergeUnavailable(#[from] lecturas_store::Error),
}

/// Counters across every run since startup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    /// Runs that actually executed.
    pub runs: u64,
    /// Runs ending in `success` or `no_items`.
    pub successes: u64,
    /// Runs ending in `error_source` or `error_store`.
    pub failures: u64,
    /// Triggers rejected because a run was active.
    pub skipped_triggers: u64,
    pub total_new_records: u64,
    pub last_result: Option<SyncResult>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_finished_at: Option<OffsetDateTime>,
}

/// Clears the in-flight flag when the run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Moves readings from the source store into the durable store.
///
/// Holds its collaborators directly; nothing here depends on the HTTP layer.
pub struct Syncer {
    source: Arc<dyn SourceStore>,
    store: Arc<dyn ReadingStore>,
    scan: ScanOptions,
    merge_timeout: Duration,
    in_flight: AtomicBool,
    stats: RwLock<SyncStats>,
}

impl Syncer {
    pub fn new(source: Arc<dyn SourceStore>, store: Arc<dyn ReadingStore>) -> Self {
        Self {
            source,
            store,
            scan: ScanOptions::default(),
            merge_timeout: Duration::from_secs(120),
            in_flight: AtomicBool::new(false),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    #[must_use]
    pub fn with_scan_options(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    #[must_use]
    pub fn with_merge_timeout(mut self, merge_timeout: Duration) -> Self {
        self.merge_timeout = merge_timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn ReadingStore> {
        &self.store
    }

    /// Whether a run is executing right now.
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn stats(&self) -> SyncStats {
        self.stats.read().await.clone()
    }

    /// Execute one sync run. Never fails: errors are reported in the result.
    pub async fn run_sync(&self) -> SyncResult {
        let Some(_guard) = RunGuard::acquire(&self.in_flight) else {
            warn!("Sync already in progress, skipping trigger");
            self.stats.write().await.skipped_triggers += 1;
            return SyncResult::already_running();
        };

        self.stats.write().await.last_started_at = Some(OffsetDateTime::now_utc());

        let result = match self.execute().await {
            Ok(result) => result,
            Err(e) => {
                error!("Sync failed: {}", e);
                SyncResult::from_error(&e)
            }
        };

        let mut stats = self.stats.write().await;
        stats.runs += 1;
        if result.status.is_error() {
            stats.failures += 1;
        } else {
            stats.successes += 1;
        }
        stats.total_new_records += result.new_records.unwrap_or(0);
        stats.last_result = Some(result.clone());
        stats.last_finished_at = Some(OffsetDateTime::now_utc());

        result
    }

    async fn execute(&self) -> Result<SyncResult, SyncError> {
        info!("Starting sync from '{}'", self.source.table());
        let items = scan_all(self.source.as_ref(), &self.scan).await?;
        if items.is_empty() {
            info!("No items found in '{}'", self.source.table());
            return Ok(SyncResult::no_items());
        }

        let normalized = normalize(&items);
        let skipped = normalized.skipped.len();
        if skipped > 0 {
            warn!("Skipped {} malformed items of {}", skipped, items.len());
        }

        let inserted = timeout(self.merge_timeout, self.store.merge(&normalized.rows))
            .await
            .map_err(|_| lecturas_store::Error::Timeout(self.merge_timeout))??;

        info!(
            "Sync complete: {} scanned, {} new, {} skipped",
            items.len(),
            inserted,
            skipped
        );
        Ok(SyncResult::success(inserted, skipped, items.len()))
    }
}
