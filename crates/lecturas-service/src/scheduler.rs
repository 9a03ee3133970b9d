//! Recurring sync scheduler.
//!
//! Each tick spawns its own run, so the period does not stretch when a run
//! is slow. Overlap is handled by the [`Syncer`]'s single-flight guard.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::sync::{SyncResult, Syncer};

/// Drives [`Syncer::run_sync`] on a fixed period.
pub struct Scheduler {
    syncer: Arc<Syncer>,
    period: Duration,
    running: AtomicBool,
    /// Unix timestamp of the last start (0 = never).
    started_at: AtomicU64,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(syncer: Arc<Syncer>, period: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            syncer,
            period,
            running: AtomicBool::new(false),
            started_at: AtomicU64::new(0),
            stop_tx,
            task: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// When the periodic loop was last started.
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        let ts = self.started_at.load(Ordering::SeqCst);
        if ts == 0 {
            None
        } else {
            OffsetDateTime::from_unix_timestamp(ts as i64).ok()
        }
    }

    /// The eager run performed before the service accepts traffic.
    pub async fn run_initial(&self) -> SyncResult {
        info!("Running initial sync");
        self.syncer.run_sync().await
    }

    /// Spawn the periodic loop. The first tick fires one period from now.
    ///
    /// Returns `false` if the loop was already running.
    pub fn start(&self) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        let now = OffsetDateTime::now_utc().unix_timestamp() as u64;
        self.started_at.store(now, Ordering::SeqCst);
        self.stop_tx.send_replace(false);

        info!("Starting sync scheduler (every {}s)", self.period.as_secs());
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.syncer),
            self.period,
            self.stop_tx.subscribe(),
        ));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        true
    }

    /// Stop issuing triggers and wait for the loop to exit.
    ///
    /// Runs already spawned are left to finish on their own.
    pub async fn stop(&self) {
        self.stop_tx.send_replace(true);
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!("Scheduler task ended abnormally: {}", e);
        }
        self.running.store(false, Ordering::SeqCst);
        info!("Sync scheduler stopped");
    }
}

async fn run_loop(syncer: Arc<Syncer>, period: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let syncer = Arc::clone(&syncer);
                tokio::spawn(async move {
                    let result = syncer.run_sync().await;
                    debug!("Scheduled sync finished: {:?}", result.status);
                });
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }
}
