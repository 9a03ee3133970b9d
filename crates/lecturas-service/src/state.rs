//! Application state shared across handlers.

use std::sync::Arc;

use lecturas_source::SourceStore;
use lecturas_store::ReadingStore;

use crate::config::Config;
use crate::scheduler::Scheduler;
use crate::sync::Syncer;

/// Shared application state.
pub struct AppState {
    /// Durable store serving reads.
    pub store: Arc<dyn ReadingStore>,
    /// Orchestrator used by both the scheduler and manual triggers.
    pub syncer: Arc<Syncer>,
    pub scheduler: Scheduler,
    /// Effective configuration (file, environment and flags applied).
    pub config: Config,
}

impl AppState {
    /// Wire the orchestrator and scheduler from `config`.
    pub fn new(
        config: Config,
        source: Arc<dyn SourceStore>,
        store: Arc<dyn ReadingStore>,
    ) -> Arc<Self> {
        let syncer = Arc::new(
            Syncer::new(source, Arc::clone(&store))
                .with_scan_options(config.source.scan_options())
                .with_merge_timeout(config.sync.merge_timeout()),
        );
        let scheduler = Scheduler::new(Arc::clone(&syncer), config.sync.interval());

        Arc::new(Self {
            store,
            syncer,
            scheduler,
            config,
        })
    }
}
