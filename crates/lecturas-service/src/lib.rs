//! Periodic sync of sensor readings from DynamoDB into PostgreSQL, with a
//! small read API for the dashboard.
//!
//! The service:
//! - Scans the whole source table on a fixed period (60s by default)
//! - Normalizes loosely-typed items into fixed-shape rows
//! - Merges them into the permanent table through a staging table, skipping
//!   readings that were already synced
//! - Serves the persisted readings over HTTP
//!
//! # HTTP Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/status` - Scheduler, storage and sync statistics
//! - `GET /api/lecturas` - Persisted readings, oldest first
//! - `GET|POST /sync-dynamo` - Run one sync now and report its outcome
//!
//! # Configuration
//!
//! The service reads `~/.config/lecturas/server.toml`, then the `DB_*` and
//! `DYNAMO_*` environment variables, then command-line flags:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:5001"
//! cors_origin = "http://localhost:3000"
//!
//! [database]
//! name = "sensores"
//! user = "sensores"
//! host = "localhost"
//! port = 5432
//!
//! [source]
//! table = "datos_sensores"
//! region = "us-east-1"
//!
//! [sync]
//! interval_secs = 60
//! ```

pub mod api;
pub mod config;
pub mod scheduler;
pub mod state;
pub mod sync;

#[cfg(test)]
mod testing;

pub use config::{
    Config, ConfigError, DatabaseConfig, ServerConfig, SourceConfig, StorageBackend,
    StorageConfig, SyncConfig,
};
pub use scheduler::Scheduler;
pub use state::AppState;
pub use sync::{SyncError, SyncResult, SyncStats, SyncStatus, Syncer};
