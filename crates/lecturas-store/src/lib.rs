//! Durable storage for synced sensor readings.
//!
//! Every backend implements the same merge contract: a batch of
//! [`NormalizedRow`](lecturas_types::NormalizedRow)s is staged in a
//! transaction-scoped temporary table, then moved into the permanent table
//! skipping reading ids that already exist. The whole merge commits or
//! nothing does, and the returned count is exactly the number of new rows.
//!
//! # Example
//!
//! ```
//! use lecturas_store::{ReadingQuery, ReadingStore, SqliteStore};
//! use lecturas_types::NormalizedRow;
//!
//! # #[tokio::main]
//! # async fn main() -> lecturas_store::Result<()> {
//! let store = SqliteStore::open_in_memory()?;
//! let row = NormalizedRow {
//!     reading_id: "6f1c2b1e-3d4a-4b5c-8d9e-0f1a2b3c4d5e".to_string(),
//!     device_id: Some("esp32-01".to_string()),
//!     temperature: 22.5,
//!     humidity: 55.0,
//!     distance_cm: 10.0,
//!     light_pct: 80,
//!     light_state: Some("on".to_string()),
//!     timestamp: 1_700_000_000,
//! };
//!
//! assert_eq!(store.merge(&[row.clone()]).await?, 1);
//! assert_eq!(store.merge(&[row]).await?, 0);
//!
//! let readings = store.query_readings(&ReadingQuery::new()).await?;
//! assert_eq!(readings.len(), 1);
//! # Ok(())
//! # }
//! ```

mod error;
mod postgres;
mod queries;
mod schema;
mod sqlite;
mod traits;

pub use error::{Error, Result};
pub use postgres::{PgStore, PgStoreConfig};
pub use queries::ReadingQuery;
pub use sqlite::SqliteStore;
pub use traits::ReadingStore;

/// Default SQLite database path following platform conventions.
///
/// - Linux: `~/.local/share/lecturas/lecturas.db`
/// - macOS: `~/Library/Application Support/lecturas/lecturas.db`
/// - Windows: `C:\Users\<user>\AppData\Local\lecturas\lecturas.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("lecturas")
        .join("lecturas.db")
}
