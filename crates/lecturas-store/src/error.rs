//! Error types for lecturas-store.

use std::path::PathBuf;
use std::time::Duration;

/// Result type for lecturas-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in lecturas-store.
///
/// A failed merge has always been rolled back by the time one of these is
/// returned.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Error from the SQLite backend.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Error from the PostgreSQL backend (connection, statement, commit).
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A stored timestamp is outside the representable range.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    /// A stored reading id is not a UUID.
    #[error("Invalid reading id: {0}")]
    InvalidReadingId(String),

    /// A store operation did not finish in time.
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),
}
