//! Error types for record normalization.

use thiserror::Error;

/// Why a single source record could not be normalized.
///
/// A `RecordError` only ever excludes the offending record; the rest of the
/// batch proceeds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RecordError {
    /// A required attribute is absent (or explicitly null).
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// An attribute that must be numeric could not be coerced.
    #[error("field '{field}' is not a valid {expected}: {value}")]
    InvalidNumber {
        field: &'static str,
        expected: &'static str,
        value: String,
    },

    /// A numeric attribute does not fit the permanent table's column.
    #[error("field '{field}' is out of range: {value}")]
    OutOfRange { field: &'static str, value: String },

    /// The timestamp cannot be represented as a point in time.
    #[error("timestamp {0} is outside the supported range")]
    InvalidTimestamp(i64),

    /// A text attribute is longer than the permanent table's column.
    #[error("field '{field}' exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },

    /// The reading id is not a valid UUID.
    #[error("reading id '{0}' is not a valid UUID")]
    InvalidReadingId(String),
}

/// Result type alias for record normalization.
pub type RecordResult<T> = std::result::Result<T, RecordError>;
