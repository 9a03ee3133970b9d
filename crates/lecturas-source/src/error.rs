//! Error types for lecturas-source.
//!
//! Every variant means the source store could not be read: the sync run
//! that hit it aborts before anything reaches the durable store.
//!
//! | Error | Retried by [`crate::scan_all`] |
//! |-------|------------------------------|
//! | [`Error::Scan`] | when `retryable` (throttling, transport, 5xx) |
//! | [`Error::Timeout`] | yes |
//! | [`Error::StalledCursor`] | no |
//! | [`Error::InvalidConfig`] | no |

use std::time::Duration;

/// Result type for source operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while scanning the source store.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The scan request failed (transport, auth, throttling, missing table).
    #[error("Scan of table '{table}' failed: {message}")]
    Scan {
        table: String,
        message: String,
        retryable: bool,
    },

    /// A single page did not arrive in time.
    #[error("Scan page timed out after {0:?}")]
    Timeout(Duration),

    /// The store handed back the continuation key it was just given.
    #[error("Scan of table '{0}' returned a continuation key that does not advance")]
    StalledCursor(String),

    /// Source client configuration is unusable.
    #[error("Invalid source configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Scan { retryable, .. } => *retryable,
            Error::Timeout(_) => true,
            Error::StalledCursor(_) => false,
            Error::InvalidConfig(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(
            Error::Scan {
                table: "t".into(),
                message: "throttled".into(),
                retryable: true,
            }
            .is_retryable()
        );
        assert!(
            !Error::Scan {
                table: "t".into(),
                message: "access denied".into(),
                retryable: false,
            }
            .is_retryable()
        );
        assert!(Error::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!Error::StalledCursor("t".into()).is_retryable());
        assert!(!Error::InvalidConfig("x".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::Scan {
            table: "datos_sensores".into(),
            message: "ResourceNotFoundException".into(),
            retryable: false,
        };
        let display = err.to_string();
        assert!(display.contains("datos_sensores"));
        assert!(display.contains("ResourceNotFoundException"));
    }
}
