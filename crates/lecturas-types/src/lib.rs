//! Record types for sensor readings moved from the source key-value store
//! into the relational store.
//!
//! The pipeline passes through three shapes:
//!
//! - [`RawSensorItem`]: a loosely-typed attribute map exactly as scanned
//! - [`NormalizedRow`]: fixed numeric types with defaults applied, ready for staging
//! - [`PersistedReading`]: a row read back from the permanent table
//!
//! [`normalize`] turns the first into the second, skipping (and reporting)
//! records that cannot be coerced.
//!
//! # Example
//!
//! ```
//! use lecturas_types::{RawSensorItem, normalize, fields};
//!
//! let item = RawSensorItem::new()
//!     .with_string(fields::READING_ID, "6f1c2b1e-3d4a-4b5c-8d9e-0f1a2b3c4d5e")
//!     .with_string(fields::DEVICE_ID, "esp32-01")
//!     .with_number(fields::TEMPERATURE, "22.5")
//!     .with_number(fields::TIMESTAMP, "1700000000");
//!
//! let normalized = normalize(&[item]);
//! assert_eq!(normalized.rows.len(), 1);
//! assert_eq!(normalized.rows[0].humidity, 0.0);
//! ```

pub mod error;
pub mod normalize;
pub mod raw;
pub mod types;

pub use error::{RecordError, RecordResult};
pub use normalize::{Normalized, SkippedRecord, limits, normalize, normalize_item};
pub use raw::{RawSensorItem, RawValue, fields};
pub use types::{NormalizedRow, PersistedReading};
