//! Source Store Client for the sensor key-value store.
//!
//! The source store only offers paginated scans: each page may carry a
//! continuation key that must be sent back to fetch the next one.
//! [`scan_all`] drives that loop to completion and hands back every item,
//! never a partial page.
//!
//! Implementations of [`SourceStore`]:
//!
//! - [`DynamoSource`]: the production DynamoDB table
//! - [`MockSource`]: in-memory pages with failure injection, for tests
//!
//! # Example
//!
//! ```
//! use lecturas_source::{MockSource, ScanOptions, scan_all};
//! use lecturas_types::{RawSensorItem, fields};
//!
//! # #[tokio::main]
//! # async fn main() -> lecturas_source::Result<()> {
//! let items: Vec<_> = (0..25)
//!     .map(|i| RawSensorItem::new().with_number(fields::TIMESTAMP, i))
//!     .collect();
//! let source = MockSource::from_items(items, 10);
//!
//! let all = scan_all(&source, &ScanOptions::default()).await?;
//! assert_eq!(all.len(), 25);
//! # Ok(())
//! # }
//! ```

pub mod dynamo;
pub mod error;
pub mod mock;
pub mod retry;
pub mod scan;
pub mod traits;

pub use dynamo::{DynamoSource, DynamoSourceConfig};
pub use error::{Error, Result};
pub use mock::MockSource;
pub use retry::{RetryConfig, with_retry};
pub use scan::{ScanOptions, scan_all};
pub use traits::{CursorValue, ScanCursor, ScanPage, SourceStore};
