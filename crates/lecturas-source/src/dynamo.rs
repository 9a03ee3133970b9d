//! DynamoDB-backed source store.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::scan::ScanError;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use tracing::debug;

use lecturas_types::{RawSensorItem, RawValue};

use crate::error::{Error, Result};
use crate::traits::{CursorValue, ScanCursor, ScanPage, SourceStore};

/// Connection settings for [`DynamoSource`].
#[derive(Debug, Clone)]
pub struct DynamoSourceConfig {
    /// Table holding the sensor items.
    pub table: String,
    /// AWS region.
    pub region: String,
    /// Endpoint override, e.g. a local DynamoDB.
    pub endpoint_url: Option<String>,
    /// Items per page; `None` lets the service decide (1 MB pages).
    pub page_size: Option<i32>,
}

impl Default for DynamoSourceConfig {
    fn default() -> Self {
        Self {
            table: "datos_sensores".to_string(),
            region: "us-east-1".to_string(),
            endpoint_url: None,
            page_size: None,
        }
    }
}

/// Reads sensor items from a DynamoDB table with `Scan`.
///
/// Credentials come from the standard AWS provider chain.
#[derive(Debug, Clone)]
pub struct DynamoSource {
    client: Client,
    table: String,
    page_size: Option<i32>,
}

impl DynamoSource {
    /// Build a client from the environment's AWS configuration.
    #[tracing::instrument(level = "debug", skip(config), fields(table = %config.table))]
    pub async fn connect(config: &DynamoSourceConfig) -> Result<Self> {
        if config.table.trim().is_empty() {
            return Err(Error::InvalidConfig("table name is empty".to_string()));
        }
        if config.page_size.is_some_and(|n| n < 1) {
            return Err(Error::InvalidConfig(
                "page_size must be at least 1".to_string(),
            ));
        }

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        Ok(Self::from_client(
            Client::new(&shared),
            &config.table,
            config.page_size,
        ))
    }

    /// Wrap an already configured client.
    pub fn from_client(client: Client, table: &str, page_size: Option<i32>) -> Self {
        Self {
            client,
            table: table.to_string(),
            page_size,
        }
    }

    fn scan_error(&self, err: SdkError<ScanError>) -> Error {
        let retryable = match &err {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
                true
            }
            SdkError::ServiceError(service) => {
                let e = service.err();
                e.is_provisioned_throughput_exceeded_exception()
                    || e.is_request_limit_exceeded()
                    || e.is_internal_server_error()
            }
            _ => false,
        };
        Error::Scan {
            table: self.table.clone(),
            message: DisplayErrorContext(&err).to_string(),
            retryable,
        }
    }

    fn cursor_from_key(&self, key: HashMap<String, AttributeValue>) -> Result<ScanCursor> {
        key.into_iter()
            .map(|(name, value)| {
                let value = match value {
                    AttributeValue::S(s) => CursorValue::S(s),
                    AttributeValue::N(n) => CursorValue::N(n),
                    AttributeValue::B(b) => CursorValue::B(b.into_inner()),
                    other => {
                        return Err(Error::Scan {
                            table: self.table.clone(),
                            message: format!("unsupported key attribute type for '{name}': {other:?}"),
                            retryable: false,
                        });
                    }
                };
                Ok((name, value))
            })
            .collect()
    }
}

fn key_from_cursor(cursor: &ScanCursor) -> HashMap<String, AttributeValue> {
    cursor
        .iter()
        .map(|(name, value)| {
            let value = match value {
                CursorValue::S(s) => AttributeValue::S(s.clone()),
                CursorValue::N(n) => AttributeValue::N(n.clone()),
                CursorValue::B(b) => AttributeValue::B(Blob::new(b.clone())),
            };
            (name.clone(), value)
        })
        .collect()
}

/// Map a DynamoDB attribute onto the loosely-typed item model.
fn raw_value(value: AttributeValue) -> RawValue {
    match value {
        AttributeValue::S(s) => RawValue::String(s),
        AttributeValue::N(n) => RawValue::Number(n),
        AttributeValue::Bool(b) => RawValue::Bool(b),
        AttributeValue::Null(_) => RawValue::Null,
        AttributeValue::B(_) => RawValue::Other("binary"),
        AttributeValue::L(_) => RawValue::Other("list"),
        AttributeValue::M(_) => RawValue::Other("map"),
        AttributeValue::Ss(_) => RawValue::Other("string set"),
        AttributeValue::Ns(_) => RawValue::Other("number set"),
        AttributeValue::Bs(_) => RawValue::Other("binary set"),
        _ => RawValue::Other("unknown"),
    }
}

fn raw_item(item: HashMap<String, AttributeValue>) -> RawSensorItem {
    item.into_iter()
        .map(|(name, value)| (name, raw_value(value)))
        .collect()
}

#[async_trait]
impl SourceStore for DynamoSource {
    fn table(&self) -> &str {
        &self.table
    }

    async fn scan_page(&self, start: Option<&ScanCursor>) -> Result<ScanPage> {
        let output = self
            .client
            .scan()
            .table_name(&self.table)
            .set_exclusive_start_key(start.map(key_from_cursor))
            .set_limit(self.page_size)
            .send()
            .await
            .map_err(|e| self.scan_error(e))?;

        let items: Vec<RawSensorItem> = output
            .items
            .unwrap_or_default()
            .into_iter()
            .map(raw_item)
            .collect();
        let next = output
            .last_evaluated_key
            .filter(|key| !key.is_empty())
            .map(|key| self.cursor_from_key(key))
            .transpose()?;

        debug!(
            "DynamoDB scan of '{}' returned {} items (more: {})",
            self.table,
            items.len(),
            next.is_some()
        );
        Ok(ScanPage { items, next })
    }
}
