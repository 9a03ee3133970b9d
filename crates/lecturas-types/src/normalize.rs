//! Record Normalizer: raw items to fixed-shape rows.
//!
//! Missing optional numerics fall back to zero. The reading id and the
//! timestamp are required; a record without them (or with values that
//! cannot be coerced) is skipped on its own and reported in
//! [`Normalized::skipped`], never failing the batch.
//!
//! Values are also checked against the permanent table's column limits, so
//! a single out-of-range record cannot make the whole merge fail.

use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::error::{RecordError, RecordResult};
use crate::raw::{RawSensorItem, RawValue, fields};
use crate::types::NormalizedRow;

/// Column limits of the permanent table.
pub mod limits {
    /// `NUMERIC(5, 2)`: temperature and humidity.
    pub const MAX_ABS_2DP: f64 = 1_000.0;
    /// `NUMERIC(10, 3)`: distance.
    pub const MAX_ABS_3DP: f64 = 10_000_000.0;
    /// `VARCHAR(50)`: device id.
    pub const DEVICE_ID_LEN: usize = 50;
    /// `VARCHAR(20)`: light state.
    pub const LIGHT_STATE_LEN: usize = 20;
    /// 0001-01-01T00:00:00Z.
    pub const MIN_TIMESTAMP: i64 = -62_135_596_800;
    /// 9999-12-31T23:59:59Z.
    pub const MAX_TIMESTAMP: i64 = 253_402_300_799;
}

/// A record excluded from the normalized output.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    /// The raw reading id, when one was present.
    pub reading_id: Option<String>,
    /// Why the record was skipped.
    pub error: RecordError,
}

/// Output of [`normalize`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    /// Rows that coerced successfully, in input order.
    pub rows: Vec<NormalizedRow>,
    /// Records that were dropped.
    pub skipped: Vec<SkippedRecord>,
}

/// Normalize a batch of scanned items.
pub fn normalize(items: &[RawSensorItem]) -> Normalized {
    let mut out = Normalized {
        rows: Vec::with_capacity(items.len()),
        skipped: Vec::new(),
    };

    for item in items {
        match normalize_item(item) {
            Ok(row) => out.rows.push(row),
            Err(error) => {
                let reading_id = item.reading_id().map(str::to_string);
                warn!(
                    "Skipping malformed record {}: {}",
                    reading_id.as_deref().unwrap_or("<no id>"),
                    error
                );
                out.skipped.push(SkippedRecord { reading_id, error });
            }
        }
    }

    out
}

/// Normalize one item.
pub fn normalize_item(item: &RawSensorItem) -> RecordResult<NormalizedRow> {
    Ok(NormalizedRow {
        reading_id: reading_id(item)?,
        device_id: bounded_text(item, fields::DEVICE_ID, limits::DEVICE_ID_LEN)?,
        temperature: scaled_f64(item, fields::TEMPERATURE, 2, limits::MAX_ABS_2DP)?,
        humidity: scaled_f64(item, fields::HUMIDITY, 2, limits::MAX_ABS_2DP)?,
        distance_cm: scaled_f64(item, fields::DISTANCE_CM, 3, limits::MAX_ABS_3DP)?,
        light_pct: optional_i32(item, fields::LIGHT_PCT)?,
        light_state: bounded_text(item, fields::LIGHT_STATE, limits::LIGHT_STATE_LEN)?,
        timestamp: timestamp(item)?,
    })
}

fn reading_id(item: &RawSensorItem) -> RecordResult<String> {
    let value = item
        .get(fields::READING_ID)
        .ok_or(RecordError::MissingField(fields::READING_ID))?;
    let text = value
        .as_text()
        .ok_or_else(|| RecordError::InvalidReadingId(value.type_name().to_string()))?;

    Uuid::parse_str(text.trim())
        .map(|id| id.hyphenated().to_string())
        .map_err(|_| RecordError::InvalidReadingId(text.to_string()))
}

fn passthrough_text(item: &RawSensorItem, field: &str) -> Option<String> {
    match item.get(field)? {
        RawValue::String(s) | RawValue::Number(s) => Some(s.clone()),
        RawValue::Bool(b) => Some(b.to_string()),
        RawValue::Null | RawValue::Other(_) => None,
    }
}

fn bounded_text(
    item: &RawSensorItem,
    field: &'static str,
    max: usize,
) -> RecordResult<Option<String>> {
    match passthrough_text(item, field) {
        Some(text) if text.chars().count() > max => Err(RecordError::TooLong { field, max }),
        other => Ok(other),
    }
}

/// An optional decimal that must still fit its column once rounded to
/// `scale` places.
fn scaled_f64(
    item: &RawSensorItem,
    field: &'static str,
    scale: i32,
    max_abs: f64,
) -> RecordResult<f64> {
    let Some(value) = item.get(field) else {
        return Ok(0.0);
    };
    let v = parse_f64(value, field)?;
    let factor = 10f64.powi(scale);
    if ((v * factor).round() / factor).abs() >= max_abs {
        return Err(RecordError::OutOfRange {
            field,
            value: v.to_string(),
        });
    }
    Ok(v)
}

fn optional_i32(item: &RawSensorItem, field: &'static str) -> RecordResult<i32> {
    let Some(value) = item.get(field) else {
        return Ok(0);
    };
    let wide = parse_i64(value, field, "integer")?;
    i32::try_from(wide).map_err(|_| invalid(field, "integer", value))
}

/// Unix seconds that decode back into a point in time on every backend.
fn timestamp(item: &RawSensorItem) -> RecordResult<i64> {
    let field = fields::TIMESTAMP;
    let value = item.get(field).ok_or(RecordError::MissingField(field))?;
    let ts = parse_i64(value, field, "Unix timestamp")?;

    if !(limits::MIN_TIMESTAMP..=limits::MAX_TIMESTAMP).contains(&ts)
        || OffsetDateTime::from_unix_timestamp(ts).is_err()
    {
        return Err(RecordError::InvalidTimestamp(ts));
    }
    Ok(ts)
}

fn parse_f64(value: &RawValue, field: &'static str) -> RecordResult<f64> {
    value
        .as_text()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(field, "decimal", value))
}

/// Integers accept a decimal form and truncate toward zero.
fn parse_i64(value: &RawValue, field: &'static str, expected: &'static str) -> RecordResult<i64> {
    let text = value
        .as_text()
        .map(str::trim)
        .ok_or_else(|| invalid(field, expected, value))?;

    if let Ok(v) = text.parse::<i64>() {
        return Ok(v);
    }

    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(f64::trunc)
        .filter(|v| *v >= i64::MIN as f64 && *v < i64::MAX as f64)
        .map(|v| v as i64)
        .ok_or_else(|| invalid(field, expected, value))
}

fn invalid(field: &'static str, expected: &'static str, value: &RawValue) -> RecordError {
    RecordError::InvalidNumber {
        field,
        expected,
        value: value
            .as_text()
            .map(str::to_string)
            .unwrap_or_else(|| value.type_name().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID_1: &str = "6f1c2b1e-3d4a-4b5c-8d9e-0f1a2b3c4d5e";
    const ID_2: &str = "0b7e7c6a-1f2d-4e3c-9a8b-7c6d5e4f3a2b";

    fn full_item(id: &str) -> RawSensorItem {
        RawSensorItem::new()
            .with_string(fields::READING_ID, id)
            .with_string(fields::DEVICE_ID, "d1")
            .with_number(fields::TEMPERATURE, "22.5")
            .with_number(fields::HUMIDITY, "55")
            .with_number(fields::DISTANCE_CM, "10.125")
            .with_number(fields::LIGHT_PCT, "80")
            .with_string(fields::LIGHT_STATE, "on")
            .with_number(fields::TIMESTAMP, "1700000000")
    }

    #[test]
    fn test_normalize_full_item() {
        let row = normalize_item(&full_item(ID_1)).unwrap();

        assert_eq!(row.reading_id, ID_1);
        assert_eq!(row.device_id.as_deref(), Some("d1"));
        assert_eq!(row.temperature, 22.5);
        assert_eq!(row.humidity, 55.0);
        assert_eq!(row.distance_cm, 10.125);
        assert_eq!(row.light_pct, 80);
        assert_eq!(row.light_state.as_deref(), Some("on"));
        assert_eq!(row.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_missing_humidity_and_light_default_to_zero() {
        let item = RawSensorItem::new()
            .with_string(fields::READING_ID, ID_1)
            .with_string(fields::DEVICE_ID, "d1")
            .with_number(fields::TEMPERATURE, "22.5")
            .with_number(fields::DISTANCE_CM, "10.125")
            .with_string(fields::LIGHT_STATE, "on")
            .with_number(fields::TIMESTAMP, "1700000000");

        let row = normalize_item(&item).unwrap();
        assert_eq!(row.humidity, 0.0);
        assert_eq!(row.light_pct, 0);
        // Everything else is untouched.
        assert_eq!(row.device_id.as_deref(), Some("d1"));
        assert_eq!(row.temperature, 22.5);
        assert_eq!(row.distance_cm, 10.125);
        assert_eq!(row.light_state.as_deref(), Some("on"));
        assert_eq!(row.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_null_optional_counts_as_missing() {
        let mut item = full_item(ID_1);
        item.insert(fields::HUMIDITY, RawValue::Null);
        assert_eq!(normalize_item(&item).unwrap().humidity, 0.0);
    }

    #[test]
    fn test_minimal_item() {
        let item = RawSensorItem::new()
            .with_string(fields::READING_ID, ID_2)
            .with_number(fields::TIMESTAMP, 1700000060);

        let row = normalize_item(&item).unwrap();
        assert_eq!(row.temperature, 0.0);
        assert_eq!(row.humidity, 0.0);
        assert_eq!(row.distance_cm, 0.0);
        assert_eq!(row.light_pct, 0);
        assert!(row.device_id.is_none());
        assert!(row.light_state.is_none());
    }

    #[test]
    fn test_missing_timestamp_is_malformed() {
        let item = RawSensorItem::new().with_string(fields::READING_ID, ID_1);
        assert_eq!(
            normalize_item(&item),
            Err(RecordError::MissingField(fields::TIMESTAMP))
        );
    }

    #[test]
    fn test_non_numeric_timestamp_is_malformed() {
        let item = RawSensorItem::new()
            .with_string(fields::READING_ID, ID_1)
            .with_string(fields::TIMESTAMP, "yesterday");

        let err = normalize_item(&item).unwrap_err();
        assert!(matches!(
            err,
            RecordError::InvalidNumber {
                field: fields::TIMESTAMP,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_reading_id_is_malformed() {
        let item = RawSensorItem::new().with_number(fields::TIMESTAMP, 1);
        assert_eq!(
            normalize_item(&item),
            Err(RecordError::MissingField(fields::READING_ID))
        );
    }

    #[test]
    fn test_invalid_reading_id_is_malformed() {
        let item = RawSensorItem::new()
            .with_string(fields::READING_ID, "a1")
            .with_number(fields::TIMESTAMP, 1);
        assert_eq!(
            normalize_item(&item),
            Err(RecordError::InvalidReadingId("a1".to_string()))
        );
    }

    #[test]
    fn test_reading_id_is_canonicalised() {
        let item = RawSensorItem::new()
            .with_string(fields::READING_ID, ID_1.to_uppercase())
            .with_number(fields::TIMESTAMP, 1);
        assert_eq!(normalize_item(&item).unwrap().reading_id, ID_1);
    }

    #[test]
    fn test_integer_fields_truncate_decimals() {
        let item = RawSensorItem::new()
            .with_string(fields::READING_ID, ID_1)
            .with_number(fields::LIGHT_PCT, "80.7")
            .with_number(fields::TIMESTAMP, "1700000000.9");

        let row = normalize_item(&item).unwrap();
        assert_eq!(row.light_pct, 80);
        assert_eq!(row.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_numeric_strings_are_accepted() {
        let item = RawSensorItem::new()
            .with_string(fields::READING_ID, ID_1)
            .with_string(fields::TEMPERATURE, " 19.25 ")
            .with_string(fields::TIMESTAMP, "1700000000");

        let row = normalize_item(&item).unwrap();
        assert_eq!(row.temperature, 19.25);
    }

    #[test]
    fn test_bad_optional_numeric_is_malformed() {
        let mut item = full_item(ID_1);
        item.insert(fields::HUMIDITY, RawValue::Bool(true));
        assert!(matches!(
            normalize_item(&item),
            Err(RecordError::InvalidNumber {
                field: fields::HUMIDITY,
                ..
            })
        ));

        let mut item = full_item(ID_1);
        item.insert(fields::TEMPERATURE, RawValue::Number("NaN".to_string()));
        assert!(normalize_item(&item).is_err());
    }

    #[test]
    fn test_light_pct_out_of_range() {
        let item = full_item(ID_1).with_number(fields::LIGHT_PCT, "99999999999");
        assert!(matches!(
            normalize_item(&item),
            Err(RecordError::InvalidNumber {
                field: fields::LIGHT_PCT,
                ..
            })
        ));
    }

    #[test]
    fn test_millisecond_timestamp_is_malformed() {
        let item = full_item(ID_1).with_number(fields::TIMESTAMP, "1700000000000");
        assert_eq!(
            normalize_item(&item),
            Err(RecordError::InvalidTimestamp(1_700_000_000_000))
        );
    }

    #[test]
    fn test_timestamp_bounds() {
        let at = |ts: i64| normalize_item(&full_item(ID_1).with_number(fields::TIMESTAMP, ts));

        assert!(at(limits::MIN_TIMESTAMP).is_ok());
        assert!(at(limits::MAX_TIMESTAMP).is_ok());
        assert_eq!(
            at(limits::MAX_TIMESTAMP + 1),
            Err(RecordError::InvalidTimestamp(limits::MAX_TIMESTAMP + 1))
        );
        assert_eq!(
            at(limits::MIN_TIMESTAMP - 1),
            Err(RecordError::InvalidTimestamp(limits::MIN_TIMESTAMP - 1))
        );
    }

    #[test]
    fn test_decimal_beyond_column_precision_is_malformed() {
        let item = full_item(ID_1).with_number(fields::TEMPERATURE, "1000");
        assert!(matches!(
            normalize_item(&item),
            Err(RecordError::OutOfRange {
                field: fields::TEMPERATURE,
                ..
            })
        ));

        // Rounds up to 1000.00, which NUMERIC(5, 2) cannot hold.
        let item = full_item(ID_1).with_number(fields::HUMIDITY, "-999.996");
        assert!(matches!(
            normalize_item(&item),
            Err(RecordError::OutOfRange {
                field: fields::HUMIDITY,
                ..
            })
        ));

        let item = full_item(ID_1).with_number(fields::DISTANCE_CM, "10000000");
        assert!(normalize_item(&item).is_err());

        let item = full_item(ID_1)
            .with_number(fields::TEMPERATURE, "999.99")
            .with_number(fields::DISTANCE_CM, "9999999.999");
        assert!(normalize_item(&item).is_ok());
    }

    #[test]
    fn test_text_beyond_column_length_is_malformed() {
        let item = full_item(ID_1).with_string(fields::DEVICE_ID, "d".repeat(51));
        assert_eq!(
            normalize_item(&item),
            Err(RecordError::TooLong {
                field: fields::DEVICE_ID,
                max: limits::DEVICE_ID_LEN,
            })
        );

        let item = full_item(ID_1).with_string(fields::LIGHT_STATE, "ñ".repeat(20));
        assert!(normalize_item(&item).is_ok());
        let item = full_item(ID_1).with_string(fields::LIGHT_STATE, "x".repeat(21));
        assert!(normalize_item(&item).is_err());
    }

    #[test]
    fn test_integer_at_i64_limit_is_rejected() {
        let value = RawValue::Number("9223372036854775808.0".to_string());
        assert!(parse_i64(&value, fields::LIGHT_PCT, "integer").is_err());
    }

    #[test]
    fn test_out_of_range_record_keeps_siblings() {
        let hot = full_item(ID_2).with_number(fields::TEMPERATURE, "1000");
        let out = normalize(&[full_item(ID_1), hot]);

        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].reading_id, ID_1);
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].reading_id.as_deref(), Some(ID_2));
    }

    #[test]
    fn test_batch_skips_only_bad_records() {
        let bad = RawSensorItem::new()
            .with_string(fields::READING_ID, ID_2)
            .with_string(fields::DEVICE_ID, "d1");
        let items = vec![full_item(ID_1), bad];

        let out = normalize(&items);
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].reading_id, ID_1);
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].reading_id.as_deref(), Some(ID_2));
        assert_eq!(
            out.skipped[0].error,
            RecordError::MissingField(fields::TIMESTAMP)
        );
    }

    #[test]
    fn test_duplicates_pass_through() {
        let items = vec![full_item(ID_1), full_item(ID_1)];
        let out = normalize(&items);
        assert_eq!(out.rows.len(), 2);
        assert!(out.skipped.is_empty());
    }

    #[test]
    fn test_normalize_empty() {
        let out = normalize(&[]);
        assert!(out.rows.is_empty());
        assert!(out.skipped.is_empty());
    }
}
