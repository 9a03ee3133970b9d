//! Fixed-shape reading types.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A reading coerced to fixed numeric types, ready for bulk staging.
///
/// The reading id is still the string form here; conversion to the
/// permanent store's identifier type happens when rows move out of staging.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NormalizedRow {
    /// Canonical (lowercase, hyphenated) reading id.
    pub reading_id: String,
    /// Producing device, passed through unchanged.
    pub device_id: Option<String>,
    /// Temperature in degrees Celsius (default 0.0).
    pub temperature: f64,
    /// Relative humidity percentage (default 0.0).
    pub humidity: f64,
    /// Distance in centimetres (default 0.0).
    pub distance_cm: f64,
    /// Light level percentage (default 0).
    pub light_pct: i32,
    /// Light state label, passed through unchanged.
    pub light_state: Option<String>,
    /// Unix epoch seconds.
    pub timestamp: i64,
}

/// A reading stored in the permanent table.
///
/// Serializes with the column names the dashboard consumes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PersistedReading {
    /// Primary key.
    #[cfg_attr(feature = "serde", serde(rename = "id_lectura"))]
    pub reading_id: Uuid,
    /// Producing device.
    pub device_id: Option<String>,
    /// Temperature in degrees Celsius, two decimals.
    #[cfg_attr(feature = "serde", serde(rename = "temperatura"))]
    pub temperature: f64,
    /// Relative humidity percentage, two decimals.
    #[cfg_attr(feature = "serde", serde(rename = "humedad"))]
    pub humidity: f64,
    /// Distance in centimetres, three decimals.
    #[cfg_attr(feature = "serde", serde(rename = "distancia_cm"))]
    pub distance_cm: f64,
    /// Light level percentage.
    #[cfg_attr(feature = "serde", serde(rename = "luz_porcentaje"))]
    pub light_pct: i32,
    /// Light state label.
    #[cfg_attr(feature = "serde", serde(rename = "estado_luz"))]
    pub light_state: Option<String>,
    /// When the reading was taken.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "timestamp_lectura", with = "time::serde::rfc3339")
    )]
    pub recorded_at: OffsetDateTime,
}

impl PersistedReading {
    /// The reading time as Unix epoch seconds.
    pub fn unix_timestamp(&self) -> i64 {
        self.recorded_at.unix_timestamp()
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_persisted_reading_uses_dashboard_column_names() {
        let reading = PersistedReading {
            reading_id: Uuid::nil(),
            device_id: Some("d1".to_string()),
            temperature: 22.5,
            humidity: 55.0,
            distance_cm: 10.0,
            light_pct: 80,
            light_state: Some("on".to_string()),
            recorded_at: datetime!(2023-11-14 22:13:20 UTC),
        };

        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["id_lectura"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["temperatura"], 22.5);
        assert_eq!(json["humedad"], 55.0);
        assert_eq!(json["distancia_cm"], 10.0);
        assert_eq!(json["luz_porcentaje"], 80);
        assert_eq!(json["estado_luz"], "on");
        assert_eq!(json["timestamp_lectura"], "2023-11-14T22:13:20Z");
        assert_eq!(reading.unix_timestamp(), 1_700_000_000);
    }
}
