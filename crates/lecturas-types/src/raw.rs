//! Loosely-typed items as returned by the source store.

use std::collections::HashMap;

/// Attribute names used by the sensor firmware when writing items.
pub mod fields {
    /// Globally unique reading id (natural key).
    pub const READING_ID: &str = "id_lectura";
    /// Device that produced the reading.
    pub const DEVICE_ID: &str = "device_id";
    /// Temperature in degrees Celsius.
    pub const TEMPERATURE: &str = "temperatura";
    /// Relative humidity percentage.
    pub const HUMIDITY: &str = "humedad";
    /// Distance sensor value in centimetres.
    pub const DISTANCE_CM: &str = "distancia_cm";
    /// Light level percentage.
    pub const LIGHT_PCT: &str = "luz_porcentaje";
    /// Light state label (e.g. "on" / "off").
    pub const LIGHT_STATE: &str = "estado_luz";
    /// Unix epoch seconds at which the reading was taken.
    pub const TIMESTAMP: &str = "timestamp";
}

/// A single attribute value.
///
/// Numbers are kept in their textual form, the way the source store
/// transmits them, so no precision is lost before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// String attribute.
    String(String),
    /// Number attribute in decimal text form.
    Number(String),
    /// Boolean attribute.
    Bool(bool),
    /// Explicit null.
    Null,
    /// An attribute type the normalizer never interprets (lists, maps,
    /// sets, binary). Holds the type name for diagnostics.
    Other(&'static str),
}

impl RawValue {
    /// Textual content of string and number attributes.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::String(s) | RawValue::Number(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this value is an explicit null.
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// Short type name for log and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            RawValue::String(_) => "string",
            RawValue::Number(_) => "number",
            RawValue::Bool(_) => "bool",
            RawValue::Null => "null",
            RawValue::Other(name) => name,
        }
    }
}

/// One scanned item: attribute name to value.
///
/// No attribute is guaranteed to be present; the shape varies between
/// firmware versions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSensorItem {
    attributes: HashMap<String, RawValue>,
}

impl RawSensorItem {
    /// Create an empty item.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing attribute map.
    pub fn from_attributes(attributes: HashMap<String, RawValue>) -> Self {
        Self { attributes }
    }

    /// Look up an attribute, treating explicit nulls as absent.
    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.attributes.get(name).filter(|v| !v.is_null())
    }

    /// Insert or replace an attribute.
    pub fn insert(&mut self, name: impl Into<String>, value: RawValue) -> Option<RawValue> {
        self.attributes.insert(name.into(), value)
    }

    /// Builder-style string attribute.
    #[must_use]
    pub fn with_string(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, RawValue::String(value.into()));
        self
    }

    /// Builder-style number attribute.
    #[must_use]
    pub fn with_number(mut self, name: &str, value: impl ToString) -> Self {
        self.insert(name, RawValue::Number(value.to_string()));
        self
    }

    /// Number of attributes, including nulls.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the item has no attributes at all.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// The reading id as text, if present. Used for diagnostics.
    pub fn reading_id(&self) -> Option<&str> {
        self.get(fields::READING_ID).and_then(RawValue::as_text)
    }
}

impl FromIterator<(String, RawValue)> for RawSensorItem {
    fn from_iter<I: IntoIterator<Item = (String, RawValue)>>(iter: I) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}
