//! The decoded payload value model.
//!
//! A command's payload decodes to either a flat set of named fields or an
//! array of such sets — the "payload polymorphism" most of this protocol's
//! codes exhibit when a device reports more than one zone/channel in a
//! single frame. Modelling this as a two-variant enum keeps dispatch a
//! `match` rather than a runtime type check.
//! for.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A single decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A decoded boolean, or `null` if the field was the tri-state-absent
    /// sentinel.
    Bool(bool),
    /// A decoded integer (indices, counts, raw bytes kept as ints).
    Int(i64),
    /// A decoded floating-point reading (temperature, percentage).
    Float(f64),
    /// A decoded string (names, version strings).
    Str(String),
    /// A decoded timestamp.
    DateTime(DateTime<Utc>),
    /// A decoded calendar date.
    Date(NaiveDate),
    /// A nested map, used by array-element entries and compound fields.
    Map(BTreeMap<String, Value>),
    /// A list of device ids or nested values (e.g. `000C`'s actuator list).
    List(Vec<Value>),
    /// An explicit absent/sentinel reading.
    Null,
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::Str(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Value {
        Value::DateTime(v)
    }
}

impl From<Option<bool>> for Value {
    fn from(v: Option<bool>) -> Value {
        v.map(Value::Bool).unwrap_or(Value::Null)
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Value {
        v.map(Value::Float).unwrap_or(Value::Null)
    }
}

impl From<Option<String>> for Value {
    fn from(v: Option<String>) -> Value {
        v.map(Value::Str).unwrap_or(Value::Null)
    }
}

/// A flat map of decoded field name to value, the unit a single
/// non-array payload (or one element of an array payload) decodes to.
pub type Fields = BTreeMap<String, Value>;

/// A decoded payload: either one set of fields, or an array of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// A single flat record.
    Map(Fields),
    /// Several records sharing one frame (e.g. one entry per zone).
    Array(Vec<Fields>),
}

impl Payload {
    /// A convenience constructor for the common single-record case.
    pub fn map(fields: Fields) -> Payload {
        Payload::Map(fields)
    }

    /// Returns the fields of a `Map` payload, or `None` for an `Array`.
    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Payload::Map(fields) => Some(fields),
            Payload::Array(_) => None,
        }
    }

    /// Returns the records of an `Array` payload, or `None` for a `Map`.
    pub fn as_array(&self) -> Option<&[Fields]> {
        match self {
            Payload::Array(records) => Some(records),
            Payload::Map(_) => None,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "<undisplayable payload>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_accessors_discriminate_variants() {
        let mut fields = Fields::new();
        fields.insert("zone_idx".to_owned(), Value::Str("00".to_owned()));
        let payload = Payload::map(fields);
        assert!(payload.as_map().is_some());
        assert!(payload.as_array().is_none());
    }

    #[test]
    fn array_accessors_discriminate_variants() {
        let payload = Payload::Array(vec![Fields::new(), Fields::new()]);
        assert!(payload.as_array().is_some());
        assert!(payload.as_map().is_none());
    }

    #[test]
    fn serializes_to_json() {
        let mut fields = Fields::new();
        fields.insert("battery_level".to_owned(), Value::Float(0.5));
        let payload = Payload::map(fields);
        assert_eq!(payload.to_string(), r#"{"battery_level":0.5}"#);
    }
}
