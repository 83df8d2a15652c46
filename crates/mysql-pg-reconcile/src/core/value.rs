//! Scalar value types flowing between stores.
//!
//! Rows fetched from a store are decoded from their text form into [`Value`]s
//! according to the declared [`ColumnKind`], and primary keys are kept as
//! [`KeyValue`]s so that key sets can be ordered and diffed.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::schema::ColumnKind;
use crate::error::{ReconcileError, Result};

/// Dynamically typed scalar read from a store.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Text value (also carries timestamps in their source formatting).
    Text(String),
}

impl Value {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Decode a text cell returned by a store into a value of the given kind.
    ///
    /// `None` is SQL NULL. Numeric kinds must parse; text kinds are kept verbatim.
    pub fn from_cell(cell: Option<&str>, kind: ColumnKind, column: &str) -> Result<Self> {
        let Some(raw) = cell else {
            return Ok(Value::Null);
        };

        match kind {
            ColumnKind::Integer => raw.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                ReconcileError::parse(
                    format!("column {}", column),
                    format!("expected an integer, got {:?}", raw),
                )
            }),
            ColumnKind::Float => raw.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                ReconcileError::parse(
                    format!("column {}", column),
                    format!("expected a number, got {:?}", raw),
                )
            }),
            ColumnKind::Text | ColumnKind::NullableText | ColumnKind::Timestamp => {
                Ok(Value::Text(raw.to_string()))
            }
        }
    }
}

impl Value {
    /// Text form of the value as a store would print it, `None` for NULL.
    pub fn to_cell(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Int(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::Text(v) => Some(v.clone()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A fetched row: column name to value, in select order.
pub type Row = IndexMap<String, Value>;

/// Primary key value.
///
/// Ordering is total: integers sort numerically and before all text keys,
/// text keys sort lexicographically. This keeps batch order reproducible
/// across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    /// Integer key.
    Int(i64),
    /// Text key.
    Text(String),
}

impl KeyValue {
    /// Parse a key cell according to the key column's kind.
    pub fn parse(raw: &str, kind: ColumnKind) -> Option<Self> {
        let trimmed = raw.trim();
        match kind {
            ColumnKind::Integer => trimmed.parse::<i64>().ok().map(KeyValue::Int),
            ColumnKind::Float => None,
            ColumnKind::Text | ColumnKind::NullableText | ColumnKind::Timestamp => {
                Some(KeyValue::Text(raw.to_string()))
            }
        }
    }

    /// Convert the key into a row value (for encoding).
    pub fn to_value(&self) -> Value {
        match self {
            KeyValue::Int(v) => Value::Int(*v),
            KeyValue::Text(v) => Value::Text(v.clone()),
        }
    }

    /// Extract a key from a row value.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(KeyValue::Int(*v)),
            Value::Text(v) => Some(KeyValue::Text(v.clone())),
            Value::Float(_) | Value::Null => None,
        }
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyValue::Int(a), KeyValue::Int(b)) => a.cmp(b),
            (KeyValue::Text(a), KeyValue::Text(b)) => a.cmp(b),
            (KeyValue::Int(_), KeyValue::Text(_)) => Ordering::Less,
            (KeyValue::Text(_), KeyValue::Int(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Text(v.to_string())
    }
}

/// Set of primary keys observed in one store.
pub type KeySet = BTreeSet<KeyValue>;
