use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ColumnType;
use crate::error::{Error, Result};

/// A single cell.
///
/// Variants are ordered so that `Value` can serve as a primary-key component:
/// `Null` sorts first, then values of the same kind compare naturally.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Converts a cell read from untyped JSON into the representation of
    /// `column_type`. Timestamps arrive as RFC 3339 text.
    pub fn coerce(self, column_type: ColumnType) -> Result<Self> {
        let mismatch = |value: &Value| Error::InvalidRow(format!("{value:?} is not a valid {column_type} value"));
        match (column_type, self) {
            (_, Value::Null) => Ok(Value::Null),
            (ColumnType::Timestamp, Value::Text(s)) => DateTime::parse_from_rfc3339(&s)
                .map(|ts| Value::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|_| mismatch(&Value::Text(s))),
            (ColumnType::Int, Value::UInt(v)) => i64::try_from(v)
                .map(Value::Int)
                .map_err(|_| mismatch(&Value::UInt(v))),
            (ColumnType::UInt, Value::Int(v)) => u64::try_from(v)
                .map(Value::UInt)
                .map_err(|_| mismatch(&Value::Int(v))),
            (ColumnType::Text | ColumnType::Set | ColumnType::Enum, v @ Value::Text(_))
            | (ColumnType::Int, v @ Value::Int(_))
            | (ColumnType::UInt, v @ Value::UInt(_))
            | (ColumnType::Bool, v @ Value::Bool(_))
            | (ColumnType::Timestamp, v @ Value::Timestamp(_)) => Ok(v),
            (_, v) => Err(mismatch(&v)),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// An ordered tuple of cells matching some table's columns.
pub type Row = Vec<Value>;
