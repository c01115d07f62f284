//! Statement parameters and result rows

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use num_bigint::{BigInt, BigUint};

use crate::entity::Decimal;

/// A value bound to a `?` placeholder or read from a result column
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int8(i8),
    Int32(i32),
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    String(String),
    Int256(BigInt),
    UInt256(BigUint),
    Decimal(Decimal),
    DateTime64(DateTime<Utc>),
    Array(Vec<SqlValue>),
    Tuple(Vec<SqlValue>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::Int8(v) => Some(*v != 0),
            SqlValue::UInt64(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Any integer variant that fits an i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int8(v) => Some(i64::from(*v)),
            SqlValue::Int32(v) => Some(i64::from(*v)),
            SqlValue::Int64(v) => Some(*v),
            SqlValue::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Any non-negative integer variant
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            SqlValue::UInt64(v) => Some(*v),
            other => other.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Int8(v) => write!(f, "{}", v),
            SqlValue::Int32(v) => write!(f, "{}", v),
            SqlValue::Int64(v) => write!(f, "{}", v),
            SqlValue::UInt64(v) => write!(f, "{}", v),
            SqlValue::Float64(v) => write!(f, "{}", v),
            SqlValue::String(s) => write!(f, "'{}'", s),
            SqlValue::Int256(v) => write!(f, "{}", v),
            SqlValue::UInt256(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::DateTime64(t) => write!(f, "'{}'", t.format("%Y-%m-%d %H:%M:%S%.6f")),
            SqlValue::Array(items) | SqlValue::Tuple(items) => {
                let open = if matches!(self, SqlValue::Array(_)) { '[' } else { '(' };
                let close = if open == '[' { ']' } else { ')' };
                write!(f, "{}", open)?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "{}", close)
            }
        }
    }
}

/// One result row; column names are shared by every row of a result
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Build a single row from column/value pairs
    pub fn from_pairs(pairs: Vec<(&str, SqlValue)>) -> Self {
        let (columns, values): (Vec<String>, Vec<SqlValue>) =
            pairs.into_iter().map(|(c, v)| (c.to_string(), v)).unzip();
        Self::new(Arc::new(columns), values)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Value of the named column
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Value at a position
    pub fn at(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }
}
