//! Built-in scalar encodings (everything except BigInt and BigDecimal)

use chrono::{DateTime, TimeZone, Utc};

use crate::config::TimestampMode;
use crate::entity::Value;
use crate::schema::ScalarType;
use crate::sql::SqlValue;

use super::column::ColumnValue;
use super::{CodecError, CodecResult};

/// Encoding of one built-in scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarCodec {
    scalar: ScalarType,
    timestamp_mode: TimestampMode,
}

impl ScalarCodec {
    pub fn new(scalar: ScalarType, timestamp_mode: TimestampMode) -> Self {
        Self {
            scalar,
            timestamp_mode,
        }
    }

    pub fn scalar(&self) -> ScalarType {
        self.scalar
    }
}

/// Microseconds since the epoch to a UTC time
pub fn micros_to_datetime(micros: i64) -> Option<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

/// Drop sub-microsecond precision
pub fn truncate_to_micros(time: &DateTime<Utc>) -> CodecResult<DateTime<Utc>> {
    micros_to_datetime(time.timestamp_micros())
        .ok_or_else(|| CodecError::Invalid(format!("timestamp {} out of range", time)))
}

fn normalize_bytes(text: &str) -> CodecResult<String> {
    let hex = text
        .strip_prefix("0x")
        .ok_or_else(|| CodecError::Invalid(format!("bytes '{}' must start with 0x", text)))?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CodecError::Invalid(format!("bytes '{}' is not hex", text)));
    }
    Ok(text.to_ascii_lowercase())
}

impl ColumnValue for ScalarCodec {
    fn column_type(&self) -> String {
        match self.scalar {
            ScalarType::Id | ScalarType::String | ScalarType::Bytes => "String",
            ScalarType::Boolean => "Bool",
            ScalarType::Int => "Int32",
            ScalarType::Int8 => "Int64",
            ScalarType::Float => "Float64",
            ScalarType::Timestamp => match self.timestamp_mode {
                TimestampMode::EpochMicros => "Int64",
                TimestampMode::DateTime64 => "DateTime64(6, 'UTC')",
            },
            // Handled by their own codecs
            ScalarType::BigInt => "Int256",
            ScalarType::BigDecimal => "String",
        }
        .to_string()
    }

    fn encode_value(&self, value: &Value) -> CodecResult<SqlValue> {
        let mismatch = || CodecError::type_mismatch(self.scalar.name(), value);
        Ok(match (self.scalar, value) {
            (ScalarType::Id | ScalarType::String, Value::String(s)) => SqlValue::String(s.clone()),
            (ScalarType::Bytes, Value::Bytes(s) | Value::String(s)) => {
                SqlValue::String(normalize_bytes(s)?)
            }
            (ScalarType::Boolean, Value::Bool(b)) => SqlValue::Bool(*b),
            (ScalarType::Int, Value::Int(i)) => SqlValue::Int32(*i),
            (ScalarType::Int, Value::Int8(i)) => {
                SqlValue::Int32(i32::try_from(*i).map_err(|_| CodecError::Overflow {
                    digits: i.unsigned_abs().to_string().len() as u32,
                    max_digits: 10,
                })?)
            }
            (ScalarType::Int8, Value::Int8(i)) => SqlValue::Int64(*i),
            (ScalarType::Int8, Value::Int(i)) => SqlValue::Int64(i64::from(*i)),
            (ScalarType::Float, Value::Float(f)) => SqlValue::Float64(*f),
            (ScalarType::Float, Value::Int(i)) => SqlValue::Float64(f64::from(*i)),
            (ScalarType::Timestamp, Value::Timestamp(t)) => match self.timestamp_mode {
                TimestampMode::EpochMicros => SqlValue::Int64(t.timestamp_micros()),
                TimestampMode::DateTime64 => SqlValue::DateTime64(truncate_to_micros(t)?),
            },
            _ => return Err(mismatch()),
        })
    }

    fn decode_value(&self, value: &SqlValue) -> CodecResult<Value> {
        let bad = || CodecError::Invalid(format!("unexpected {} for {}", value, self.scalar.name()));
        Ok(match self.scalar {
            ScalarType::Id | ScalarType::String => Value::String(value.as_str().ok_or_else(bad)?.to_string()),
            ScalarType::Bytes => Value::Bytes(value.as_str().ok_or_else(bad)?.to_string()),
            ScalarType::Boolean => Value::Bool(value.as_bool().ok_or_else(bad)?),
            ScalarType::Int => {
                let v = value.as_i64().ok_or_else(bad)?;
                Value::Int(i32::try_from(v).map_err(|_| bad())?)
            }
            ScalarType::Int8 => Value::Int8(value.as_i64().ok_or_else(bad)?),
            ScalarType::Float => match value {
                SqlValue::Float64(f) => Value::Float(*f),
                other => Value::Float(other.as_i64().ok_or_else(bad)? as f64),
            },
            ScalarType::Timestamp => match value {
                SqlValue::DateTime64(t) => Value::Timestamp(*t),
                other => {
                    let micros = other.as_i64().ok_or_else(bad)?;
                    Value::Timestamp(micros_to_datetime(micros).ok_or_else(bad)?)
                }
            },
            ScalarType::BigInt | ScalarType::BigDecimal => return Err(bad()),
        })
    }

    fn zero(&self) -> SqlValue {
        match self.scalar {
            ScalarType::Boolean => SqlValue::Bool(false),
            ScalarType::Int => SqlValue::Int32(0),
            ScalarType::Int8 => SqlValue::Int64(0),
            ScalarType::Float => SqlValue::Float64(0.0),
            ScalarType::Timestamp => match self.timestamp_mode {
                TimestampMode::EpochMicros => SqlValue::Int64(0),
                TimestampMode::DateTime64 => SqlValue::DateTime64(DateTime::<Utc>::default()),
            },
            _ => SqlValue::String(String::new()),
        }
    }

    fn to_json(&self, value: &Value) -> CodecResult<serde_json::Value> {
        let encoded = self.encode_value(value)?;
        Ok(match encoded {
            SqlValue::String(s) => serde_json::Value::String(s),
            SqlValue::Bool(b) => serde_json::Value::Bool(b),
            SqlValue::Int32(i) => serde_json::Value::from(i),
            SqlValue::Int64(i) => serde_json::Value::from(i),
            SqlValue::Float64(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| CodecError::Invalid(format!("{} has no JSON form", f)))?,
            SqlValue::DateTime64(t) => serde_json::Value::from(t.timestamp_micros()),
            other => return Err(CodecError::Invalid(format!("{} has no JSON form", other))),
        })
    }

    fn from_json(&self, value: &serde_json::Value) -> CodecResult<Value> {
        let bad = || CodecError::Invalid(format!("unexpected JSON {} for {}", value, self.scalar.name()));
        let sql = match self.scalar {
            ScalarType::Id | ScalarType::String | ScalarType::Bytes => {
                SqlValue::String(value.as_str().ok_or_else(bad)?.to_string())
            }
            ScalarType::Boolean => SqlValue::Bool(value.as_bool().ok_or_else(bad)?),
            ScalarType::Int | ScalarType::Int8 | ScalarType::Timestamp => {
                SqlValue::Int64(value.as_i64().ok_or_else(bad)?)
            }
            ScalarType::Float => SqlValue::Float64(value.as_f64().ok_or_else(bad)?),
            ScalarType::BigInt | ScalarType::BigDecimal => return Err(bad()),
        };
        self.decode_value(&sql)
    }

    fn json_type(&self) -> &'static str {
        match self.scalar {
            ScalarType::Boolean => "Bool",
            ScalarType::Int => "Int32",
            ScalarType::Int8 | ScalarType::Timestamp => "Int64",
            ScalarType::Float => "Float64",
            _ => "String",
        }
    }

    fn json_param(&self, value: &Value) -> CodecResult<SqlValue> {
        Ok(match self.encode_value(value)? {
            SqlValue::DateTime64(t) => SqlValue::Int64(t.timestamp_micros()),
            other => other,
        })
    }

    fn json_convert(&self, var: &str) -> Option<String> {
        match self.scalar {
            ScalarType::Timestamp => Some(format!("fromUnixTimestamp64Micro({}, 'UTC')", var)),
            _ => None,
        }
    }

    fn view_expr(&self, column: &str) -> Option<String> {
        match (self.scalar, self.timestamp_mode) {
            (ScalarType::Timestamp, TimestampMode::EpochMicros) => {
                Some(format!("fromUnixTimestamp64Micro({}, 'UTC')", column))
            }
            _ => None,
        }
    }
}
