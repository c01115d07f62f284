//! BigDecimal encodings
//!
//! Fixed modes store `Decimal(P, S)`: values are rounded to S fractional
//! digits (half away from zero) and rejected when the rounded mantissa has
//! more than P digits. The string mode stores the exact decimal text, scale
//! and trailing zeros included.

use crate::config::DecimalMode;
use crate::entity::{Decimal, Value};
use crate::sql::SqlValue;

use super::column::ColumnValue;
use super::{CodecError, CodecResult};

/// Scale used to compare string-encoded decimals
const STRING_COMPARE_SCALE: u32 = 30;

/// Encoding of BigDecimal values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalCodec {
    mode: DecimalMode,
}

impl DecimalCodec {
    pub fn new(mode: DecimalMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> DecimalMode {
        self.mode
    }

    fn to_decimal(value: &Value) -> CodecResult<Decimal> {
        match value {
            Value::BigDecimal(d) => Ok(d.clone()),
            Value::BigInt(i) => Ok(Decimal::from(i.clone())),
            Value::Int(i) => Ok(Decimal::from(i64::from(*i))),
            Value::Int8(i) => Ok(Decimal::from(*i)),
            Value::String(s) => s
                .parse()
                .map_err(|_| CodecError::Invalid(format!("'{}' is not a decimal", s))),
            other => Err(CodecError::type_mismatch("BigDecimal", other)),
        }
    }

    /// Round to the column scale and check the precision
    pub fn fit(&self, value: &Decimal) -> CodecResult<Decimal> {
        match self.mode.precision_scale() {
            Some((precision, scale)) => {
                let rounded = value.round_to_scale(scale);
                let digits = rounded.digits();
                if digits > precision {
                    return Err(CodecError::Overflow {
                        digits,
                        max_digits: precision,
                    });
                }
                Ok(rounded)
            }
            None => Ok(value.clone()),
        }
    }

    fn parse(text: &str) -> CodecResult<Decimal> {
        text.parse()
            .map_err(|_| CodecError::Invalid(format!("'{}' is not a decimal", text)))
    }
}

impl ColumnValue for DecimalCodec {
    fn column_type(&self) -> String {
        match self.mode.precision_scale() {
            Some((precision, scale)) => format!("Decimal({}, {})", precision, scale),
            None => "String".to_string(),
        }
    }

    fn encode_value(&self, value: &Value) -> CodecResult<SqlValue> {
        let fitted = self.fit(&Self::to_decimal(value)?)?;
        Ok(match self.mode {
            DecimalMode::String => SqlValue::String(fitted.to_string()),
            _ => SqlValue::Decimal(fitted),
        })
    }

    fn decode_value(&self, value: &SqlValue) -> CodecResult<Value> {
        match value {
            SqlValue::Decimal(d) => Ok(Value::BigDecimal(d.clone())),
            SqlValue::String(s) => Self::parse(s).map(Value::BigDecimal),
            other => Err(CodecError::Invalid(format!("unexpected {} for BigDecimal", other))),
        }
    }

    fn zero(&self) -> SqlValue {
        let zero = Decimal::from(0i64);
        match self.mode.precision_scale() {
            Some((_, scale)) => SqlValue::Decimal(zero.round_to_scale(scale)),
            None => SqlValue::String(zero.to_string()),
        }
    }

    fn to_json(&self, value: &Value) -> CodecResult<serde_json::Value> {
        let fitted = self.fit(&Self::to_decimal(value)?)?;
        Ok(serde_json::Value::String(fitted.to_string()))
    }

    fn from_json(&self, value: &serde_json::Value) -> CodecResult<Value> {
        match value {
            serde_json::Value::String(s) => Self::parse(s).map(Value::BigDecimal),
            other => Err(CodecError::Invalid(format!("unexpected JSON {} for BigDecimal", other))),
        }
    }

    fn json_type(&self) -> &'static str {
        "String"
    }

    fn json_param(&self, value: &Value) -> CodecResult<SqlValue> {
        let fitted = self.fit(&Self::to_decimal(value)?)?;
        Ok(SqlValue::String(fitted.to_string()))
    }

    fn json_convert(&self, var: &str) -> Option<String> {
        Some(match self.mode.precision_scale() {
            Some((precision, scale)) => format!("CAST({}, 'Nullable(Decimal({}, {}))')", var, precision, scale),
            None => var.to_string(),
        })
    }

    fn filter_expr(&self, column: &str) -> String {
        match self.mode {
            DecimalMode::String => format!("toDecimal256OrNull({}, {})", column, STRING_COMPARE_SCALE),
            _ => column.to_string(),
        }
    }

    fn filter_param(&self, value: &Value) -> CodecResult<SqlValue> {
        let decimal = Self::to_decimal(value)?;
        match self.mode {
            DecimalMode::String => Ok(SqlValue::Decimal(decimal.round_to_scale(STRING_COMPARE_SCALE))),
            _ => Ok(SqlValue::Decimal(self.fit(&decimal)?)),
        }
    }
}
