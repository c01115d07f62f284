//! BigInt encodings
//!
//! - native: `Int256`
//! - portable: `Tuple(Bool, Int8, UInt256)` holding (has value, sign,
//!   magnitude); null is `(false, 0, 0)`, so the column is never `Nullable`
//!
//! Both accept exactly the `Int256` range, so filters can compare the
//! decoded tuple as an `Int256` expression.

use num_bigint::{BigInt, BigUint, Sign};

use crate::entity::Value;
use crate::sql::SqlValue;

use super::column::ColumnValue;
use super::{CodecError, CodecResult};

/// Decimal digits of 2^255, the widest `Int256` magnitude
const MAX_DIGITS: u32 = 77;

/// Encoding of BigInt values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BigIntCodec {
    native: bool,
}

impl BigIntCodec {
    pub fn new(native: bool) -> Self {
        Self { native }
    }

    pub fn is_native(&self) -> bool {
        self.native
    }

    fn check_range(value: &BigInt) -> CodecResult<()> {
        let limit = BigUint::from(1u32) << 255usize;
        let magnitude = value.magnitude();
        let fits = match value.sign() {
            Sign::Minus => *magnitude <= limit,
            _ => *magnitude < limit,
        };
        if fits {
            Ok(())
        } else {
            Err(CodecError::Overflow {
                digits: magnitude.to_string().len() as u32,
                max_digits: MAX_DIGITS,
            })
        }
    }

    fn to_bigint(value: &Value) -> CodecResult<BigInt> {
        match value {
            Value::BigInt(i) => Ok(i.clone()),
            Value::Int(i) => Ok(BigInt::from(*i)),
            Value::Int8(i) => Ok(BigInt::from(*i)),
            Value::String(s) => s
                .parse()
                .map_err(|_| CodecError::Invalid(format!("'{}' is not an integer", s))),
            other => Err(CodecError::type_mismatch("BigInt", other)),
        }
    }
}

fn sign_code(sign: Sign) -> i8 {
    match sign {
        Sign::Minus => -1,
        Sign::NoSign => 0,
        Sign::Plus => 1,
    }
}

impl ColumnValue for BigIntCodec {
    fn column_type(&self) -> String {
        if self.native {
            "Int256".to_string()
        } else {
            "Tuple(Bool, Int8, UInt256)".to_string()
        }
    }

    fn encode_value(&self, value: &Value) -> CodecResult<SqlValue> {
        let int = Self::to_bigint(value)?;
        Self::check_range(&int)?;
        if self.native {
            return Ok(SqlValue::Int256(int));
        }
        Ok(SqlValue::Tuple(vec![
            SqlValue::Bool(true),
            SqlValue::Int8(sign_code(int.sign())),
            SqlValue::UInt256(int.magnitude().clone()),
        ]))
    }

    fn decode_value(&self, value: &SqlValue) -> CodecResult<Value> {
        let bad = || CodecError::Invalid(format!("unexpected {} for BigInt", value));
        match value {
            SqlValue::Int256(i) => Ok(Value::BigInt(i.clone())),
            SqlValue::String(s) => s.parse().map(Value::BigInt).map_err(|_| bad()),
            SqlValue::Tuple(parts) => match parts.as_slice() {
                [has_value, sign, SqlValue::UInt256(magnitude)] => {
                    if has_value.as_bool() != Some(true) {
                        return Ok(Value::Null);
                    }
                    let sign = match sign.as_i64().ok_or_else(bad)? {
                        s if s < 0 => Sign::Minus,
                        0 => Sign::NoSign,
                        _ => Sign::Plus,
                    };
                    Ok(Value::BigInt(BigInt::from_biguint(sign, magnitude.clone())))
                }
                _ => Err(bad()),
            },
            other => other.as_i64().map(|i| Value::BigInt(BigInt::from(i))).ok_or_else(bad),
        }
    }

    fn zero(&self) -> SqlValue {
        if self.native {
            SqlValue::Int256(BigInt::from(0))
        } else {
            SqlValue::Tuple(vec![
                SqlValue::Bool(true),
                SqlValue::Int8(0),
                SqlValue::UInt256(BigUint::from(0u32)),
            ])
        }
    }

    fn to_json(&self, value: &Value) -> CodecResult<serde_json::Value> {
        let int = Self::to_bigint(value)?;
        Self::check_range(&int)?;
        Ok(serde_json::Value::String(int.to_string()))
    }

    fn from_json(&self, value: &serde_json::Value) -> CodecResult<Value> {
        match value {
            serde_json::Value::String(s) => s
                .parse()
                .map(Value::BigInt)
                .map_err(|_| CodecError::Invalid(format!("'{}' is not an integer", s))),
            other => Err(CodecError::Invalid(format!("unexpected JSON {} for BigInt", other))),
        }
    }

    fn json_type(&self) -> &'static str {
        "String"
    }

    fn json_param(&self, value: &Value) -> CodecResult<SqlValue> {
        let int = Self::to_bigint(value)?;
        Ok(SqlValue::String(int.to_string()))
    }

    fn json_convert(&self, var: &str) -> Option<String> {
        Some(format!("toInt256OrNull({})", var))
    }

    fn wraps_nullable(&self) -> bool {
        self.native
    }

    fn null_value(&self) -> SqlValue {
        if self.native {
            SqlValue::Null
        } else {
            SqlValue::Tuple(vec![
                SqlValue::Bool(false),
                SqlValue::Int8(0),
                SqlValue::UInt256(BigUint::from(0u32)),
            ])
        }
    }

    fn is_null(&self, value: &SqlValue) -> bool {
        match value {
            SqlValue::Null => true,
            SqlValue::Tuple(parts) => parts.first().and_then(SqlValue::as_bool) == Some(false),
            _ => false,
        }
    }

    fn null_test(&self, column: &str, is_null: bool) -> String {
        match (self.native, is_null) {
            (true, true) => format!("{} IS NULL", column),
            (true, false) => format!("{} IS NOT NULL", column),
            (false, true) => format!("NOT tupleElement({}, 1)", column),
            (false, false) => format!("tupleElement({}, 1)", column),
        }
    }

    fn filter_expr(&self, column: &str) -> String {
        if self.native {
            return column.to_string();
        }
        format!(
            "if(tupleElement({c}, 1), if(tupleElement({c}, 2) < 0, -toInt256(tupleElement({c}, 3)), toInt256(tupleElement({c}, 3))), NULL)",
            c = column
        )
    }

    fn view_expr(&self, column: &str) -> Option<String> {
        if self.native {
            None
        } else {
            Some(self.filter_expr(column))
        }
    }

    fn filter_param(&self, value: &Value) -> CodecResult<SqlValue> {
        let int = Self::to_bigint(value)?;
        Self::check_range(&int)?;
        Ok(SqlValue::Int256(int))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn big(s: &str) -> Value {
        Value::BigInt(s.parse().unwrap())
    }

    #[test]
    fn test_tuple_round_trip() {
        let codec = BigIntCodec::new(false);
        for text in ["0", "-1", "123456789012345678901234567890"] {
            let encoded = codec.encode_value(&big(text)).unwrap();
            assert_eq!(codec.decode_value(&encoded).unwrap(), big(text));
        }
    }

    #[test]
    fn test_tuple_null() {
        let codec = BigIntCodec::new(false);
        assert!(codec.is_null(&codec.null_value()));
        assert_eq!(codec.decode_value(&codec.null_value()).unwrap(), Value::Null);
        assert!(!codec.wraps_nullable());
    }

    #[test]
    fn test_range_limits() {
        let codec = BigIntCodec::new(true);
        let max: BigInt = (BigInt::from(1) << 255usize) - 1;
        let min: BigInt = -(BigInt::from(1) << 255usize);
        assert!(codec.encode_value(&Value::BigInt(max.clone())).is_ok());
        assert!(codec.encode_value(&Value::BigInt(min.clone())).is_ok());
        let err = codec.encode_value(&Value::BigInt(max + 1)).unwrap_err();
        assert!(matches!(err, CodecError::Overflow { max_digits: 77, .. }));
        assert!(codec.encode_value(&Value::BigInt(min - 1)).is_err());
    }

    #[test]
    fn test_filter_expression_decodes_tuple() {
        let codec = BigIntCodec::new(false);
        let expr = codec.filter_expr("`amount`");
        assert!(expr.starts_with("if(tupleElement(`amount`, 1)"));
        assert_eq!(codec.null_test("`amount`", true), "NOT tupleElement(`amount`, 1)");
        assert_eq!(BigIntCodec::new(true).filter_expr("`amount`"), "`amount`");
    }

    #[test]
    fn test_json_form_is_text() {
        let codec = BigIntCodec::new(false);
        let json = codec.to_json(&big("-42")).unwrap();
        assert_eq!(json, serde_json::json!("-42"));
        assert_eq!(codec.from_json(&json).unwrap(), big("-42"));
    }
}
