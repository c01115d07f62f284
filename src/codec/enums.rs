//! Enum encoding
//!
//! Declaration order is the encoding order: the first value is 1. Up to 127
//! values fit `Enum8`, larger enums use `Enum16`.

use crate::entity::Value;
use crate::sql::{quote_str, SqlValue};

use super::column::ColumnValue;
use super::{CodecError, CodecResult};

const ENUM8_MAX: usize = 127;

/// Encoding of one enum type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumCodec {
    name: String,
    values: Vec<String>,
}

impl EnumCodec {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    fn check(&self, label: &str) -> CodecResult<()> {
        if self.values.iter().any(|v| v == label) {
            Ok(())
        } else {
            Err(CodecError::Invalid(format!("'{}' is not a value of {}", label, self.name)))
        }
    }
}

impl ColumnValue for EnumCodec {
    fn column_type(&self) -> String {
        let width = if self.values.len() > ENUM8_MAX { 16 } else { 8 };
        let members: Vec<String> = self
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{} = {}", quote_str(v), i + 1))
            .collect();
        format!("Enum{}({})", width, members.join(", "))
    }

    fn encode_value(&self, value: &Value) -> CodecResult<SqlValue> {
        match value {
            Value::String(label) => {
                self.check(label)?;
                Ok(SqlValue::String(label.clone()))
            }
            other => Err(CodecError::type_mismatch(&self.name, other)),
        }
    }

    fn decode_value(&self, value: &SqlValue) -> CodecResult<Value> {
        match value {
            SqlValue::String(label) => Ok(Value::String(label.clone())),
            // Some drivers return the numeric code
            other => {
                let code = other
                    .as_i64()
                    .ok_or_else(|| CodecError::Invalid(format!("unexpected {} for {}", other, self.name)))?;
                usize::try_from(code - 1)
                    .ok()
                    .and_then(|i| self.values.get(i))
                    .map(|label| Value::String(label.clone()))
                    .ok_or_else(|| CodecError::Invalid(format!("{} has no value {}", self.name, code)))
            }
        }
    }

    fn zero(&self) -> SqlValue {
        SqlValue::String(self.values.first().cloned().unwrap_or_default())
    }

    fn to_json(&self, value: &Value) -> CodecResult<serde_json::Value> {
        match self.encode_value(value)? {
            SqlValue::String(label) => Ok(serde_json::Value::String(label)),
            other => Err(CodecError::Invalid(format!("{} has no JSON form", other))),
        }
    }

    fn from_json(&self, value: &serde_json::Value) -> CodecResult<Value> {
        match value {
            serde_json::Value::String(label) => Ok(Value::String(label.clone())),
            other => Err(CodecError::Invalid(format!("unexpected JSON {} for {}", other, self.name))),
        }
    }

    fn json_type(&self) -> &'static str {
        "String"
    }

    fn json_param(&self, value: &Value) -> CodecResult<SqlValue> {
        self.encode_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_order_is_encoding_order() {
        let codec = EnumCodec::new("Side", vec!["BUY".into(), "SELL".into()]);
        assert_eq!(codec.column_type(), "Enum8('BUY' = 1, 'SELL' = 2)");
        assert_eq!(codec.decode_value(&SqlValue::Int8(2)).unwrap(), Value::String("SELL".into()));
    }

    #[test]
    fn test_wide_enums_use_enum16() {
        let values: Vec<String> = (0..200).map(|i| format!("V{}", i)).collect();
        let codec = EnumCodec::new("Wide", values);
        assert!(codec.column_type().starts_with("Enum16("));
    }

    #[test]
    fn test_unknown_label_rejected() {
        let codec = EnumCodec::new("Side", vec!["BUY".into()]);
        assert!(codec.encode_value(&Value::String("HOLD".into())).is_err());
        assert!(codec.encode_value(&Value::Int(1)).is_err());
    }
}
