//! Per-field codec
//!
//! `FieldCodec` is closed: every consumer matches all variants, so adding an
//! encoding means touching every place that needs to know about it.

use crate::entity::Value;
use crate::schema::ScalarType;
use crate::sql::{Row, SqlValue};

use super::bigint::BigIntCodec;
use super::column::{ColumnValue, Single};
use super::decimal::DecimalCodec;
use super::enums::EnumCodec;
use super::list::ListCodec;
use super::reference::{ForeignKeyCodec, ReverseForeignKeyCodec};
use super::scalar::ScalarCodec;
use super::{CodecResult, ColumnSpec, ViewColumn};

/// Encoding of list elements
#[derive(Debug, Clone, PartialEq)]
pub enum ElementCodec {
    Scalar(ScalarCodec),
    BigInt(BigIntCodec),
    Decimal(DecimalCodec),
    Enum(EnumCodec),
}

macro_rules! dispatch {
    ($self:ident, $codec:ident => $body:expr) => {
        match $self {
            ElementCodec::Scalar($codec) => $body,
            ElementCodec::BigInt($codec) => $body,
            ElementCodec::Decimal($codec) => $body,
            ElementCodec::Enum($codec) => $body,
        }
    };
}

impl ColumnValue for ElementCodec {
    fn column_type(&self) -> String {
        dispatch!(self, c => c.column_type())
    }

    fn encode_value(&self, value: &Value) -> CodecResult<SqlValue> {
        dispatch!(self, c => c.encode_value(value))
    }

    fn decode_value(&self, value: &SqlValue) -> CodecResult<Value> {
        dispatch!(self, c => c.decode_value(value))
    }

    fn zero(&self) -> SqlValue {
        dispatch!(self, c => c.zero())
    }

    fn to_json(&self, value: &Value) -> CodecResult<serde_json::Value> {
        dispatch!(self, c => c.to_json(value))
    }

    fn from_json(&self, value: &serde_json::Value) -> CodecResult<Value> {
        dispatch!(self, c => c.from_json(value))
    }

    fn json_type(&self) -> &'static str {
        dispatch!(self, c => c.json_type())
    }

    fn json_param(&self, value: &Value) -> CodecResult<SqlValue> {
        dispatch!(self, c => c.json_param(value))
    }

    fn json_convert(&self, var: &str) -> Option<String> {
        dispatch!(self, c => c.json_convert(var))
    }
}

/// Codec of one logical field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldCodec {
    Scalar(Single<ScalarCodec>),
    BigInt(Single<BigIntCodec>),
    BigDecimal(Single<DecimalCodec>),
    Enum(Single<EnumCodec>),
    List(ListCodec),
    ForeignKey(ForeignKeyCodec),
    ReverseForeignKey(ReverseForeignKeyCodec),
}

impl FieldCodec {
    pub fn name(&self) -> &str {
        match self {
            FieldCodec::Scalar(s) => &s.name,
            FieldCodec::BigInt(s) => &s.name,
            FieldCodec::BigDecimal(s) => &s.name,
            FieldCodec::Enum(s) => &s.name,
            FieldCodec::List(l) => &l.name,
            FieldCodec::ForeignKey(ForeignKeyCodec::One { column, .. }) => &column.name,
            FieldCodec::ForeignKey(ForeignKeyCodec::Many { list, .. }) => &list.name,
            FieldCodec::ReverseForeignKey(r) => &r.name,
        }
    }

    /// Derived fields have no column
    pub fn is_virtual(&self) -> bool {
        matches!(self, FieldCodec::ReverseForeignKey(_))
    }

    pub fn is_non_null(&self) -> bool {
        match self {
            FieldCodec::Scalar(s) => s.non_null,
            FieldCodec::BigInt(s) => s.non_null,
            FieldCodec::BigDecimal(s) => s.non_null,
            FieldCodec::Enum(s) => s.non_null,
            FieldCodec::List(l) => l.non_null,
            FieldCodec::ForeignKey(ForeignKeyCodec::One { column, .. }) => column.non_null,
            FieldCodec::ForeignKey(ForeignKeyCodec::Many { list, .. }) => list.non_null,
            FieldCodec::ReverseForeignKey(_) => false,
        }
    }

    pub fn list_depth(&self) -> usize {
        match self {
            FieldCodec::List(l) => l.depth,
            FieldCodec::ForeignKey(ForeignKeyCodec::Many { list, .. }) => list.depth,
            _ => 0,
        }
    }

    pub fn is_list(&self) -> bool {
        self.list_depth() > 0
    }

    /// Fields usable with Like/NotLike
    pub fn is_string_like(&self) -> bool {
        match self {
            FieldCodec::Scalar(s) => s.inner.scalar().is_string_like(),
            FieldCodec::Enum(_) => true,
            FieldCodec::ForeignKey(ForeignKeyCodec::One { column, .. }) => {
                column.inner.scalar().is_string_like()
            }
            _ => false,
        }
    }

    /// Whether the field is a Timestamp scalar
    pub fn is_timestamp(&self) -> bool {
        matches!(self, FieldCodec::Scalar(s) if s.inner.scalar() == ScalarType::Timestamp)
    }

    /// Physical columns, in write order
    pub fn columns(&self) -> Vec<ColumnSpec> {
        match self {
            FieldCodec::Scalar(s) => s.columns(),
            FieldCodec::BigInt(s) => s.columns(),
            FieldCodec::BigDecimal(s) => s.columns(),
            FieldCodec::Enum(s) => s.columns(),
            FieldCodec::List(l) => l.columns(),
            FieldCodec::ForeignKey(f) => f.columns(),
            FieldCodec::ReverseForeignKey(_) => Vec::new(),
        }
    }

    /// View projection of the physical columns
    pub fn view_columns(&self) -> Vec<ViewColumn> {
        match self {
            FieldCodec::Scalar(s) => s.view_columns(),
            FieldCodec::BigInt(s) => s.view_columns(),
            FieldCodec::BigDecimal(s) => s.view_columns(),
            FieldCodec::Enum(s) => s.view_columns(),
            FieldCodec::List(l) => l.view_columns(),
            FieldCodec::ForeignKey(f) => f.view_columns(),
            FieldCodec::ReverseForeignKey(_) => Vec::new(),
        }
    }

    /// Append one parameter per physical column
    pub fn encode(&self, value: &Value, out: &mut Vec<SqlValue>) -> CodecResult<()> {
        match self {
            FieldCodec::Scalar(s) => s.encode(value, out),
            FieldCodec::BigInt(s) => s.encode(value, out),
            FieldCodec::BigDecimal(s) => s.encode(value, out),
            FieldCodec::Enum(s) => s.encode(value, out),
            FieldCodec::List(l) => l.encode(value, out),
            FieldCodec::ForeignKey(f) => f.encode(value, out),
            FieldCodec::ReverseForeignKey(_) => Ok(()),
        }
    }

    /// Placeholder values for a delete with no previous data
    pub fn encode_empty(&self, out: &mut Vec<SqlValue>) {
        match self {
            FieldCodec::Scalar(s) => s.encode_empty(out),
            FieldCodec::BigInt(s) => s.encode_empty(out),
            FieldCodec::BigDecimal(s) => s.encode_empty(out),
            FieldCodec::Enum(s) => s.encode_empty(out),
            FieldCodec::List(l) => l.encode_empty(out),
            FieldCodec::ForeignKey(f) => f.encode_empty(out),
            FieldCodec::ReverseForeignKey(_) => {}
        }
    }

    /// Read the field back; `None` for derived fields
    pub fn decode(&self, row: &Row) -> CodecResult<Option<Value>> {
        let value = match self {
            FieldCodec::Scalar(s) => s.decode(row)?,
            FieldCodec::BigInt(s) => s.decode(row)?,
            FieldCodec::BigDecimal(s) => s.decode(row)?,
            FieldCodec::Enum(s) => s.decode(row)?,
            FieldCodec::List(l) => l.decode(row)?,
            FieldCodec::ForeignKey(f) => f.decode(row)?,
            FieldCodec::ReverseForeignKey(_) => return Ok(None),
        };
        Ok(Some(value))
    }

    /// Predicate true when the field is (or is not) null
    pub fn null_test(&self, is_null: bool) -> String {
        match self {
            FieldCodec::Scalar(s) => s.null_test(is_null),
            FieldCodec::BigInt(s) => s.null_test(is_null),
            FieldCodec::BigDecimal(s) => s.null_test(is_null),
            FieldCodec::Enum(s) => s.null_test(is_null),
            FieldCodec::List(l) => l.null_test(is_null),
            FieldCodec::ForeignKey(ForeignKeyCodec::One { column, .. }) => column.null_test(is_null),
            FieldCodec::ForeignKey(ForeignKeyCodec::Many { list, .. }) => list.null_test(is_null),
            FieldCodec::ReverseForeignKey(_) => if is_null { "true" } else { "false" }.to_string(),
        }
    }

    /// Comparable expression of a non-list field
    pub fn filter_expr(&self) -> Option<String> {
        match self {
            FieldCodec::Scalar(s) => Some(s.filter_expr()),
            FieldCodec::BigInt(s) => Some(s.filter_expr()),
            FieldCodec::BigDecimal(s) => Some(s.filter_expr()),
            FieldCodec::Enum(s) => Some(s.filter_expr()),
            FieldCodec::ForeignKey(ForeignKeyCodec::One { column, .. }) => Some(column.filter_expr()),
            _ => None,
        }
    }

    /// Parameter compared against `filter_expr`
    pub fn filter_param(&self, value: &Value) -> CodecResult<SqlValue> {
        match self {
            FieldCodec::Scalar(s) => s.inner.filter_param(value),
            FieldCodec::BigInt(s) => s.inner.filter_param(value),
            FieldCodec::BigDecimal(s) => s.inner.filter_param(value),
            FieldCodec::Enum(s) => s.inner.filter_param(value),
            FieldCodec::ForeignKey(ForeignKeyCodec::One { column, .. }) => column.inner.filter_param(value),
            other => Err(super::CodecError::Invalid(format!(
                "field '{}' has no comparable column",
                other.name()
            ))),
        }
    }

    /// Array expression of a single-dimension list
    pub fn array_expr(&self) -> Option<String> {
        match self {
            FieldCodec::List(l) if l.depth == 1 => Some(l.array_expr()),
            FieldCodec::ForeignKey(ForeignKeyCodec::Many { list, .. }) if list.depth == 1 => {
                Some(list.array_expr())
            }
            _ => None,
        }
    }

    /// Element array parameter for `hasAll`/`hasAny`
    pub fn membership_param(&self, values: &[Value]) -> CodecResult<SqlValue> {
        match self {
            FieldCodec::List(l) => l.membership_param(values),
            FieldCodec::ForeignKey(ForeignKeyCodec::Many { list, .. }) => list.membership_param(values),
            other => Err(super::CodecError::Invalid(format!("field '{}' is not a list", other.name()))),
        }
    }
}
