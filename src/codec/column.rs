//! Single-column value encodings
//!
//! `ColumnValue` is what every one-value-per-column encoding provides: its
//! column type, conversion of non-null values both ways, and its JSON form
//! used inside JSON-text lists. `Single` adds field-level nullability on top.

use crate::entity::Value;
use crate::sql::{quote_ident, Row, SqlValue};

use super::{CodecError, CodecResult, ColumnSpec, ViewColumn};

/// One-value-per-column encoding of a non-null value
pub trait ColumnValue {
    /// Column type for a non-null value
    fn column_type(&self) -> String;

    fn encode_value(&self, value: &Value) -> CodecResult<SqlValue>;

    fn decode_value(&self, value: &SqlValue) -> CodecResult<Value>;

    /// Placeholder written for a non-null column with no value
    fn zero(&self) -> SqlValue;

    /// JSON form inside JSON-text lists
    fn to_json(&self, value: &Value) -> CodecResult<serde_json::Value>;

    fn from_json(&self, value: &serde_json::Value) -> CodecResult<Value>;

    /// Type given to `JSONExtract` for elements of this kind
    fn json_type(&self) -> &'static str;

    /// Parameter comparable with a `json_type` element
    fn json_param(&self, value: &Value) -> CodecResult<SqlValue>;

    /// View expression turning an extracted JSON element `var` into the native type
    fn json_convert(&self, _var: &str) -> Option<String> {
        None
    }

    /// Whether nullability is expressed by a `Nullable(...)` wrapper
    fn wraps_nullable(&self) -> bool {
        true
    }

    /// Value stored for null when `wraps_nullable` is false
    fn null_value(&self) -> SqlValue {
        SqlValue::Null
    }

    fn is_null(&self, value: &SqlValue) -> bool {
        value.is_null()
    }

    /// `IS NULL` / `IS NOT NULL` test of the column
    fn null_test(&self, column: &str, is_null: bool) -> String {
        if is_null {
            format!("{} IS NULL", column)
        } else {
            format!("{} IS NOT NULL", column)
        }
    }

    /// Comparable expression of the raw column
    fn filter_expr(&self, column: &str) -> String {
        column.to_string()
    }

    /// View projection of the raw column, if it differs from the column
    fn view_expr(&self, _column: &str) -> Option<String> {
        None
    }

    /// Parameter compared against `filter_expr`
    fn filter_param(&self, value: &Value) -> CodecResult<SqlValue> {
        self.encode_value(value)
    }
}

/// A field stored in exactly one column
#[derive(Debug, Clone, PartialEq)]
pub struct Single<T> {
    pub(crate) name: String,
    pub(crate) non_null: bool,
    pub(crate) inner: T,
    /// `@dbType` override of the column type
    pub(crate) db_type: Option<String>,
}

impl<T: ColumnValue> Single<T> {
    pub fn new(name: impl Into<String>, non_null: bool, inner: T) -> Self {
        Self {
            name: name.into(),
            non_null,
            inner,
            db_type: None,
        }
    }

    pub fn with_db_type(mut self, db_type: Option<String>) -> Self {
        self.db_type = db_type;
        self
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn column_type(&self) -> String {
        let base = self.db_type.clone().unwrap_or_else(|| self.inner.column_type());
        if self.non_null || !self.inner.wraps_nullable() {
            return base;
        }
        nullable(&base)
    }

    pub fn columns(&self) -> Vec<ColumnSpec> {
        vec![ColumnSpec::new(&self.name, self.column_type())]
    }

    pub fn view_columns(&self) -> Vec<ViewColumn> {
        let column = quote_ident(&self.name);
        let expr = self.inner.view_expr(&column).unwrap_or_else(|| column.clone());
        vec![ViewColumn::new(expr, &self.name)]
    }

    pub fn encode(&self, value: &Value, out: &mut Vec<SqlValue>) -> CodecResult<()> {
        if value.is_null() {
            if self.non_null {
                return Err(CodecError::Null);
            }
            out.push(self.inner.null_value());
            return Ok(());
        }
        out.push(self.inner.encode_value(value)?);
        Ok(())
    }

    pub fn encode_empty(&self, out: &mut Vec<SqlValue>) {
        if self.non_null {
            out.push(self.inner.zero());
        } else {
            out.push(self.inner.null_value());
        }
    }

    pub fn decode(&self, row: &Row) -> CodecResult<Value> {
        let raw = row
            .get(&self.name)
            .ok_or_else(|| CodecError::Invalid(format!("column '{}' missing from result", self.name)))?;
        if self.inner.is_null(raw) {
            return Ok(Value::Null);
        }
        self.inner.decode_value(raw)
    }

    pub fn null_test(&self, is_null: bool) -> String {
        if self.non_null {
            return if is_null { "false" } else { "true" }.to_string();
        }
        self.inner.null_test(&quote_ident(&self.name), is_null)
    }

    pub fn filter_expr(&self) -> String {
        self.inner.filter_expr(&quote_ident(&self.name))
    }
}

/// `Nullable(T)`; LowCardinality must stay outermost
fn nullable(ty: &str) -> String {
    if ty.starts_with("Nullable(") || ty.starts_with("LowCardinality(Nullable(") {
        return ty.to_string();
    }
    match ty.strip_prefix("LowCardinality(").and_then(|rest| rest.strip_suffix(')')) {
        Some(inner) => format!("LowCardinality(Nullable({}))", inner),
        None => format!("Nullable({})", ty),
    }
}
