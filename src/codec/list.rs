//! List encodings
//!
//! - JSON text: one `String` column holding a JSON array (nested for
//!   multi-dimensional lists); bigints and decimals are JSON strings,
//!   timestamps are epoch microseconds. Views decode it with `JSONExtract`
//!   and nested `arrayMap` conversions.
//! - native: nested `Array(...)` of the element type plus a `<field>__null`
//!   shadow column, since arrays cannot be `Nullable`. Null elements have no
//!   native counterpart.

use crate::entity::Value;
use crate::sql::{quote_ident, Row, SqlValue};

use super::column::ColumnValue;
use super::{CodecError, CodecResult, ColumnSpec, ElementCodec, ViewColumn};

/// Suffix of the shadow column telling an empty list from null
pub const NULL_SUFFIX: &str = "__null";

/// Encoding of a list field
#[derive(Debug, Clone, PartialEq)]
pub struct ListCodec {
    pub(crate) name: String,
    pub(crate) non_null: bool,
    pub(crate) depth: usize,
    /// Whether the declared type admits null elements
    pub(crate) nullable_elements: bool,
    pub(crate) element: ElementCodec,
    pub(crate) native: bool,
}

impl ListCodec {
    pub fn new(
        name: impl Into<String>,
        non_null: bool,
        depth: usize,
        nullable_elements: bool,
        element: ElementCodec,
        native: bool,
    ) -> Self {
        Self {
            name: name.into(),
            non_null,
            depth,
            nullable_elements,
            element,
            native,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn element(&self) -> &ElementCodec {
        &self.element
    }

    pub fn is_native(&self) -> bool {
        self.native
    }

    fn null_column(&self) -> String {
        format!("{}{}", self.name, NULL_SUFFIX)
    }

    fn nest(&self, inner: String) -> String {
        (0..self.depth).fold(inner, |acc, _| format!("Array({})", acc))
    }

    /// `JSONExtract` type of the whole list
    fn json_extract_type(&self) -> String {
        self.nest(format!("Nullable({})", self.element.json_type()))
    }

    /// Decoded array expression of the JSON column
    fn json_array_expr(&self) -> String {
        format!(
            "JSONExtract(ifNull({}, '[]'), '{}')",
            quote_ident(&self.name),
            self.json_extract_type()
        )
    }

    pub fn columns(&self) -> Vec<ColumnSpec> {
        if self.native {
            vec![
                ColumnSpec::new(&self.name, self.nest(self.element.column_type())),
                ColumnSpec::new(self.null_column(), "Bool"),
            ]
        } else if self.non_null {
            vec![ColumnSpec::new(&self.name, "String")]
        } else {
            vec![ColumnSpec::new(&self.name, "Nullable(String)")]
        }
    }

    pub fn view_columns(&self) -> Vec<ViewColumn> {
        if self.native {
            return vec![
                ViewColumn::new(quote_ident(&self.name), &self.name),
                ViewColumn::new(quote_ident(&self.null_column()), self.null_column()),
            ];
        }
        let mut expr = self.json_array_expr();
        if let Some(convert) = self.element.json_convert("x0") {
            let mut lambda = format!("x0 -> {}", convert);
            for level in 1..self.depth {
                lambda = format!("x{} -> arrayMap({}, x{})", level, lambda, level);
            }
            expr = format!("arrayMap({}, {})", lambda, expr);
        }
        vec![
            ViewColumn::new(expr, &self.name),
            ViewColumn::new(format!("isNull({})", quote_ident(&self.name)), self.null_column()),
        ]
    }

    pub fn encode(&self, value: &Value, out: &mut Vec<SqlValue>) -> CodecResult<()> {
        match value {
            Value::Null if self.non_null => Err(CodecError::Null),
            Value::Null => {
                self.push_null(out);
                Ok(())
            }
            Value::List(items) if self.native => {
                out.push(self.encode_native(items, self.depth)?);
                out.push(SqlValue::Bool(false));
                Ok(())
            }
            Value::List(items) => {
                let json = self.encode_json(items, self.depth)?;
                out.push(SqlValue::String(json.to_string()));
                Ok(())
            }
            other => Err(CodecError::type_mismatch("List", other)),
        }
    }

    fn push_null(&self, out: &mut Vec<SqlValue>) {
        if self.native {
            out.push(SqlValue::Array(Vec::new()));
            out.push(SqlValue::Bool(true));
        } else {
            out.push(SqlValue::Null);
        }
    }

    pub fn encode_empty(&self, out: &mut Vec<SqlValue>) {
        if !self.non_null {
            self.push_null(out);
        } else if self.native {
            out.push(SqlValue::Array(Vec::new()));
            out.push(SqlValue::Bool(false));
        } else {
            out.push(SqlValue::String("[]".to_string()));
        }
    }

    fn encode_native(&self, items: &[Value], depth: usize) -> CodecResult<SqlValue> {
        let mut encoded = Vec::with_capacity(items.len());
        for item in items {
            encoded.push(match (depth, item) {
                (_, Value::Null) => return Err(CodecError::Null),
                (1, value) => self.element.encode_value(value)?,
                (_, Value::List(inner)) => self.encode_native(inner, depth - 1)?,
                (_, other) => return Err(CodecError::type_mismatch("List", other)),
            });
        }
        Ok(SqlValue::Array(encoded))
    }

    fn encode_json(&self, items: &[Value], depth: usize) -> CodecResult<serde_json::Value> {
        let mut encoded = Vec::with_capacity(items.len());
        for item in items {
            encoded.push(match (depth, item) {
                (_, Value::Null) if self.nullable_elements => serde_json::Value::Null,
                (_, Value::Null) => return Err(CodecError::Null),
                (1, value) => self.element.to_json(value)?,
                (_, Value::List(inner)) => self.encode_json(inner, depth - 1)?,
                (_, other) => return Err(CodecError::type_mismatch("List", other)),
            });
        }
        Ok(serde_json::Value::Array(encoded))
    }

    pub fn decode(&self, row: &Row) -> CodecResult<Value> {
        let raw = row
            .get(&self.name)
            .ok_or_else(|| CodecError::Invalid(format!("column '{}' missing from result", self.name)))?;
        if self.native {
            let is_null = row
                .get(&self.null_column())
                .and_then(SqlValue::as_bool)
                .unwrap_or(false);
            if is_null {
                return Ok(Value::Null);
            }
            return self.decode_native(raw, self.depth);
        }
        match raw {
            SqlValue::Null => Ok(Value::Null),
            SqlValue::String(text) => {
                let json: serde_json::Value = serde_json::from_str(text)
                    .map_err(|e| CodecError::Invalid(format!("list is not JSON: {}", e)))?;
                self.decode_json(&json, self.depth)
            }
            other => Err(CodecError::Invalid(format!("unexpected {} for a JSON list", other))),
        }
    }

    fn decode_native(&self, raw: &SqlValue, depth: usize) -> CodecResult<Value> {
        match raw {
            SqlValue::Array(items) => items
                .iter()
                .map(|item| {
                    if depth == 1 {
                        self.element.decode_value(item)
                    } else {
                        self.decode_native(item, depth - 1)
                    }
                })
                .collect::<CodecResult<Vec<_>>>()
                .map(Value::List),
            other => Err(CodecError::Invalid(format!("unexpected {} for an array", other))),
        }
    }

    fn decode_json(&self, json: &serde_json::Value, depth: usize) -> CodecResult<Value> {
        match json {
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| match (depth, item) {
                    (_, serde_json::Value::Null) => Ok(Value::Null),
                    (1, value) => self.element.from_json(value),
                    (_, value) => self.decode_json(value, depth - 1),
                })
                .collect::<CodecResult<Vec<_>>>()
                .map(Value::List),
            other => Err(CodecError::Invalid(format!("unexpected JSON {} for a list", other))),
        }
    }

    pub fn null_test(&self, is_null: bool) -> String {
        if self.native {
            let column = quote_ident(&self.null_column());
            return if is_null { column } else { format!("NOT {}", column) };
        }
        if self.non_null {
            return if is_null { "false" } else { "true" }.to_string();
        }
        let column = quote_ident(&self.name);
        if is_null {
            format!("{} IS NULL", column)
        } else {
            format!("{} IS NOT NULL", column)
        }
    }

    /// Array expression usable with `hasAll`/`hasAny`
    pub fn array_expr(&self) -> String {
        if self.native {
            quote_ident(&self.name)
        } else {
            self.json_array_expr()
        }
    }

    /// Parameter holding the element values to test membership of
    pub fn membership_param(&self, values: &[Value]) -> CodecResult<SqlValue> {
        values
            .iter()
            .map(|v| {
                if self.native {
                    self.element.encode_value(v)
                } else {
                    self.element.json_param(v)
                }
            })
            .collect::<CodecResult<Vec<_>>>()
            .map(SqlValue::Array)
    }
}
