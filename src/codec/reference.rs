//! Entity references
//!
//! A single reference stores the referenced id in a column of the id's
//! type. A repeated reference stores an id array plus the `__null` shadow
//! column, independent of the list encoding flag. `@derivedFrom` fields are
//! resolved by the reader and have no column.

use crate::entity::Value;
use crate::sql::{Row, SqlValue};

use super::column::Single;
use super::list::ListCodec;
use super::scalar::ScalarCodec;
use super::{CodecResult, ColumnSpec, ViewColumn};

/// Reference to another entity or interface
#[derive(Debug, Clone, PartialEq)]
pub enum ForeignKeyCodec {
    One { target: String, column: Single<ScalarCodec> },
    Many { target: String, list: ListCodec },
}

impl ForeignKeyCodec {
    pub fn target(&self) -> &str {
        match self {
            ForeignKeyCodec::One { target, .. } | ForeignKeyCodec::Many { target, .. } => target,
        }
    }

    pub fn columns(&self) -> Vec<ColumnSpec> {
        match self {
            ForeignKeyCodec::One { column, .. } => column.columns(),
            ForeignKeyCodec::Many { list, .. } => list.columns(),
        }
    }

    pub fn view_columns(&self) -> Vec<ViewColumn> {
        match self {
            ForeignKeyCodec::One { column, .. } => column.view_columns(),
            ForeignKeyCodec::Many { list, .. } => list.view_columns(),
        }
    }

    pub fn encode(&self, value: &Value, out: &mut Vec<SqlValue>) -> CodecResult<()> {
        match self {
            ForeignKeyCodec::One { column, .. } => column.encode(value, out),
            ForeignKeyCodec::Many { list, .. } => list.encode(value, out),
        }
    }

    pub fn encode_empty(&self, out: &mut Vec<SqlValue>) {
        match self {
            ForeignKeyCodec::One { column, .. } => column.encode_empty(out),
            ForeignKeyCodec::Many { list, .. } => list.encode_empty(out),
        }
    }

    pub fn decode(&self, row: &Row) -> CodecResult<Value> {
        match self {
            ForeignKeyCodec::One { column, .. } => column.decode(row),
            ForeignKeyCodec::Many { list, .. } => list.decode(row),
        }
    }
}

/// `@derivedFrom(field: ...)`: the inverse side of a reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseForeignKeyCodec {
    pub(crate) name: String,
    /// Referencing type
    pub(crate) target: String,
    /// Field on `target` that points back
    pub(crate) field: String,
}

impl ReverseForeignKeyCodec {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}
