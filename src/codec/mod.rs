//! Type codec
//!
//! Maps logical field types onto columns:
//! - DDL column types and view projections
//! - write parameters, one per physical column
//! - typed values read back from result rows
//! - null tests and comparable filter expressions
//!
//! Codecs are resolved once per entity when the store is built; a schema that
//! cannot be encoded under the active features is rejected there.

mod bigint;
mod column;
mod decimal;
mod entity;
mod enums;
mod field;
mod list;
pub mod meta;
mod reference;
mod scalar;

use thiserror::Error;

use crate::entity::Value;

pub use bigint::BigIntCodec;
pub use column::{ColumnValue, Single};
pub use decimal::DecimalCodec;
pub use entity::EntityCodec;
pub use enums::EnumCodec;
pub use field::{ElementCodec, FieldCodec};
pub use list::{ListCodec, NULL_SUFFIX};
pub use reference::{ForeignKeyCodec, ReverseForeignKeyCodec};
pub use scalar::{micros_to_datetime, ScalarCodec};

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Field-level encoding failure, before entity context is attached
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("{digits} digits, at most {max_digits} allowed")]
    Overflow { digits: u32, max_digits: u32 },

    #[error("expected {expected}, found {found}")]
    Type { expected: String, found: &'static str },

    #[error("null value for a non-null field")]
    Null,

    #[error("{0}")]
    Invalid(String),
}

impl CodecError {
    pub fn type_mismatch(expected: &str, found: &Value) -> Self {
        CodecError::Type {
            expected: expected.to_string(),
            found: found.type_name(),
        }
    }
}

/// One physical column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    /// Column type, `DEFAULT` clause included
    pub ty: String,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

/// One projected view column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewColumn {
    pub expr: String,
    pub alias: String,
}

impl ViewColumn {
    pub fn new(expr: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            alias: alias.into(),
        }
    }
}
