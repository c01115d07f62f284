//! Filter tree
//!
//! Filters are a flat conjunction of `field op values`. Comparison and
//! pattern operators take exactly one value; set and membership operators
//! take any number.

use std::fmt;

use crate::entity::Value;

/// Filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    NotIn,
    Like,
    NotLike,
    HasAll,
    HasAny,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::In => "IN",
            FilterOp::NotIn => "NOT IN",
            FilterOp::Like => "LIKE",
            FilterOp::NotLike => "NOT LIKE",
            FilterOp::HasAll => "hasAll",
            FilterOp::HasAny => "hasAny",
        }
    }

    /// Operators taking exactly one value
    pub fn is_single_valued(&self) -> bool {
        !matches!(self, FilterOp::In | FilterOp::NotIn | FilterOp::HasAll | FilterOp::HasAny)
    }

    /// Gt, Ge, Lt, Le
    pub fn is_ordering(&self) -> bool {
        matches!(self, FilterOp::Gt | FilterOp::Ge | FilterOp::Lt | FilterOp::Le)
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One predicate on a field
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub values: Vec<Value>,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            values,
        }
    }

    fn single(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self::new(field, op, vec![value.into()])
    }

    fn many<T: Into<Value>>(field: impl Into<String>, op: FilterOp, values: Vec<T>) -> Self {
        Self::new(field, op, values.into_iter().map(Into::into).collect())
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, FilterOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, FilterOp::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, FilterOp::Gt, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, FilterOp::Ge, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, FilterOp::Lt, value)
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, FilterOp::Le, value)
    }

    pub fn is_in<T: Into<Value>>(field: impl Into<String>, values: Vec<T>) -> Self {
        Self::many(field, FilterOp::In, values)
    }

    pub fn not_in<T: Into<Value>>(field: impl Into<String>, values: Vec<T>) -> Self {
        Self::many(field, FilterOp::NotIn, values)
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::single(field, FilterOp::Like, Value::String(pattern.into()))
    }

    pub fn not_like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::single(field, FilterOp::NotLike, Value::String(pattern.into()))
    }

    pub fn has_all<T: Into<Value>>(field: impl Into<String>, values: Vec<T>) -> Self {
        Self::many(field, FilterOp::HasAll, values)
    }

    pub fn has_any<T: Into<Value>>(field: impl Into<String>, values: Vec<T>) -> Self {
        Self::many(field, FilterOp::HasAny, values)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.values.iter().map(ToString::to_string).collect();
        write!(f, "{} {} [{}]", self.field, self.op, values.join(", "))
    }
}
