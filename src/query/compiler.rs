//! Filter compiler
//!
//! Turns filters into parameterized predicates over the physical columns of
//! one entity. Predicates reference raw columns through each codec's filter
//! expression, so they apply to the stored rows before any latest-row
//! reduction as well as to unpacked latest rows.
//!
//! Rules:
//! - null `Eq`/`Ne` become the field's null test
//! - ordering operators reject lists and nulls and guard against null
//! - empty `In`/`NotIn` short-circuit to `false`/`true`
//! - nulls mixed into `In`/`NotIn` are split off into a null test
//! - `In`/`NotIn` on the id above the threshold are resolved through a
//!   temporary table
//! - `Like`/`NotLike` only apply to string-like fields
//! - `HasAll`/`HasAny` only apply to single-dimension lists

use crate::codec::{meta, CodecError, EntityCodec, FieldCodec};
use crate::entity::Value;
use crate::error::{StoreError, StoreResult};
use crate::sql::SqlValue;

use super::filter::{Filter, FilterOp};

/// A compiled predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Sql { sql: String, args: Vec<SqlValue> },
    /// Id set too large to inline
    IdSet { negated: bool, ids: Vec<SqlValue> },
}

/// A compiled filter
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Whether the predicate only reads the id column
    pub on_id: bool,
    pub predicate: Predicate,
}

impl Condition {
    fn sql(on_id: bool, sql: impl Into<String>, args: Vec<SqlValue>) -> Self {
        Self {
            on_id,
            predicate: Predicate::Sql { sql: sql.into(), args },
        }
    }
}

/// Compiles filters against one entity's codecs
pub struct FilterCompiler<'a> {
    codec: &'a EntityCodec,
    huge_id_threshold: usize,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(codec: &'a EntityCodec, huge_id_threshold: usize) -> Self {
        Self {
            codec,
            huge_id_threshold,
        }
    }

    pub fn compile(&self, filters: &[Filter]) -> StoreResult<Vec<Condition>> {
        filters.iter().map(|f| self.compile_one(f)).collect()
    }

    fn compile_one(&self, filter: &Filter) -> StoreResult<Condition> {
        let field = self
            .codec
            .field(&filter.field)
            .ok_or_else(|| StoreError::invalid_filter(&filter.field, format!("{} has no such field", self.codec.entity())))?;
        if field.is_virtual() {
            return Err(StoreError::invalid_filter(&filter.field, "derived fields cannot be filtered"));
        }
        if filter.op.is_single_valued() && filter.values.len() != 1 {
            return Err(StoreError::invalid_filter(
                &filter.field,
                format!("{} takes exactly one value, got {}", filter.op, filter.values.len()),
            ));
        }
        let on_id = filter.field == meta::ID;

        match filter.op {
            FilterOp::Eq | FilterOp::Ne => {
                let value = &filter.values[0];
                if value.is_null() {
                    return Ok(Condition::sql(on_id, field.null_test(filter.op == FilterOp::Eq), vec![]));
                }
                let expr = self.comparable(filter, field)?;
                let param = self.param(filter, field, value)?;
                Ok(Condition::sql(on_id, format!("{} {} ?", expr, filter.op), vec![param]))
            }
            FilterOp::Gt | FilterOp::Ge | FilterOp::Lt | FilterOp::Le => {
                let value = &filter.values[0];
                if value.is_null() {
                    return Err(StoreError::invalid_filter(&filter.field, format!("{} against null", filter.op)));
                }
                let expr = self.comparable(filter, field)?;
                let param = self.param(filter, field, value)?;
                let comparison = format!("{} {} ?", expr, filter.op);
                Ok(Condition::sql(on_id, guarded(field, comparison), vec![param]))
            }
            FilterOp::In | FilterOp::NotIn => self.compile_set(filter, field, on_id),
            FilterOp::Like | FilterOp::NotLike => {
                if !field.is_string_like() {
                    return Err(StoreError::invalid_filter(&filter.field, format!("{} needs a string field", filter.op)));
                }
                let pattern = filter.values[0]
                    .as_str()
                    .ok_or_else(|| StoreError::invalid_filter(&filter.field, "pattern must be a string"))?;
                let expr = self.comparable(filter, field)?;
                Ok(Condition::sql(
                    on_id,
                    format!("{} {} ?", expr, filter.op),
                    vec![SqlValue::String(pattern.to_string())],
                ))
            }
            FilterOp::HasAll | FilterOp::HasAny => {
                let array = field.array_expr().ok_or_else(|| {
                    StoreError::invalid_filter(&filter.field, format!("{} needs a single-dimension list", filter.op))
                })?;
                if filter.values.is_empty() {
                    let sql = match filter.op {
                        FilterOp::HasAll => field.null_test(false),
                        _ => "false".to_string(),
                    };
                    return Ok(Condition::sql(on_id, sql, vec![]));
                }
                if filter.values.iter().any(Value::is_null) {
                    return Err(StoreError::invalid_filter(&filter.field, "list membership of null"));
                }
                let param = field
                    .membership_param(&filter.values)
                    .map_err(|e| codec_error(filter, e))?;
                Ok(Condition::sql(on_id, format!("{}({}, ?)", filter.op, array), vec![param]))
            }
        }
    }

    fn compile_set(&self, filter: &Filter, field: &FieldCodec, on_id: bool) -> StoreResult<Condition> {
        let negated = filter.op == FilterOp::NotIn;
        if filter.values.is_empty() {
            return Ok(Condition::sql(on_id, if negated { "true" } else { "false" }, vec![]));
        }
        let expr = self.comparable(filter, field)?;
        let has_null = filter.values.iter().any(Value::is_null);
        let params = filter
            .values
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| self.param(filter, field, v))
            .collect::<StoreResult<Vec<_>>>()?;

        if on_id && params.len() > self.huge_id_threshold {
            return Ok(Condition {
                on_id,
                predicate: Predicate::IdSet { negated, ids: params },
            });
        }

        let mut parts = Vec::new();
        if !params.is_empty() {
            let placeholders = vec!["?"; params.len()].join(", ");
            parts.push(format!("{} {} ({})", expr, filter.op, placeholders));
        }
        if negated {
            // NOT IN never matches null rows, so only the null exclusion needs spelling out
            if has_null {
                parts.push(field.null_test(false));
            }
        } else if has_null {
            parts.push(field.null_test(true));
        }
        let sql = match parts.len() {
            1 => parts.remove(0),
            _ if negated => format!("({})", parts.join(" AND ")),
            _ => format!("({})", parts.join(" OR ")),
        };
        Ok(Condition::sql(on_id, sql, params))
    }

    fn comparable(&self, filter: &Filter, field: &FieldCodec) -> StoreResult<String> {
        match field.filter_expr() {
            Some(expr) if !field.is_list() => Ok(expr),
            _ => Err(StoreError::invalid_filter(
                &filter.field,
                format!("{} is not supported on list fields", filter.op),
            )),
        }
    }

    fn param(&self, filter: &Filter, field: &FieldCodec, value: &Value) -> StoreResult<SqlValue> {
        field.filter_param(value).map_err(|e| codec_error(filter, e))
    }
}

fn guarded(field: &FieldCodec, comparison: String) -> String {
    match field.null_test(false).as_str() {
        "true" => comparison,
        guard => format!("({} AND {})", guard, comparison),
    }
}

fn codec_error(filter: &Filter, error: CodecError) -> StoreError {
    StoreError::invalid_filter(&filter.field, error.to_string())
}
