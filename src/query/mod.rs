//! Query and filter compiler
//!
//! - `filter`: the filter tree callers build
//! - `compiler`: filters to parameterized predicates over physical columns
//! - `select`: point, list and count statements per layout
//! - `temp_table`: session temporary tables for huge id sets
//!
//! `EntityQuery` runs those statements for one entity and decodes the rows.

pub mod compiler;
pub mod filter;
pub mod select;
pub mod temp_table;

pub use compiler::{Condition, FilterCompiler, Predicate};
pub use filter::{Filter, FilterOp};
pub use select::{Clause, SelectBuilder, Statement};
pub use temp_table::{session_context, TempIdTable};

use std::cmp::Ordering;

use crate::codec::{meta, EntityCodec};
use crate::config::StoreConfig;
use crate::ddl::Layout;
use crate::entity::{EntityBox, Value};
use crate::error::{StoreError, StoreResult};
use crate::sql::{QueryContext, StatementExecutor};

/// Reads of one entity
pub struct EntityQuery<'a> {
    exec: StatementExecutor<'a>,
    codec: &'a EntityCodec,
    layout: &'a Layout,
    config: &'a StoreConfig,
}

impl<'a> EntityQuery<'a> {
    pub fn new(exec: StatementExecutor<'a>, codec: &'a EntityCodec, layout: &'a Layout, config: &'a StoreConfig) -> Self {
        Self {
            exec,
            codec,
            layout,
            config,
        }
    }

    fn select(&self) -> SelectBuilder<'_> {
        SelectBuilder::new(self.codec, self.layout, self.config.features.window_latest)
    }

    /// Latest live version of one id
    pub fn get(&self, ctx: &QueryContext, chain: &str, id: &Value) -> StoreResult<Option<EntityBox>> {
        let mut boxes = self.list(ctx, chain, &[Filter::eq(meta::ID, id.clone())], Some(1))?;
        Ok(boxes.pop())
    }

    pub fn list(&self, ctx: &QueryContext, chain: &str, filters: &[Filter], limit: Option<usize>) -> StoreResult<Vec<EntityBox>> {
        self.with_clauses(ctx, filters, |ctx, clauses| {
            let statement = self.select().list(chain, clauses, limit);
            let mut boxes = Vec::new();
            self.exec.query(ctx, &statement.sql, &statement.args, &mut |row| {
                boxes.push(self.codec.decode_box(row)?);
                Ok(())
            })?;
            Ok(boxes)
        })
    }

    pub fn count(&self, ctx: &QueryContext, chain: &str, filters: &[Filter]) -> StoreResult<u64> {
        self.with_clauses(ctx, filters, |ctx, clauses| {
            let statement = self.select().count(chain, clauses);
            self.exec.query_count(ctx, &statement.sql, &statement.args)
        })
    }

    /// Ids of every live row, ordered
    pub fn all_ids(&self, ctx: &QueryContext, chain: &str) -> StoreResult<Vec<Value>> {
        let statement = self.select().all_ids(chain);
        let mut ids = Vec::new();
        self.exec.query(ctx, &statement.sql, &statement.args, &mut |row| {
            ids.push(self.decode_id(row)?);
            Ok(())
        })?;
        Ok(ids)
    }

    pub fn max_id(&self, ctx: &QueryContext, chain: &str) -> StoreResult<Option<Value>> {
        let statement = self.select().max_id(chain);
        let mut max = None;
        self.exec.query(ctx, &statement.sql, &statement.args, &mut |row| {
            max = Some(self.decode_id(row)?);
            Ok(())
        })?;
        Ok(max)
    }

    fn decode_id(&self, row: &crate::sql::Row) -> StoreResult<Value> {
        self.codec
            .id()
            .decode(row)
            .map_err(|e| StoreError::Decode {
                entity: self.codec.entity().to_string(),
                field: meta::ID.to_string(),
                reason: e.to_string(),
            })
            .map(|id| id.unwrap_or(Value::Null))
    }

    /// Compile filters, materialize huge id sets and run `f` while the
    /// temporary tables exist
    fn with_clauses<T>(
        &self,
        ctx: &QueryContext,
        filters: &[Filter],
        f: impl FnOnce(&QueryContext, &[Clause]) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let conditions = FilterCompiler::new(self.codec, self.config.huge_id_threshold).compile(filters)?;
        let needs_session = conditions
            .iter()
            .any(|c| matches!(c.predicate, Predicate::IdSet { .. }));
        let ctx = if needs_session { session_context(ctx) } else { ctx.clone() };

        let id_type = self
            .codec
            .id()
            .columns()
            .first()
            .map(|c| c.ty.clone())
            .unwrap_or_else(|| "String".to_string());
        let mut tables = Vec::new();
        let mut clauses = Vec::with_capacity(conditions.len());
        for condition in conditions {
            match condition.predicate {
                Predicate::Sql { sql, args } => clauses.push(Clause::new(sql, args, condition.on_id)),
                Predicate::IdSet { negated, ids } => {
                    let table = TempIdTable::create(self.exec, &ctx, &id_type, &ids, self.config.temp_table_batch_size)?;
                    clauses.push(Clause::new(table.membership(negated), vec![], true));
                    tables.push(table);
                }
            }
        }
        let result = f(&ctx, &clauses);
        drop(tables);
        result
    }
}

/// Id order of list results: numeric ids numerically, everything else as text
pub fn compare_ids(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Int8(x), Value::Int8(y)) => x.cmp(y),
        (Value::BigInt(x), Value::BigInt(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}
