//! Connection seam
//!
//! The store never talks to a transport directly. Any client able to run
//! parameterized statements (`?` placeholders, bound in order) implements
//! `Connection`; pooling, retries and transport errors belong to it.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};

use super::value::{Row, SqlValue};

/// Deduplication token covering every insert of one flush
pub const SETTING_DEDUP_TOKEN: &str = "insert_deduplication_token";
/// Wait for mutations (`ALTER ... DELETE`) to finish before returning
pub const SETTING_MUTATIONS_SYNC: &str = "mutations_sync";
/// Session that owns temporary tables
pub const SETTING_SESSION_ID: &str = "session_id";
/// Insert quorum, passed through from the caller
pub const SETTING_INSERT_QUORUM: &str = "insert_quorum";

/// Per-statement settings carried alongside the SQL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryContext {
    settings: BTreeMap<String, String>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of this context with one more setting
    pub fn with_setting(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut ctx = self.clone();
        ctx.settings.insert(key.into(), value.into());
        ctx
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    pub fn settings(&self) -> &BTreeMap<String, String> {
        &self.settings
    }
}

/// Execution substrate
///
/// Implementations report transport and engine failures as
/// `StoreError::Connection`; the store attaches statement context.
pub trait Connection: Send + Sync {
    /// Run a query, calling `on_row` for every result row in order
    fn query(
        &self,
        ctx: &QueryContext,
        sql: &str,
        args: &[SqlValue],
        on_row: &mut dyn FnMut(&Row) -> StoreResult<()>,
    ) -> StoreResult<()>;

    /// Run a statement without a result set
    fn exec(&self, ctx: &QueryContext, sql: &str, args: &[SqlValue]) -> StoreResult<()>;

    /// Run a query whose first column of the first row is a count
    fn query_count(&self, ctx: &QueryContext, sql: &str, args: &[SqlValue]) -> StoreResult<u64> {
        let mut count = None;
        self.query(ctx, sql, args, &mut |row| {
            if count.is_none() {
                count = Some(row.at(0).and_then(SqlValue::as_u64).ok_or_else(|| {
                    StoreError::connection(format!("count query returned a non-integer: {:?}", row.at(0)))
                })?);
            }
            Ok(())
        })?;
        Ok(count.unwrap_or(0))
    }

    /// Insert rows in chunks of at most `batch_size`; `sql` is an
    /// `INSERT INTO t (cols) VALUES` prefix
    fn batch_insert(
        &self,
        ctx: &QueryContext,
        sql: &str,
        batch_size: usize,
        rows: &[Vec<SqlValue>],
    ) -> StoreResult<()>;
}

impl<C: Connection + ?Sized> Connection for Arc<C> {
    fn query(
        &self,
        ctx: &QueryContext,
        sql: &str,
        args: &[SqlValue],
        on_row: &mut dyn FnMut(&Row) -> StoreResult<()>,
    ) -> StoreResult<()> {
        (**self).query(ctx, sql, args, on_row)
    }

    fn exec(&self, ctx: &QueryContext, sql: &str, args: &[SqlValue]) -> StoreResult<()> {
        (**self).exec(ctx, sql, args)
    }

    fn query_count(&self, ctx: &QueryContext, sql: &str, args: &[SqlValue]) -> StoreResult<u64> {
        (**self).query_count(ctx, sql, args)
    }

    fn batch_insert(
        &self,
        ctx: &QueryContext,
        sql: &str,
        batch_size: usize,
        rows: &[Vec<SqlValue>],
    ) -> StoreResult<()> {
        (**self).batch_insert(ctx, sql, batch_size, rows)
    }
}
