//! Statement executor
//!
//! Wraps a `Connection` with the store's ambient concerns:
//! - every statement is traced and counted
//! - statements slower than the threshold are logged as warnings
//! - raw connection failures become `Transient` errors carrying SQL and timing

use crate::error::{StoreError, StoreResult};
use crate::observability::{Event, Logger, MetricsRegistry, Timer};

use super::conn::{Connection, QueryContext};
use super::value::{Row, SqlValue};

/// Borrowed view over a connection plus metrics
#[derive(Clone, Copy)]
pub struct StatementExecutor<'a> {
    conn: &'a dyn Connection,
    metrics: &'a MetricsRegistry,
    slow_query_ms: u64,
}

impl<'a> StatementExecutor<'a> {
    pub fn new(conn: &'a dyn Connection, metrics: &'a MetricsRegistry, slow_query_ms: u64) -> Self {
        Self {
            conn,
            metrics,
            slow_query_ms,
        }
    }

    /// Run a query, streaming rows to `on_row`
    pub fn query(
        &self,
        ctx: &QueryContext,
        sql: &str,
        args: &[SqlValue],
        on_row: &mut dyn FnMut(&Row) -> StoreResult<()>,
    ) -> StoreResult<()> {
        self.run(sql, || self.conn.query(ctx, sql, args, on_row))
    }

    /// Run a query and collect its rows
    pub fn query_rows(&self, ctx: &QueryContext, sql: &str, args: &[SqlValue]) -> StoreResult<Vec<Row>> {
        let mut rows = Vec::new();
        self.query(ctx, sql, args, &mut |row| {
            rows.push(row.clone());
            Ok(())
        })?;
        Ok(rows)
    }

    pub fn exec(&self, ctx: &QueryContext, sql: &str, args: &[SqlValue]) -> StoreResult<()> {
        self.run(sql, || self.conn.exec(ctx, sql, args))
    }

    pub fn query_count(&self, ctx: &QueryContext, sql: &str, args: &[SqlValue]) -> StoreResult<u64> {
        self.run(sql, || self.conn.query_count(ctx, sql, args))
    }

    pub fn batch_insert(
        &self,
        ctx: &QueryContext,
        sql: &str,
        batch_size: usize,
        rows: &[Vec<SqlValue>],
    ) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.run(sql, || self.conn.batch_insert(ctx, sql, batch_size, rows))?;
        self.metrics.add_rows_inserted(rows.len() as u64);
        Ok(())
    }

    pub fn metrics(&self) -> &'a MetricsRegistry {
        self.metrics
    }

    fn run<T>(&self, sql: &str, op: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
        let timer = Timer::new();
        self.metrics.increment_statements();
        let result = op();
        let elapsed_ms = timer.elapsed_ms();
        let elapsed = elapsed_ms.to_string();

        match result {
            Ok(value) => {
                if elapsed_ms >= self.slow_query_ms {
                    Logger::warn(Event::SlowStatement, &[("sql", sql), ("elapsed_ms", &elapsed)]);
                } else {
                    Logger::trace(Event::Statement, &[("sql", sql), ("elapsed_ms", &elapsed)]);
                }
                Ok(value)
            }
            Err(err) => {
                self.metrics.increment_statement_failures();
                let message = err.to_string();
                Logger::error(
                    Event::StatementFailed,
                    &[("sql", sql), ("elapsed_ms", &elapsed), ("error", &message)],
                );
                Err(match err {
                    StoreError::Connection(message) => StoreError::Transient {
                        sql: sql.to_string(),
                        elapsed_ms,
                        message,
                    },
                    other => other,
                })
            }
        }
    }
}
