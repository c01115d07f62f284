//! In-memory recording connection
//!
//! Records every statement with its parameters, settings and inserted rows,
//! and replays scripted result sets. Used to verify statement shapes without
//! a running column store.
//!
//! Scripted results are matched by SQL substring: `script` results are
//! consumed by the first matching query, `script_always` results answer
//! every matching query. Queries with no match return no rows.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{StoreError, StoreResult};

use super::conn::{Connection, QueryContext};
use super::value::{Row, SqlValue};

/// How a statement reached the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Exec,
    Insert,
}

/// One recorded statement
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    pub kind: StatementKind,
    pub sql: String,
    pub args: Vec<SqlValue>,
    pub settings: BTreeMap<String, String>,
    /// Rows of one insert chunk
    pub rows: Vec<Vec<SqlValue>>,
}

impl RecordedStatement {
    /// CREATE, ALTER or DROP
    pub fn is_ddl(&self) -> bool {
        let head = self.sql.trim_start().to_ascii_uppercase();
        head.starts_with("CREATE") || head.starts_with("ALTER") || head.starts_with("DROP")
    }
}

struct Script {
    pattern: String,
    rows: Vec<Row>,
    sticky: bool,
}

#[derive(Default)]
struct MemoryState {
    statements: Vec<RecordedStatement>,
    scripts: Vec<Script>,
    failures: Vec<(String, String)>,
}

/// Recording `Connection` for tests and dry runs
#[derive(Default)]
pub struct MemoryConnection {
    state: Mutex<MemoryState>,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next query containing `pattern` with `rows`
    pub fn script(&self, pattern: impl Into<String>, rows: Vec<Row>) {
        self.lock().scripts.push(Script {
            pattern: pattern.into(),
            rows,
            sticky: false,
        });
    }

    /// Answer every query containing `pattern` with `rows`
    pub fn script_always(&self, pattern: impl Into<String>, rows: Vec<Row>) {
        self.lock().scripts.push(Script {
            pattern: pattern.into(),
            rows,
            sticky: true,
        });
    }

    /// Answer the next query containing `pattern` with a single count
    pub fn script_count(&self, pattern: impl Into<String>, count: u64) {
        self.script(pattern, vec![Row::from_pairs(vec![("count", SqlValue::UInt64(count))])]);
    }

    /// Fail every statement containing `pattern`
    pub fn fail_on(&self, pattern: impl Into<String>, message: impl Into<String>) {
        self.lock().failures.push((pattern.into(), message.into()));
    }

    /// Every statement recorded so far, in order
    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.lock().statements.clone()
    }

    /// SQL text of every statement recorded so far
    pub fn executed_sql(&self) -> Vec<String> {
        self.lock().statements.iter().map(|s| s.sql.clone()).collect()
    }

    /// CREATE/ALTER/DROP statements recorded so far
    pub fn ddl_statements(&self) -> Vec<String> {
        self.lock()
            .statements
            .iter()
            .filter(|s| s.is_ddl())
            .map(|s| s.sql.clone())
            .collect()
    }

    /// Inserted rows of every insert whose SQL contains `pattern`
    pub fn inserted_rows(&self, pattern: &str) -> Vec<Vec<SqlValue>> {
        self.lock()
            .statements
            .iter()
            .filter(|s| s.kind == StatementKind::Insert && s.sql.contains(pattern))
            .flat_map(|s| s.rows.iter().cloned())
            .collect()
    }

    /// Forget recorded statements; scripts and failures are kept
    pub fn clear(&self) {
        self.lock().statements.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A test that panicked while holding the lock leaves consistent state behind
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(
        &self,
        kind: StatementKind,
        ctx: &QueryContext,
        sql: &str,
        args: &[SqlValue],
        rows: Vec<Vec<SqlValue>>,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        state.statements.push(RecordedStatement {
            kind,
            sql: sql.to_string(),
            args: args.to_vec(),
            settings: ctx.settings().clone(),
            rows,
        });
        match state.failures.iter().find(|(pattern, _)| sql.contains(pattern.as_str())) {
            Some((_, message)) => Err(StoreError::connection(message.clone())),
            None => Ok(()),
        }
    }

    fn take_result(&self, sql: &str) -> Vec<Row> {
        let mut state = self.lock();
        let position = state.scripts.iter().position(|s| sql.contains(s.pattern.as_str()));
        match position {
            Some(i) if state.scripts[i].sticky => state.scripts[i].rows.clone(),
            Some(i) => state.scripts.remove(i).rows,
            None => Vec::new(),
        }
    }
}

impl Connection for MemoryConnection {
    fn query(
        &self,
        ctx: &QueryContext,
        sql: &str,
        args: &[SqlValue],
        on_row: &mut dyn FnMut(&Row) -> StoreResult<()>,
    ) -> StoreResult<()> {
        self.record(StatementKind::Query, ctx, sql, args, Vec::new())?;
        for row in self.take_result(sql) {
            on_row(&row)?;
        }
        Ok(())
    }

    fn exec(&self, ctx: &QueryContext, sql: &str, args: &[SqlValue]) -> StoreResult<()> {
        self.record(StatementKind::Exec, ctx, sql, args, Vec::new())
    }

    fn batch_insert(
        &self,
        ctx: &QueryContext,
        sql: &str,
        batch_size: usize,
        rows: &[Vec<SqlValue>],
    ) -> StoreResult<()> {
        for chunk in rows.chunks(batch_size.max(1)) {
            self.record(StatementKind::Insert, ctx, sql, &[], chunk.to_vec())?;
        }
        Ok(())
    }
}
