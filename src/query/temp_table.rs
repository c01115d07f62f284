//! Temporary id tables
//!
//! Id sets too large for inline parameters are inserted into a session
//! temporary table and matched with a subquery. The table is dropped when the
//! guard goes out of scope, on success and on error alike; a failed drop is
//! logged and otherwise ignored since the session reclaims it eventually.

use uuid::Uuid;

use crate::codec::meta;
use crate::error::StoreResult;
use crate::observability::{Event, Logger};
use crate::sql::{quote_ident, QueryContext, SqlValue, StatementExecutor, SETTING_SESSION_ID};

/// Context whose statements share one new session
pub fn session_context(ctx: &QueryContext) -> QueryContext {
    match ctx.setting(SETTING_SESSION_ID) {
        Some(_) => ctx.clone(),
        None => ctx.with_setting(SETTING_SESSION_ID, Uuid::new_v4().to_string()),
    }
}

/// Guard owning one temporary table of ids
pub struct TempIdTable<'a> {
    exec: StatementExecutor<'a>,
    ctx: QueryContext,
    name: String,
}

impl<'a> TempIdTable<'a> {
    /// Create the table and fill it in batches
    ///
    /// `ctx` must carry a session id; see `session_context`.
    pub fn create(
        exec: StatementExecutor<'a>,
        ctx: &QueryContext,
        id_type: &str,
        ids: &[SqlValue],
        batch_size: usize,
    ) -> StoreResult<Self> {
        let name = format!("tmp_ids_{}", Uuid::new_v4().simple());
        exec.exec(
            ctx,
            &format!(
                "CREATE TEMPORARY TABLE {} ({} {}) ENGINE = Memory",
                quote_ident(&name),
                quote_ident(meta::ID),
                id_type
            ),
            &[],
        )?;
        let table = Self {
            exec,
            ctx: ctx.clone(),
            name,
        };
        Logger::trace(Event::TempTableCreated, &[("table", &table.name), ("ids", &ids.len().to_string())]);

        let rows: Vec<Vec<SqlValue>> = ids.iter().map(|id| vec![id.clone()]).collect();
        table.exec.batch_insert(
            &table.ctx,
            &format!("INSERT INTO {} ({}) VALUES", quote_ident(&table.name), quote_ident(meta::ID)),
            batch_size,
            &rows,
        )?;
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `id [NOT] IN (SELECT id FROM tmp)`
    pub fn membership(&self, negated: bool) -> String {
        format!(
            "{id} {op} (SELECT {id} FROM {table})",
            id = quote_ident(meta::ID),
            op = if negated { "NOT IN" } else { "IN" },
            table = quote_ident(&self.name)
        )
    }
}

impl Drop for TempIdTable<'_> {
    fn drop(&mut self) {
        let sql = format!("DROP TEMPORARY TABLE IF EXISTS {}", quote_ident(&self.name));
        if let Err(err) = self.exec.exec(&self.ctx, &sql, &[]) {
            Logger::warn(
                Event::TempTableCleanupFailed,
                &[("table", &self.name), ("error", &err.to_string())],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MetricsRegistry;
    use crate::sql::{MemoryConnection, StatementKind};

    fn ids(n: usize) -> Vec<SqlValue> {
        (0..n).map(|i| SqlValue::String(format!("id{}", i))).collect()
    }

    #[test]
    fn test_lifecycle() {
        let conn = MemoryConnection::new();
        let metrics = MetricsRegistry::new();
        let exec = StatementExecutor::new(&conn, &metrics, 1_000);
        let ctx = session_context(&QueryContext::new());
        {
            let table = TempIdTable::create(exec, &ctx, "String", &ids(5), 2).unwrap();
            assert_eq!(
                table.membership(true),
                format!("`id` NOT IN (SELECT `id` FROM `{}`)", table.name())
            );
        }
        let stmts = conn.statements();
        assert_eq!(stmts.len(), 5);
        assert!(stmts[0].sql.starts_with("CREATE TEMPORARY TABLE"));
        assert_eq!(stmts.iter().filter(|s| s.kind == StatementKind::Insert).count(), 3);
        assert!(stmts[4].sql.starts_with("DROP TEMPORARY TABLE IF EXISTS"));
        let session = ctx.setting(SETTING_SESSION_ID).unwrap();
        assert!(stmts
            .iter()
            .all(|s| s.settings.get(SETTING_SESSION_ID).map(String::as_str) == Some(session)));
    }

    #[test]
    fn test_dropped_when_fill_fails() {
        let conn = MemoryConnection::new();
        conn.fail_on("INSERT INTO", "too many parts");
        let metrics = MetricsRegistry::new();
        let exec = StatementExecutor::new(&conn, &metrics, 1_000);
        let ctx = session_context(&QueryContext::new());
        assert!(TempIdTable::create(exec, &ctx, "String", &ids(3), 10).is_err());
        let sql = conn.executed_sql();
        assert!(sql.last().unwrap().starts_with("DROP TEMPORARY TABLE"));
    }

    #[test]
    fn test_cleanup_failure_is_swallowed() {
        let conn = MemoryConnection::new();
        conn.fail_on("DROP TEMPORARY", "session expired");
        let metrics = MetricsRegistry::new();
        let exec = StatementExecutor::new(&conn, &metrics, 1_000);
        let ctx = session_context(&QueryContext::new());
        let table = TempIdTable::create(exec, &ctx, "String", &ids(1), 10).unwrap();
        drop(table);
        assert_eq!(metrics.snapshot().statement_failures, 1);
    }

    #[test]
    fn test_session_is_kept() {
        let ctx = QueryContext::new().with_setting(SETTING_SESSION_ID, "s1");
        assert_eq!(session_context(&ctx).setting(SETTING_SESSION_ID), Some("s1"));
    }
}
