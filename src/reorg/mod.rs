//! Reorg engine
//!
//! Rolls a chain back to a block:
//! 1. delete rows above the block from every primary table, synchronously
//! 2. for collapsing entities, compare live ids of the raw table with live
//!    ids of the collapsed table
//! 3. on mismatch, drop the chain's partition of the collapsed table and
//!    copy it again from the raw table
//!
//! A mismatch means a retraction and the row it cancels no longer agree,
//! typically because a background merge collapsed a pair whose successor was
//! just deleted. Steps 1 and 2 are idempotent; step 3 is not atomic and is
//! only repeated by running the whole reorg again.

use crate::codec::meta;
use crate::ddl::{FullName, Layout};
use crate::error::StoreResult;
use crate::observability::{Event, Logger, ObservationScope};
use crate::sql::{quote_ident, quote_str, QueryContext, SqlValue, StatementExecutor, SETTING_MUTATIONS_SYNC};

/// Wait for the mutation on every replica
const MUTATIONS_SYNC_ALL: &str = "2";

/// One type rolled back by a reorg
#[derive(Debug, Clone)]
pub struct ReorgTarget<'a> {
    pub name: &'a str,
    pub layout: &'a Layout,
    /// Columns copied when a collapsed partition is rebuilt
    pub columns: Vec<String>,
}

/// What a reorg touched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorgReport {
    pub tables: usize,
    pub rebuilt: Vec<String>,
}

pub struct ReorgEngine<'a> {
    exec: StatementExecutor<'a>,
}

impl<'a> ReorgEngine<'a> {
    pub fn new(exec: StatementExecutor<'a>) -> Self {
        Self { exec }
    }

    pub fn reorg(
        &self,
        ctx: &QueryContext,
        targets: &[ReorgTarget<'_>],
        block_number: u64,
        chain: &str,
    ) -> StoreResult<ReorgReport> {
        let block = block_number.to_string();
        let scope = ObservationScope::new(
            Event::ReorgBegin,
            Event::ReorgComplete,
            Event::ReorgFailed,
            &[("chain", chain), ("block", &block)],
        );
        self.exec.metrics().increment_reorgs();
        match self.run(ctx, targets, block_number, chain) {
            Ok(report) => {
                let tables = report.tables.to_string();
                let rebuilt = report.rebuilt.len().to_string();
                scope.complete(&[("tables", &tables), ("rebuilt", &rebuilt)]);
                Ok(report)
            }
            Err(err) => {
                scope.fail(&err.to_string());
                Err(err)
            }
        }
    }

    fn run(&self, ctx: &QueryContext, targets: &[ReorgTarget<'_>], block_number: u64, chain: &str) -> StoreResult<ReorgReport> {
        let sync_ctx = ctx.with_setting(SETTING_MUTATIONS_SYNC, MUTATIONS_SYNC_ALL);
        let mut report = ReorgReport::default();
        for target in targets {
            for table in target.layout.primary_tables() {
                self.delete_above(&sync_ctx, table, block_number, chain)?;
                report.tables += 1;
            }
            if let Layout::Collapsing { raw, collapsed } = target.layout {
                if !self.is_consistent(ctx, raw, collapsed, block_number, chain)? {
                    self.rebuild(&sync_ctx, target, raw, collapsed, chain)?;
                    report.rebuilt.push(target.name.to_string());
                }
            }
        }
        Ok(report)
    }

    fn delete_above(&self, ctx: &QueryContext, table: &FullName, block_number: u64, chain: &str) -> StoreResult<()> {
        let sql = format!(
            "ALTER TABLE {} DELETE WHERE {} = ? AND {} > ?",
            table,
            quote_ident(meta::CHAIN),
            quote_ident(meta::BLOCK_NUMBER)
        );
        self.exec.exec(
            ctx,
            &sql,
            &[SqlValue::String(chain.to_string()), SqlValue::UInt64(block_number)],
        )
    }

    fn is_consistent(
        &self,
        ctx: &QueryContext,
        raw: &FullName,
        collapsed: &FullName,
        block_number: u64,
        chain: &str,
    ) -> StoreResult<bool> {
        let id = quote_ident(meta::ID);
        let chain_col = quote_ident(meta::CHAIN);
        let raw_sql = format!(
            "SELECT count(DISTINCT {id}) AS count FROM {raw} WHERE {chain} = ? AND {block} <= ?",
            id = id,
            raw = raw,
            chain = chain_col,
            block = quote_ident(meta::BLOCK_NUMBER),
        );
        let raw_count = self.exec.query_count(
            ctx,
            &raw_sql,
            &[SqlValue::String(chain.to_string()), SqlValue::UInt64(block_number)],
        )?;
        let collapsed_sql = format!(
            "SELECT count(DISTINCT {id}) AS count FROM (SELECT {id} FROM {collapsed} WHERE {chain} = ? GROUP BY {id}, {version} HAVING sum({sign}) > 0)",
            id = id,
            collapsed = collapsed,
            chain = chain_col,
            version = quote_ident(meta::VERSION),
            sign = quote_ident(meta::SIGN),
        );
        let collapsed_count = self
            .exec
            .query_count(ctx, &collapsed_sql, &[SqlValue::String(chain.to_string())])?;
        if raw_count == collapsed_count {
            return Ok(true);
        }
        Logger::warn(
            Event::CollapseMismatch,
            &[
                ("table", &collapsed.name),
                ("chain", chain),
                ("raw_ids", &raw_count.to_string()),
                ("collapsed_ids", &collapsed_count.to_string()),
            ],
        );
        Ok(false)
    }

    fn rebuild(
        &self,
        ctx: &QueryContext,
        target: &ReorgTarget<'_>,
        raw: &FullName,
        collapsed: &FullName,
        chain: &str,
    ) -> StoreResult<()> {
        self.exec.exec(
            ctx,
            &format!("ALTER TABLE {} DROP PARTITION {}", collapsed, quote_str(chain)),
            &[],
        )?;
        let columns: Vec<String> = target.columns.iter().map(|c| quote_ident(c)).collect();
        let columns = columns.join(", ");
        let sql = format!(
            "INSERT INTO {collapsed} ({cols}) SELECT {cols} FROM {raw} WHERE {chain} = ?",
            collapsed = collapsed,
            cols = columns,
            raw = raw,
            chain = quote_ident(meta::CHAIN),
        );
        self.exec.exec(ctx, &sql, &[SqlValue::String(chain.to_string())])?;
        self.exec.metrics().increment_partition_rebuilds();
        Logger::info(Event::PartitionRebuilt, &[("table", &collapsed.name), ("chain", chain)]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MetricsRegistry;
    use crate::sql::MemoryConnection;

    fn collapsing() -> Layout {
        Layout::Collapsing {
            raw: FullName::new("db", "p1_versionedEntity_Pool"),
            collapsed: FullName::new("db", "p1_versionedLatestEntity_Pool"),
        }
    }

    fn target(layout: &Layout) -> ReorgTarget<'_> {
        ReorgTarget {
            name: "Pool",
            layout,
            columns: vec!["id".into(), "__sign".into(), "__version".into()],
        }
    }

    #[test]
    fn test_consistent_reorg_only_deletes() {
        let conn = MemoryConnection::new();
        conn.script_count("FROM `db`.`p1_versionedEntity_Pool`", 4);
        conn.script_count("HAVING sum(`__sign`) > 0", 4);
        let metrics = MetricsRegistry::new();
        let layout = collapsing();
        let report = ReorgEngine::new(StatementExecutor::new(&conn, &metrics, 1_000))
            .reorg(&QueryContext::new(), &[target(&layout)], 15, "eth")
            .unwrap();
        assert_eq!(report.tables, 2);
        assert!(report.rebuilt.is_empty());

        let stmts = conn.statements();
        assert_eq!(
            stmts[0].sql,
            "ALTER TABLE `db`.`p1_versionedEntity_Pool` DELETE WHERE `__genBlockChain` = ? AND `__genBlockNumber` > ?"
        );
        assert_eq!(stmts[0].args, vec![SqlValue::String("eth".into()), SqlValue::UInt64(15)]);
        assert_eq!(
            stmts[0].settings.get(SETTING_MUTATIONS_SYNC).map(String::as_str),
            Some(MUTATIONS_SYNC_ALL)
        );
        assert!(stmts[1].sql.starts_with("ALTER TABLE `db`.`p1_versionedLatestEntity_Pool` DELETE"));
        assert_eq!(stmts.len(), 4);
        assert_eq!(metrics.snapshot().reorgs, 1);
    }

    #[test]
    fn test_mismatch_rebuilds_partition() {
        let conn = MemoryConnection::new();
        conn.script_count("count(DISTINCT `id`) AS count FROM `db`.`p1_versionedEntity_Pool`", 4);
        conn.script_count("HAVING sum(`__sign`) > 0", 3);
        let metrics = MetricsRegistry::new();
        let layout = collapsing();
        let report = ReorgEngine::new(StatementExecutor::new(&conn, &metrics, 1_000))
            .reorg(&QueryContext::new(), &[target(&layout)], 15, "eth")
            .unwrap();
        assert_eq!(report.rebuilt, vec!["Pool".to_string()]);

        let sql = conn.executed_sql();
        assert_eq!(sql[4], "ALTER TABLE `db`.`p1_versionedLatestEntity_Pool` DROP PARTITION 'eth'");
        assert_eq!(
            sql[5],
            "INSERT INTO `db`.`p1_versionedLatestEntity_Pool` (`id`, `__sign`, `__version`) SELECT `id`, `__sign`, `__version` FROM `db`.`p1_versionedEntity_Pool` WHERE `__genBlockChain` = ?"
        );
        assert_eq!(metrics.snapshot().partition_rebuilds, 1);
    }

    #[test]
    fn test_plain_tables_only_delete() {
        let conn = MemoryConnection::new();
        let metrics = MetricsRegistry::new();
        let layout = Layout::Plain {
            table: FullName::new("db", "p1_entity_Pool"),
        };
        let aggregation = Layout::Aggregation {
            table: FullName::new("db", "p1_aggregation_Daily"),
        };
        let targets = vec![target(&layout), target(&aggregation)];
        let report = ReorgEngine::new(StatementExecutor::new(&conn, &metrics, 1_000))
            .reorg(&QueryContext::new(), &targets, 15, "eth")
            .unwrap();
        assert_eq!(report.tables, 2);
        assert_eq!(conn.statements().len(), 2);
    }

    #[test]
    fn test_failed_delete_fails_the_reorg() {
        let conn = MemoryConnection::new();
        conn.fail_on("DELETE", "timeout");
        let metrics = MetricsRegistry::new();
        let layout = collapsing();
        let result = ReorgEngine::new(StatementExecutor::new(&conn, &metrics, 1_000)).reorg(
            &QueryContext::new(),
            &[target(&layout)],
            15,
            "eth",
        );
        assert!(result.is_err());
        assert_eq!(conn.statements().len(), 1);
    }
}
