//! Schema migration engine
//!
//! Reconciles the objects that exist in the database with the objects the
//! schema expects:
//!
//! - `diff`: column, index, projection, setting and comment changes of one table
//! - `plan`: pure planning of typed steps over whole object sets
//! - `catalog`: where existing objects come from
//!
//! Engine, partition, sorting key and column type changes are never
//! applied; they are reported as drift.

pub mod catalog;
pub mod diff;
pub mod plan;

pub use catalog::{MemoryCatalog, ObjectCatalog, SystemCatalog};
pub use diff::{sync_table, TableChange, TableDiff};
pub use plan::{plan_sync, MigrationPlan, MigrationStep};

use crate::ddl::{ExpectedObject, Naming, TableOrView};
use crate::error::StoreResult;
use crate::observability::{Event, Logger, ObservationScope};
use crate::sql::{QueryContext, StatementExecutor};

/// Applies migration plans through a statement executor
pub struct Migrator<'a> {
    exec: StatementExecutor<'a>,
    catalog: &'a dyn ObjectCatalog,
    naming: &'a Naming,
}

impl<'a> Migrator<'a> {
    pub fn new(exec: StatementExecutor<'a>, catalog: &'a dyn ObjectCatalog, naming: &'a Naming) -> Self {
        Self { exec, catalog, naming }
    }

    /// Existing objects named by this processor
    ///
    /// Objects of processors sharing the prefix (`p1` and `p1_x`) are
    /// filtered out by parsing the full name.
    pub fn existing(&self, ctx: &QueryContext) -> StoreResult<Vec<TableOrView>> {
        let objects = self.catalog.load(&self.exec, ctx, self.naming)?;
        Ok(objects
            .into_iter()
            .filter(|o| self.naming.parse(&o.full_name().name).is_some())
            .collect())
    }

    /// Plan without applying
    pub fn plan(&self, ctx: &QueryContext, expected: &[ExpectedObject], views_only: bool) -> StoreResult<MigrationPlan> {
        let existing = self.existing(ctx)?;
        Ok(plan_sync(&existing, expected, views_only))
    }

    /// Plan and apply; returns the applied plan
    pub fn sync(&self, ctx: &QueryContext, expected: &[ExpectedObject], views_only: bool) -> StoreResult<MigrationPlan> {
        let scope = ObservationScope::new(
            Event::SchemaSyncBegin,
            Event::SchemaSyncComplete,
            Event::SchemaSyncFailed,
            &[
                ("processor", self.naming.prefix().trim_end_matches('_')),
                ("views_only", if views_only { "true" } else { "false" }),
            ],
        );
        let plan = match self.plan(ctx, expected, views_only) {
            Ok(plan) => plan,
            Err(err) => {
                scope.fail(&err.to_string());
                return Err(err);
            }
        };
        self.report_drift(&plan);
        if let Err(err) = self.apply(ctx, &plan) {
            scope.fail(&err.to_string());
            return Err(err);
        }
        let applied = plan.steps.len().to_string();
        let drift = plan.drift.len().to_string();
        scope.complete(&[("steps", &applied), ("drift", &drift)]);
        Ok(plan)
    }

    /// Execute the steps in order, stopping at the first failure
    pub fn apply(&self, ctx: &QueryContext, plan: &MigrationPlan) -> StoreResult<()> {
        for step in &plan.steps {
            let sql = step.to_sql();
            self.exec.exec(ctx, &sql, &[])?;
            self.catalog.record(step);
            self.exec.metrics().add_objects_migrated(1);
            let name = step.object_name().to_string();
            Logger::info(step.event(), &[("object", &name)]);
        }
        Ok(())
    }

    fn report_drift(&self, plan: &MigrationPlan) {
        for detail in &plan.drift {
            Logger::warn(Event::MigrationDrift, &[("detail", detail)]);
        }
        self.exec.metrics().add_drift_warnings(plan.drift.len() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ColumnSpec;
    use crate::ddl::{ApplyOrder, Comment, Engine, FullName, Table};
    use crate::observability::MetricsRegistry;
    use crate::sql::MemoryConnection;
    use std::collections::BTreeMap;

    fn table(name: &str, hash: &str, engine: Engine) -> TableOrView {
        TableOrView::Table(Table {
            name: FullName::new("db", name),
            columns: vec![ColumnSpec::new("id", "String")],
            indexes: vec![],
            projections: vec![],
            engine,
            partition_by: None,
            order_by: vec!["id".into()],
            settings: BTreeMap::new(),
            comment: Comment::new(hash),
        })
    }

    #[test]
    fn test_sync_twice_is_idempotent() {
        let conn = MemoryConnection::new();
        let metrics = MetricsRegistry::new();
        let catalog = MemoryCatalog::new();
        let naming = Naming::new("db", "p1");
        let exec = StatementExecutor::new(&conn, &metrics, 1_000);
        let migrator = Migrator::new(exec, &catalog, &naming);
        let expected = vec![ExpectedObject {
            order: ApplyOrder::Table,
            object: table("p1_entity_A", "h1", Engine::ReplacingMergeTree),
        }];

        let first = migrator.sync(&QueryContext::new(), &expected, false).unwrap();
        assert_eq!(first.steps.len(), 1);
        conn.clear();
        let second = migrator.sync(&QueryContext::new(), &expected, false).unwrap();
        assert!(second.is_empty());
        assert!(conn.ddl_statements().is_empty());
        assert_eq!(metrics.snapshot().objects_migrated, 1);
    }

    #[test]
    fn test_other_processors_are_ignored() {
        let conn = MemoryConnection::new();
        let metrics = MetricsRegistry::new();
        let catalog = MemoryCatalog::new();
        catalog.insert(table("p1_x_entity_A", "h", Engine::MergeTree));
        let naming = Naming::new("db", "p1");
        let migrator = Migrator::new(StatementExecutor::new(&conn, &metrics, 1_000), &catalog, &naming);
        let plan = migrator.sync(&QueryContext::new(), &[], false).unwrap();
        assert!(plan.is_empty());
        assert!(catalog.get("p1_x_entity_A").is_some());
    }

    #[test]
    fn test_drift_is_counted_not_applied() {
        let conn = MemoryConnection::new();
        let metrics = MetricsRegistry::new();
        let catalog = MemoryCatalog::new();
        catalog.insert(table("p1_entity_A", "old", Engine::MergeTree));
        let naming = Naming::new("db", "p1");
        let migrator = Migrator::new(StatementExecutor::new(&conn, &metrics, 1_000), &catalog, &naming);
        let expected = vec![ExpectedObject {
            order: ApplyOrder::Table,
            object: table("p1_entity_A", "new", Engine::ReplacingMergeTree),
        }];
        let plan = migrator.sync(&QueryContext::new(), &expected, false).unwrap();
        assert_eq!(plan.drift.len(), 1);
        assert_eq!(metrics.snapshot().drift_warnings, 1);
        let ddl = conn.ddl_statements();
        assert_eq!(ddl.len(), 1);
        assert!(ddl[0].contains("MODIFY COMMENT"));
    }

    #[test]
    fn test_failed_step_stops_the_sync() {
        let conn = MemoryConnection::new();
        conn.fail_on("p1_view_A", "denied");
        let metrics = MetricsRegistry::new();
        let catalog = MemoryCatalog::new();
        let naming = Naming::new("db", "p1");
        let migrator = Migrator::new(StatementExecutor::new(&conn, &metrics, 1_000), &catalog, &naming);
        let expected = vec![
            ExpectedObject {
                order: ApplyOrder::Table,
                object: table("p1_entity_A", "h", Engine::MergeTree),
            },
            ExpectedObject {
                order: ApplyOrder::EntityView,
                object: TableOrView::View(crate::ddl::View {
                    name: FullName::new("db", "p1_view_A"),
                    select: "SELECT 1".into(),
                    comment: Comment::new("h"),
                }),
            },
        ];
        assert!(migrator.sync(&QueryContext::new(), &expected, false).is_err());
        assert!(catalog.get("p1_entity_A").is_some());
        assert!(catalog.get("p1_view_A").is_none());
    }
}
