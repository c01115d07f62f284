//! Migration planning
//!
//! `plan_sync` is pure: existing and expected objects in, typed steps out.
//! An object is left alone when its stored schema hash equals the expected
//! one. Otherwise tables are altered in place, views are replaced and
//! materialized views are dropped and recreated. Objects that changed kind
//! are dropped and recreated; objects no longer expected are dropped last,
//! views before materialized views before tables.

use std::collections::BTreeMap;

use crate::ddl::{render, ExpectedObject, FullName, ObjectKind, TableOrView, View};
use crate::observability::Event;

use super::diff::{sync_table, TableChange};

/// One DDL statement of a migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStep {
    Create(TableOrView),
    Alter { table: FullName, change: TableChange },
    Replace(View),
    Drop { kind: ObjectKind, name: FullName },
}

impl MigrationStep {
    pub fn to_sql(&self) -> String {
        match self {
            MigrationStep::Create(object) => render::create(object),
            MigrationStep::Alter { table, change } => change.to_sql(table),
            MigrationStep::Replace(view) => render::create_view(view),
            MigrationStep::Drop { kind, name } => render::drop(*kind, name),
        }
    }

    pub fn event(&self) -> Event {
        match self {
            MigrationStep::Create(_) => Event::ObjectCreated,
            MigrationStep::Alter { .. } => Event::ObjectAltered,
            MigrationStep::Replace(_) => Event::ObjectReplaced,
            MigrationStep::Drop { .. } => Event::ObjectDropped,
        }
    }

    pub fn object_name(&self) -> &FullName {
        match self {
            MigrationStep::Create(object) => object.full_name(),
            MigrationStep::Alter { table, .. } => table,
            MigrationStep::Replace(view) => &view.name,
            MigrationStep::Drop { name, .. } => name,
        }
    }
}

/// Ordered steps plus drift left unapplied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    pub steps: Vec<MigrationStep>,
    pub drift: Vec<String>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn statements(&self) -> Vec<String> {
        self.steps.iter().map(MigrationStep::to_sql).collect()
    }
}

/// Plan the steps turning `existing` into `expected`
///
/// With `views_only`, tables and materialized views are neither created,
/// altered nor dropped.
pub fn plan_sync(existing: &[TableOrView], expected: &[ExpectedObject], views_only: bool) -> MigrationPlan {
    let in_scope = |kind: ObjectKind| !views_only || kind == ObjectKind::View;
    let by_name: BTreeMap<&str, &TableOrView> = existing
        .iter()
        .map(|o| (o.full_name().name.as_str(), o))
        .collect();
    let mut plan = MigrationPlan::default();

    let mut ordered: Vec<&ExpectedObject> = expected.iter().filter(|e| in_scope(e.object.kind())).collect();
    ordered.sort_by_key(|e| e.order);

    for want in ordered {
        let name = &want.object.full_name().name;
        let have = match by_name.get(name.as_str()) {
            Some(have) => *have,
            None => {
                plan.steps.push(MigrationStep::Create(want.object.clone()));
                continue;
            }
        };
        if have.kind() != want.object.kind() {
            plan.steps.push(MigrationStep::Drop {
                kind: have.kind(),
                name: have.full_name().clone(),
            });
            plan.steps.push(MigrationStep::Create(want.object.clone()));
            continue;
        }
        if have.schema_hash().is_some() && have.schema_hash() == want.object.schema_hash() {
            continue;
        }
        match (&want.object, have) {
            (TableOrView::Table(cur), TableOrView::Table(pre)) => {
                let diff = sync_table(pre, cur);
                plan.drift.extend(diff.drift);
                plan.steps.extend(diff.changes.into_iter().map(|change| MigrationStep::Alter {
                    table: cur.name.clone(),
                    change,
                }));
            }
            (TableOrView::View(view), _) => plan.steps.push(MigrationStep::Replace(view.clone())),
            (object, _) => {
                plan.steps.push(MigrationStep::Drop {
                    kind: object.kind(),
                    name: object.full_name().clone(),
                });
                plan.steps.push(MigrationStep::Create(object.clone()));
            }
        }
    }

    let mut stale: Vec<&TableOrView> = existing
        .iter()
        .filter(|o| in_scope(o.kind()))
        .filter(|o| !expected.iter().any(|e| e.object.full_name() == o.full_name()))
        .collect();
    stale.sort_by(|a, b| b.kind().cmp(&a.kind()).then_with(|| a.full_name().cmp(b.full_name())));
    plan.steps.extend(stale.into_iter().map(|o| MigrationStep::Drop {
        kind: o.kind(),
        name: o.full_name().clone(),
    }));
    plan
}
