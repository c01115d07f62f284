//! Table diffing
//!
//! Columns, defaults, indexes, projections, settings and the comment are
//! synced in place. Engine, partition key, sorting key and column type
//! changes would need a table rewrite; they are reported as drift and left
//! alone.

use crate::codec::ColumnSpec;
use crate::ddl::render::{column_definition, index_definition, projection_definition};
use crate::ddl::{normalize_expr, Comment, FullName, IndexSpec, ProjectionSpec, Table};
use crate::sql::{quote_ident, quote_str};

const DEFAULT_CLAUSE: &str = " DEFAULT ";

/// One in-place change of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableChange {
    AddColumn { column: ColumnSpec, after: Option<String> },
    DropColumn(String),
    ModifyDefault { column: String, default: Option<String> },
    AddIndex(IndexSpec),
    DropIndex(String),
    AddProjection(ProjectionSpec),
    DropProjection(String),
    ModifySetting { key: String, value: String },
    ModifyComment(Comment),
}

impl TableChange {
    pub fn to_sql(&self, table: &FullName) -> String {
        let op = match self {
            TableChange::AddColumn { column, after } => {
                let position = match after {
                    Some(after) => format!(" AFTER {}", quote_ident(after)),
                    None => " FIRST".to_string(),
                };
                format!("ADD COLUMN IF NOT EXISTS {}{}", column_definition(column), position)
            }
            TableChange::DropColumn(name) => format!("DROP COLUMN IF EXISTS {}", quote_ident(name)),
            TableChange::ModifyDefault { column, default } => match default {
                Some(default) => format!("MODIFY COLUMN {} DEFAULT {}", quote_ident(column), default),
                None => format!("MODIFY COLUMN {} REMOVE DEFAULT", quote_ident(column)),
            },
            TableChange::AddIndex(index) => {
                format!("ADD {}", index_definition(index).replacen("INDEX", "INDEX IF NOT EXISTS", 1))
            }
            TableChange::DropIndex(name) => format!("DROP INDEX IF EXISTS {}", quote_ident(name)),
            TableChange::AddProjection(projection) => format!(
                "ADD {}",
                projection_definition(projection).replacen("PROJECTION", "PROJECTION IF NOT EXISTS", 1)
            ),
            TableChange::DropProjection(name) => format!("DROP PROJECTION IF EXISTS {}", quote_ident(name)),
            TableChange::ModifySetting { key, value } => format!("MODIFY SETTING {} = {}", key, value),
            TableChange::ModifyComment(comment) => format!("MODIFY COMMENT {}", quote_str(&comment.to_string())),
        };
        format!("ALTER TABLE {} {}", table, op)
    }

    /// Apply the change to an in-memory table
    pub fn apply(&self, table: &mut Table) {
        match self {
            TableChange::AddColumn { column, after } => {
                if table.column(&column.name).is_some() {
                    return;
                }
                let at = match after {
                    Some(after) => table
                        .columns
                        .iter()
                        .position(|c| &c.name == after)
                        .map_or(table.columns.len(), |i| i + 1),
                    None => 0,
                };
                table.columns.insert(at, column.clone());
            }
            TableChange::DropColumn(name) => table.columns.retain(|c| &c.name != name),
            TableChange::ModifyDefault { column, default } => {
                if let Some(spec) = table.columns.iter_mut().find(|c| &c.name == column) {
                    let (ty, _) = split_default(&spec.ty);
                    spec.ty = match default {
                        Some(default) => format!("{}{}{}", ty, DEFAULT_CLAUSE, default),
                        None => ty.to_string(),
                    };
                }
            }
            TableChange::AddIndex(index) => table.indexes.push(index.clone()),
            TableChange::DropIndex(name) => table.indexes.retain(|i| &i.name != name),
            TableChange::AddProjection(projection) => table.projections.push(projection.clone()),
            TableChange::DropProjection(name) => table.projections.retain(|p| &p.name != name),
            TableChange::ModifySetting { key, value } => {
                table.settings.insert(key.clone(), value.clone());
            }
            TableChange::ModifyComment(comment) => table.comment = comment.clone(),
        }
    }
}

/// Split a column type from its `DEFAULT` expression
pub fn split_default(ty: &str) -> (&str, Option<&str>) {
    match ty.find(DEFAULT_CLAUSE) {
        Some(at) => (&ty[..at], Some(&ty[at + DEFAULT_CLAUSE.len()..])),
        None => (ty, None),
    }
}

/// Changes bringing `pre` to `cur`, plus unapplied drift
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDiff {
    pub changes: Vec<TableChange>,
    pub drift: Vec<String>,
}

/// Diff an existing table against its expected definition
pub fn sync_table(pre: &Table, cur: &Table) -> TableDiff {
    let mut diff = TableDiff::default();
    let table = &cur.name.name;

    if pre.engine.name() != cur.engine.name() {
        diff.drift.push(format!(
            "{}: engine {} differs from expected {}",
            table,
            pre.engine.name(),
            cur.engine.name()
        ));
    }
    let partition = |t: &Table| t.partition_by.as_deref().map(normalize_expr).unwrap_or_default();
    if partition(pre) != partition(cur) {
        diff.drift.push(format!("{}: partition key differs", table));
    }
    let order = |t: &Table| t.order_by.iter().map(|c| normalize_expr(c)).collect::<Vec<_>>();
    if order(pre) != order(cur) {
        diff.drift.push(format!(
            "{}: sorting key ({}) differs from expected ({})",
            table,
            pre.order_by.join(", "),
            cur.order_by.join(", ")
        ));
    }

    // Indexes and projections go first so dropped columns are no longer referenced
    for index in &pre.indexes {
        let keep = cur
            .indexes
            .iter()
            .any(|i| i.name == index.name && i.same_definition(index));
        if !keep {
            diff.changes.push(TableChange::DropIndex(index.name.clone()));
        }
    }
    for projection in &pre.projections {
        if !cur.projections.iter().any(|p| p.same_definition(projection)) {
            diff.changes.push(TableChange::DropProjection(projection.name.clone()));
        }
    }

    for column in &pre.columns {
        if cur.column(&column.name).is_none() {
            diff.changes.push(TableChange::DropColumn(column.name.clone()));
        }
    }
    let mut previous: Option<String> = None;
    for column in &cur.columns {
        match pre.column(&column.name) {
            None => diff.changes.push(TableChange::AddColumn {
                column: column.clone(),
                after: previous.clone(),
            }),
            Some(existing) => {
                let (old_ty, old_default) = split_default(&existing.ty);
                let (new_ty, new_default) = split_default(&column.ty);
                if old_ty != new_ty {
                    diff.drift.push(format!(
                        "{}: column {} is {}, expected {}",
                        table, column.name, old_ty, new_ty
                    ));
                }
                if old_default != new_default {
                    diff.changes.push(TableChange::ModifyDefault {
                        column: column.name.clone(),
                        default: new_default.map(str::to_string),
                    });
                }
            }
        }
        previous = Some(column.name.clone());
    }

    for index in &cur.indexes {
        let present = pre
            .indexes
            .iter()
            .any(|i| i.name == index.name && i.same_definition(index));
        if !present {
            diff.changes.push(TableChange::AddIndex(index.clone()));
        }
    }
    for projection in &cur.projections {
        if !pre.projections.iter().any(|p| p.same_definition(projection)) {
            diff.changes.push(TableChange::AddProjection(projection.clone()));
        }
    }

    // Settings are additive: settings no longer expected are left in place
    for (key, value) in &cur.settings {
        if pre.settings.get(key) != Some(value) {
            diff.changes.push(TableChange::ModifySetting {
                key: key.clone(),
                value: value.clone(),
            });
        }
    }

    if pre.comment != cur.comment {
        diff.changes.push(TableChange::ModifyComment(cur.comment.clone()));
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::Engine;
    use std::collections::BTreeMap;

    fn table(columns: &[(&str, &str)], hash: &str) -> Table {
        Table {
            name: FullName::new("db", "p1_entity_Pool"),
            columns: columns.iter().map(|(n, t)| ColumnSpec::new(*n, *t)).collect(),
            indexes: vec![],
            projections: vec![],
            engine: Engine::ReplacingMergeTree,
            partition_by: Some("`__genBlockChain`".into()),
            order_by: vec!["__genBlockChain".into(), "id".into()],
            settings: BTreeMap::new(),
            comment: Comment::new(hash),
        }
    }

    #[test]
    fn test_identical_tables_have_no_changes() {
        let t = table(&[("id", "String")], "a");
        assert_eq!(sync_table(&t, &t), TableDiff::default());
    }

    #[test]
    fn test_add_and_drop_columns() {
        let pre = table(&[("id", "String"), ("old", "Int32")], "a");
        let cur = table(&[("id", "String"), ("fee", "Nullable(Int32)")], "b");
        let diff = sync_table(&pre, &cur);
        assert_eq!(
            diff.changes,
            vec![
                TableChange::DropColumn("old".into()),
                TableChange::AddColumn {
                    column: ColumnSpec::new("fee", "Nullable(Int32)"),
                    after: Some("id".into()),
                },
                TableChange::ModifyComment(Comment::new("b")),
            ]
        );
        assert_eq!(
            diff.changes[1].to_sql(&cur.name),
            "ALTER TABLE `db`.`p1_entity_Pool` ADD COLUMN IF NOT EXISTS `fee` Nullable(Int32) AFTER `id`"
        );
        assert!(diff.drift.is_empty());
    }

    #[test]
    fn test_type_and_engine_changes_are_drift() {
        let pre = table(&[("id", "String"), ("fee", "Int32")], "a");
        let mut cur = table(&[("id", "String"), ("fee", "Int64")], "a");
        cur.engine = Engine::MergeTree;
        let diff = sync_table(&pre, &cur);
        assert!(diff.changes.is_empty());
        assert_eq!(diff.drift.len(), 2);
    }

    #[test]
    fn test_default_change() {
        let pre = table(&[("ts", "DateTime64(6, 'UTC')")], "a");
        let cur = table(&[("ts", "DateTime64(6, 'UTC') DEFAULT now64(6)")], "a");
        let diff = sync_table(&pre, &cur);
        assert_eq!(
            diff.changes[0].to_sql(&cur.name),
            "ALTER TABLE `db`.`p1_entity_Pool` MODIFY COLUMN `ts` DEFAULT now64(6)"
        );
    }

    #[test]
    fn test_index_changes() {
        let index = IndexSpec {
            name: "idx_owner".into(),
            expr: "`owner`".into(),
            kind: "bloom_filter".into(),
            granularity: 1,
        };
        let mut pre = table(&[("id", "String")], "a");
        pre.indexes.push(IndexSpec {
            expr: "owner".into(),
            ..index.clone()
        });
        let mut cur = pre.clone();
        cur.indexes = vec![index.clone()];
        assert!(sync_table(&pre, &cur).changes.is_empty());

        cur.indexes[0].granularity = 4;
        let diff = sync_table(&pre, &cur);
        assert_eq!(diff.changes[0], TableChange::DropIndex("idx_owner".into()));
        assert!(matches!(diff.changes[1], TableChange::AddIndex(_)));
        assert_eq!(
            diff.changes[1].to_sql(&cur.name),
            "ALTER TABLE `db`.`p1_entity_Pool` ADD INDEX IF NOT EXISTS `idx_owner` `owner` TYPE bloom_filter GRANULARITY 4"
        );
    }

    #[test]
    fn test_settings_are_additive() {
        let mut pre = table(&[("id", "String")], "a");
        pre.settings.insert("index_granularity".into(), "8192".into());
        let mut cur = table(&[("id", "String")], "a");
        cur.settings.insert("ttl_only_drop_parts".into(), "1".into());
        let diff = sync_table(&pre, &cur);
        assert_eq!(
            diff.changes,
            vec![TableChange::ModifySetting {
                key: "ttl_only_drop_parts".into(),
                value: "1".into(),
            }]
        );
    }

    #[test]
    fn test_apply_reaches_expected() {
        let pre = table(&[("id", "String"), ("old", "Int32")], "a");
        let cur = table(&[("id", "String"), ("fee", "Nullable(Int32)"), ("x", "Bool")], "b");
        let mut applied = pre.clone();
        for change in sync_table(&pre, &cur).changes {
            change.apply(&mut applied);
        }
        assert_eq!(applied, cur);
    }
}
