//! Existing object catalogs
//!
//! `SystemCatalog` reads the database's system tables; projections and
//! settings are parsed out of the stored `CREATE` statement since no system
//! table lists them. `MemoryCatalog` keeps objects in memory and tracks
//! applied steps, for tests and dry runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use regex::Regex;

use crate::codec::{meta, ColumnSpec};
use crate::ddl::{
    Comment, Engine, FullName, IndexSpec, MaterializedView, Naming, ProjectionSpec, Table, TableOrView, View,
};
use crate::error::StoreResult;
use crate::sql::{strip_quotes, QueryContext, Row, SqlValue, StatementExecutor};

use super::plan::MigrationStep;

/// Source of the objects that currently exist
pub trait ObjectCatalog: Send + Sync {
    /// Objects of the processor, by name prefix
    fn load(&self, exec: &StatementExecutor<'_>, ctx: &QueryContext, naming: &Naming) -> StoreResult<Vec<TableOrView>>;

    /// Called after each step is applied
    fn record(&self, _step: &MigrationStep) {}
}

/// Catalog backed by `system.tables`, `system.columns` and
/// `system.data_skipping_indices`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCatalog;

const TABLES_SQL: &str = "SELECT name, engine, create_table_query, as_select, comment, partition_key, sorting_key FROM system.tables WHERE database = ? AND startsWith(name, ?)";
const COLUMNS_SQL: &str = "SELECT table, name, type, default_kind, default_expression FROM system.columns WHERE database = ? AND startsWith(table, ?) ORDER BY table, position";
const INDICES_SQL: &str = "SELECT table, name, type_full, expr, granularity FROM system.data_skipping_indices WHERE database = ? AND startsWith(table, ?)";

fn text(row: &Row, column: &str) -> String {
    row.get(column).and_then(SqlValue::as_str).unwrap_or_default().to_string()
}

impl ObjectCatalog for SystemCatalog {
    fn load(&self, exec: &StatementExecutor<'_>, ctx: &QueryContext, naming: &Naming) -> StoreResult<Vec<TableOrView>> {
        let args = [
            SqlValue::String(naming.database().to_string()),
            SqlValue::String(naming.prefix()),
        ];

        let mut columns: HashMap<String, Vec<ColumnSpec>> = HashMap::new();
        for row in exec.query_rows(ctx, COLUMNS_SQL, &args)? {
            let mut ty = text(&row, "type");
            if text(&row, "default_kind") == "DEFAULT" {
                ty = format!("{} DEFAULT {}", ty, text(&row, "default_expression"));
            }
            columns
                .entry(text(&row, "table"))
                .or_default()
                .push(ColumnSpec::new(text(&row, "name"), ty));
        }

        let mut indexes: HashMap<String, Vec<IndexSpec>> = HashMap::new();
        for row in exec.query_rows(ctx, INDICES_SQL, &args)? {
            indexes.entry(text(&row, "table")).or_default().push(IndexSpec {
                name: text(&row, "name"),
                expr: text(&row, "expr"),
                kind: text(&row, "type_full"),
                granularity: row
                    .get("granularity")
                    .and_then(SqlValue::as_u64)
                    .and_then(|g| u32::try_from(g).ok())
                    .unwrap_or(1),
            });
        }

        let mut objects = Vec::new();
        for row in exec.query_rows(ctx, TABLES_SQL, &args)? {
            let name = text(&row, "name");
            let full_name = FullName::new(naming.database(), &name);
            let comment = Comment::parse(&text(&row, "comment"));
            let create = text(&row, "create_table_query");
            let object = match text(&row, "engine").as_str() {
                "View" => TableOrView::View(View {
                    name: full_name,
                    select: text(&row, "as_select"),
                    comment,
                }),
                "MaterializedView" => TableOrView::MaterializedView(MaterializedView {
                    view: View {
                        name: full_name,
                        select: text(&row, "as_select"),
                        comment,
                    },
                    to: parse_target(&create).unwrap_or_else(|| FullName::new(naming.database(), "")),
                }),
                engine => TableOrView::Table(Table {
                    columns: columns.remove(&name).unwrap_or_default(),
                    indexes: indexes.remove(&name).unwrap_or_default(),
                    projections: parse_projections(&create),
                    engine: Engine::from_name(engine, meta::SIGN, meta::VERSION),
                    partition_by: Some(text(&row, "partition_key")).filter(|p| !p.is_empty()),
                    order_by: text(&row, "sorting_key")
                        .split(',')
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect(),
                    settings: parse_settings(&create),
                    comment,
                    name: full_name,
                }),
            };
            objects.push(object);
        }
        Ok(objects)
    }
}

/// Target table of a materialized view
pub fn parse_target(create: &str) -> Option<FullName> {
    let pattern = Regex::new(r"\bTO\s+(\S+)").ok()?;
    let target = strip_quotes(&pattern.captures(create)?[1]);
    let (database, name) = target.split_once('.')?;
    Some(FullName::new(database, name))
}

/// `PROJECTION name (query)` clauses, parentheses balanced
pub fn parse_projections(create: &str) -> Vec<ProjectionSpec> {
    let mut projections = Vec::new();
    let mut rest = create;
    while let Some(at) = rest.find("PROJECTION ") {
        rest = &rest[at + "PROJECTION ".len()..];
        let name_end = match rest.find(|c: char| c.is_whitespace() || c == '(') {
            Some(end) => end,
            None => break,
        };
        let name = strip_quotes(&rest[..name_end]);
        let body = rest[name_end..].trim_start();
        if !body.starts_with('(') {
            continue;
        }
        let mut depth = 0usize;
        let mut end = None;
        for (i, c) in body.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let end = match end {
            Some(end) => end,
            None => break,
        };
        projections.push(ProjectionSpec {
            name,
            query: body[1..end].trim().to_string(),
        });
        rest = &body[end..];
    }
    projections
}

/// `SETTINGS k = v, ...` of a stored `CREATE TABLE`
pub fn parse_settings(create: &str) -> BTreeMap<String, String> {
    let pattern = match Regex::new(r"SETTINGS\s+(.+?)(?:\s+COMMENT\s+'.*)?$") {
        Ok(pattern) => pattern,
        Err(_) => return BTreeMap::new(),
    };
    let clause = match pattern.captures(create) {
        Some(captures) => captures[1].to_string(),
        None => return BTreeMap::new(),
    };
    clause
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// In-memory catalog that follows applied steps
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    objects: Mutex<BTreeMap<FullName, TableOrView>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, object: TableOrView) {
        self.lock().insert(object.full_name().clone(), object);
    }

    pub fn get(&self, name: &str) -> Option<TableOrView> {
        self.lock().values().find(|o| o.full_name().name == name).cloned()
    }

    pub fn objects(&self) -> Vec<TableOrView> {
        self.lock().values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<FullName, TableOrView>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ObjectCatalog for MemoryCatalog {
    fn load(&self, _exec: &StatementExecutor<'_>, _ctx: &QueryContext, naming: &Naming) -> StoreResult<Vec<TableOrView>> {
        let prefix = naming.prefix();
        Ok(self
            .lock()
            .values()
            .filter(|o| o.full_name().database == naming.database() && o.full_name().name.starts_with(&prefix))
            .cloned()
            .collect())
    }

    fn record(&self, step: &MigrationStep) {
        let mut objects = self.lock();
        match step {
            MigrationStep::Create(object) => {
                objects.insert(object.full_name().clone(), object.clone());
            }
            MigrationStep::Replace(view) => {
                objects.insert(view.name.clone(), TableOrView::View(view.clone()));
            }
            MigrationStep::Drop { name, .. } => {
                objects.remove(name);
            }
            MigrationStep::Alter { table, change } => {
                if let Some(TableOrView::Table(existing)) = objects.get_mut(table) {
                    change.apply(existing);
                }
            }
        }
    }
}
