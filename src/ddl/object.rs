//! Physical object specs
//!
//! Recomputed from the logical schema on every sync and compared against the
//! objects loaded from the database. Nothing here is persisted except through
//! the DDL it renders to.

use std::collections::BTreeMap;
use std::fmt;

use crate::codec::ColumnSpec;
use crate::sql::strip_quotes;

use super::comment::Comment;
use super::naming::FullName;

/// Table engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Engine {
    MergeTree,
    ReplacingMergeTree,
    VersionedCollapsingMergeTree { sign: String, version: String },
    /// Engine of a loaded table this crate does not create
    Other(String),
}

impl Engine {
    pub fn name(&self) -> &str {
        match self {
            Engine::MergeTree => "MergeTree",
            Engine::ReplacingMergeTree => "ReplacingMergeTree",
            Engine::VersionedCollapsingMergeTree { .. } => "VersionedCollapsingMergeTree",
            Engine::Other(name) => name,
        }
    }

    /// Engine from the name reported by the database
    pub fn from_name(name: &str, sign: &str, version: &str) -> Self {
        match name {
            "MergeTree" => Engine::MergeTree,
            "ReplacingMergeTree" => Engine::ReplacingMergeTree,
            "VersionedCollapsingMergeTree" => Engine::VersionedCollapsingMergeTree {
                sign: sign.to_string(),
                version: version.to_string(),
            },
            other => Engine::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::VersionedCollapsingMergeTree { sign, version } => {
                write!(f, "VersionedCollapsingMergeTree({}, {})", sign, version)
            }
            other => write!(f, "{}()", other.name()),
        }
    }
}

/// Data-skipping index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub expr: String,
    /// Index type with arguments, e.g. `set(100)`
    pub kind: String,
    pub granularity: u32,
}

impl IndexSpec {
    /// Equal when type, granularity and expression match, quoting aside
    pub fn same_definition(&self, other: &IndexSpec) -> bool {
        self.kind == other.kind
            && self.granularity == other.granularity
            && normalize_expr(&self.expr) == normalize_expr(&other.expr)
    }
}

/// Projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionSpec {
    pub name: String,
    /// Query between the parentheses, e.g. `SELECT * ORDER BY owner`
    pub query: String,
}

impl ProjectionSpec {
    pub fn same_definition(&self, other: &ProjectionSpec) -> bool {
        self.name == other.name && normalize_expr(&self.query) == normalize_expr(&other.query)
    }
}

/// Expression text compared without quoting and whitespace
pub fn normalize_expr(expr: &str) -> String {
    strip_quotes(expr).chars().filter(|c| !c.is_whitespace()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: FullName,
    pub columns: Vec<ColumnSpec>,
    pub indexes: Vec<IndexSpec>,
    pub projections: Vec<ProjectionSpec>,
    pub engine: Engine,
    pub partition_by: Option<String>,
    /// Sorting key columns, unquoted
    pub order_by: Vec<String>,
    pub settings: BTreeMap<String, String>,
    pub comment: Comment,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub name: FullName,
    pub select: String,
    pub comment: Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedView {
    pub view: View,
    pub to: FullName,
}

/// Kind of a physical object
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObjectKind {
    Table,
    MaterializedView,
    View,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Table => "TABLE",
            ObjectKind::MaterializedView => "MATERIALIZED VIEW",
            ObjectKind::View => "VIEW",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Any physical object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOrView {
    Table(Table),
    View(View),
    MaterializedView(MaterializedView),
}

impl TableOrView {
    pub fn kind(&self) -> ObjectKind {
        match self {
            TableOrView::Table(_) => ObjectKind::Table,
            TableOrView::View(_) => ObjectKind::View,
            TableOrView::MaterializedView(_) => ObjectKind::MaterializedView,
        }
    }

    pub fn full_name(&self) -> &FullName {
        match self {
            TableOrView::Table(t) => &t.name,
            TableOrView::View(v) => &v.name,
            TableOrView::MaterializedView(m) => &m.view.name,
        }
    }

    pub fn comment(&self) -> &Comment {
        match self {
            TableOrView::Table(t) => &t.comment,
            TableOrView::View(v) => &v.comment,
            TableOrView::MaterializedView(m) => &m.view.comment,
        }
    }

    pub fn schema_hash(&self) -> Option<&str> {
        self.comment().schema_hash()
    }
}
