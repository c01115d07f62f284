//! DDL rendering

use crate::codec::ColumnSpec;
use crate::sql::{quote_ident, quote_str};

use super::object::{IndexSpec, MaterializedView, ObjectKind, ProjectionSpec, Table, TableOrView, View};
use super::naming::FullName;

pub fn column_definition(column: &ColumnSpec) -> String {
    format!("{} {}", quote_ident(&column.name), column.ty)
}

pub fn index_definition(index: &IndexSpec) -> String {
    format!(
        "INDEX {} {} TYPE {} GRANULARITY {}",
        quote_ident(&index.name),
        index.expr,
        index.kind,
        index.granularity
    )
}

pub fn projection_definition(projection: &ProjectionSpec) -> String {
    format!("PROJECTION {} ({})", quote_ident(&projection.name), projection.query)
}

pub fn create_table(table: &Table) -> String {
    let mut body: Vec<String> = table.columns.iter().map(column_definition).collect();
    body.extend(table.indexes.iter().map(index_definition));
    body.extend(table.projections.iter().map(projection_definition));

    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)\nENGINE = {}",
        table.name,
        body.join(",\n  "),
        table.engine
    );
    if let Some(partition) = &table.partition_by {
        sql.push_str(&format!("\nPARTITION BY {}", partition));
    }
    let order: Vec<String> = table.order_by.iter().map(|c| quote_ident(c)).collect();
    sql.push_str(&format!("\nORDER BY ({})", order.join(", ")));
    if !table.settings.is_empty() {
        let settings: Vec<String> = table
            .settings
            .iter()
            .map(|(k, v)| format!("{} = {}", k, v))
            .collect();
        sql.push_str(&format!("\nSETTINGS {}", settings.join(", ")));
    }
    sql.push_str(&format!("\nCOMMENT {}", quote_str(&table.comment.to_string())));
    sql
}

pub fn create_view(view: &View) -> String {
    format!(
        "CREATE OR REPLACE VIEW {} AS\n{}\nCOMMENT {}",
        view.name,
        view.select,
        quote_str(&view.comment.to_string())
    )
}

pub fn create_materialized_view(mv: &MaterializedView) -> String {
    format!(
        "CREATE MATERIALIZED VIEW IF NOT EXISTS {} TO {} AS\n{}\nCOMMENT {}",
        mv.view.name,
        mv.to,
        mv.view.select,
        quote_str(&mv.view.comment.to_string())
    )
}

pub fn create(object: &TableOrView) -> String {
    match object {
        TableOrView::Table(t) => create_table(t),
        TableOrView::View(v) => create_view(v),
        TableOrView::MaterializedView(m) => create_materialized_view(m),
    }
}

pub fn drop(kind: ObjectKind, name: &FullName) -> String {
    match kind {
        ObjectKind::Table => format!("DROP TABLE IF EXISTS {}", name),
        ObjectKind::View | ObjectKind::MaterializedView => format!("DROP VIEW IF EXISTS {}", name),
    }
}
