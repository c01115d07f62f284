//! Expected physical objects
//!
//! Per logical type:
//! - mutable entity, collapsing: history table, collapsing table, the
//!   materialized view between them, view, latest view
//! - mutable entity, plain: entity table, view, latest view
//! - immutable entity: entity table, view, pass-through latest view
//! - interface: union views over the implementors' views and latest views
//! - aggregation: aggregation table, view, latest view
//!
//! Every object carries the schema hash of its logical type in its comment.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::codec::{meta, ColumnSpec, EntityCodec, FieldCodec, ViewColumn};
use crate::config::Features;
use crate::schema::{schema_hash, Aggregation, EntityType, IndexKind, Interface, Schema};
use crate::sql::{quote_ident, quote_str};

use super::comment::Comment;
use super::latest;
use super::layout::Layout;
use super::naming::{Category, FullName, Naming};
use super::object::{Engine, IndexSpec, MaterializedView, ProjectionSpec, Table, TableOrView, View};

/// Position of an object in the apply order; drops run in reverse
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApplyOrder {
    Table,
    MaterializedView,
    EntityView,
    EntityLatestView,
    InterfaceView,
    InterfaceLatestView,
}

/// An object the schema requires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedObject {
    pub order: ApplyOrder,
    pub object: TableOrView,
}

impl ExpectedObject {
    fn new(order: ApplyOrder, object: TableOrView) -> Self {
        Self { order, object }
    }
}

/// Derives expected objects from the schema and resolved codecs
pub struct ObjectBuilder<'a> {
    pub naming: &'a Naming,
    pub features: &'a Features,
    pub settings: &'a BTreeMap<String, String>,
    pub schema: &'a Schema,
    pub codecs: &'a BTreeMap<String, EntityCodec>,
}

#[derive(Serialize)]
struct InterfaceItem<'a> {
    interface: &'a Interface,
    implementors: Vec<&'a str>,
}

#[derive(Serialize)]
struct AggregationItem<'a> {
    aggregation: &'a Aggregation,
    source: Option<&'a EntityType>,
}

impl<'a> ObjectBuilder<'a> {
    /// Every expected object, in apply order
    pub fn build(&self) -> Vec<ExpectedObject> {
        let mut objects = Vec::new();
        for entity in &self.schema.entities {
            objects.extend(self.entity_objects(entity));
        }
        for interface in &self.schema.interfaces {
            objects.extend(self.interface_objects(interface));
        }
        for aggregation in &self.schema.aggregations {
            objects.extend(self.aggregation_objects(aggregation));
        }
        objects.sort_by_key(|o| o.order);
        objects
    }

    pub fn entity_hash(&self, entity: &EntityType) -> String {
        schema_hash(
            "entity",
            entity,
            &self.schema.enums_used_by(&entity.fields),
            self.features,
            self.settings,
        )
    }

    pub fn interface_hash(&self, interface: &Interface) -> String {
        let item = InterfaceItem {
            interface,
            implementors: self
                .schema
                .implementors(&interface.name)
                .iter()
                .map(|e| e.name.as_str())
                .collect(),
        };
        schema_hash(
            "interface",
            &item,
            &self.schema.enums_used_by(&interface.fields),
            self.features,
            self.settings,
        )
    }

    pub fn aggregation_hash(&self, aggregation: &Aggregation) -> String {
        let source = self.schema.entity(&aggregation.source);
        let item = AggregationItem { aggregation, source };
        let enums = source
            .map(|s| self.schema.enums_used_by(&s.fields))
            .unwrap_or_default();
        schema_hash("aggregation", &item, &enums, self.features, self.settings)
    }

    pub fn entity_objects(&self, entity: &EntityType) -> Vec<ExpectedObject> {
        let codec = match self.codecs.get(&entity.name) {
            Some(codec) => codec,
            None => return Vec::new(),
        };
        let comment = Comment::new(self.entity_hash(entity)).with_impl(&self.schema.interfaces_of(&entity.name));
        let layout = Layout::for_entity(self.naming, self.features, entity);
        let view_name = self.naming.name(Category::View, &entity.name);
        let latest_name = self.naming.name(Category::LatestView, &entity.name);
        let mut columns = codec.data_columns();
        columns.extend(meta::provenance_columns());
        let (indexes, projections) = self.indexes(entity, codec);

        let mut objects = Vec::new();
        match &layout {
            Layout::Collapsing { raw, collapsed } => {
                columns.extend(meta::collapsing_columns());
                objects.push(ExpectedObject::new(
                    ApplyOrder::Table,
                    TableOrView::Table(self.table(
                        raw,
                        columns.clone(),
                        indexes.clone(),
                        Vec::new(),
                        Engine::MergeTree,
                        &[meta::CHAIN, meta::ID, meta::BLOCK_NUMBER, meta::VERSION],
                        comment.clone(),
                    )),
                ));
                objects.push(ExpectedObject::new(
                    ApplyOrder::Table,
                    TableOrView::Table(self.table(
                        collapsed,
                        columns.clone(),
                        indexes,
                        projections,
                        Engine::VersionedCollapsingMergeTree {
                            sign: meta::SIGN.to_string(),
                            version: meta::VERSION.to_string(),
                        },
                        &[meta::CHAIN, meta::ID],
                        comment.clone(),
                    )),
                ));
                let names: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
                objects.push(ExpectedObject::new(
                    ApplyOrder::MaterializedView,
                    TableOrView::MaterializedView(MaterializedView {
                        view: View {
                            name: self.naming.name(Category::VersionedLatestEntityMV, &entity.name),
                            select: format!("SELECT {} FROM {}", names.join(", "), raw),
                            comment: comment.clone(),
                        },
                        to: collapsed.clone(),
                    }),
                ));
                let visible = format!("(SELECT * FROM {} WHERE {} > 0)", raw, quote_ident(meta::SIGN));
                objects.push(self.view(ApplyOrder::EntityView, view_name, project(codec, &visible, &layout), &comment));
                let rows = latest::live_rows(&layout.latest_rows(codec, false, &[]), &[]);
                objects.push(self.view(
                    ApplyOrder::EntityLatestView,
                    latest_name,
                    project(codec, &format!("({})", rows), &layout),
                    &comment,
                ));
            }
            Layout::Plain { table } => {
                objects.push(ExpectedObject::new(
                    ApplyOrder::Table,
                    TableOrView::Table(self.table(
                        table,
                        columns,
                        indexes,
                        projections,
                        Engine::ReplacingMergeTree,
                        &[meta::CHAIN, meta::ID, meta::BLOCK_NUMBER],
                        comment.clone(),
                    )),
                ));
                objects.push(self.view(ApplyOrder::EntityView, view_name, project(codec, &table.to_string(), &layout), &comment));
                let rows = latest::live_rows(&layout.latest_rows(codec, self.features.window_latest, &[]), &[]);
                objects.push(self.view(
                    ApplyOrder::EntityLatestView,
                    latest_name,
                    project(codec, &format!("({})", rows), &layout),
                    &comment,
                ));
            }
            Layout::Immutable { table } | Layout::Aggregation { table } => {
                objects.push(ExpectedObject::new(
                    ApplyOrder::Table,
                    TableOrView::Table(self.table(
                        table,
                        columns,
                        indexes,
                        projections,
                        Engine::MergeTree,
                        &[meta::CHAIN, meta::ID],
                        comment.clone(),
                    )),
                ));
                objects.push(self.view(ApplyOrder::EntityView, view_name.clone(), project(codec, &table.to_string(), &layout), &comment));
                objects.push(self.view(
                    ApplyOrder::EntityLatestView,
                    latest_name,
                    format!("SELECT * FROM {}", view_name),
                    &comment,
                ));
            }
        }
        objects
    }

    pub fn interface_objects(&self, interface: &Interface) -> Vec<ExpectedObject> {
        let codec = match self.codecs.get(&interface.name) {
            Some(codec) => codec,
            None => return Vec::new(),
        };
        let comment = Comment::new(self.interface_hash(interface));
        let implementors = self.schema.implementors(&interface.name);
        let union = |category: Category| -> String {
            if implementors.is_empty() {
                // Keeps the view valid with no implementors: same columns, no rows
                return format!("SELECT {} WHERE false", empty_projection(codec));
            }
            implementors
                .iter()
                .map(|entity| {
                    format!(
                        "SELECT {} AS {}, {} FROM {}",
                        quote_str(&entity.name),
                        quote_ident(meta::TYPENAME),
                        interface_projection(codec),
                        self.naming.name(category, &entity.name)
                    )
                })
                .collect::<Vec<_>>()
                .join("\nUNION ALL\n")
        };
        vec![
            self.view(
                ApplyOrder::InterfaceView,
                self.naming.name(Category::Interface, &interface.name),
                union(Category::View),
                &comment,
            ),
            self.view(
                ApplyOrder::InterfaceLatestView,
                self.naming.name(Category::LatestView, &interface.name),
                union(Category::LatestView),
                &comment,
            ),
        ]
    }

    pub fn aggregation_objects(&self, aggregation: &Aggregation) -> Vec<ExpectedObject> {
        let codec = match self.codecs.get(&aggregation.name) {
            Some(codec) => codec,
            None => return Vec::new(),
        };
        let comment = Comment::new(self.aggregation_hash(aggregation)).with_src(&aggregation.source);
        let layout = Layout::for_aggregation(self.naming, aggregation);
        let table = layout.write_table().clone();
        let mut columns = codec.data_columns();
        columns.extend(meta::provenance_columns());
        columns.push(ColumnSpec::new(meta::INTERVAL, "LowCardinality(String)"));

        let rows = latest::live_rows(&layout.latest_rows(codec, self.features.window_latest, &[]), &[]);
        vec![
            ExpectedObject::new(
                ApplyOrder::Table,
                TableOrView::Table(self.table(
                    &table,
                    columns,
                    Vec::new(),
                    Vec::new(),
                    Engine::ReplacingMergeTree,
                    &[meta::CHAIN, meta::INTERVAL, "timestamp", meta::ID],
                    comment.clone(),
                )),
            ),
            self.view(
                ApplyOrder::EntityView,
                self.naming.name(Category::View, &aggregation.name),
                project(codec, &table.to_string(), &layout),
                &comment,
            ),
            self.view(
                ApplyOrder::EntityLatestView,
                self.naming.name(Category::LatestView, &aggregation.name),
                project(codec, &format!("({})", rows), &layout),
                &comment,
            ),
        ]
    }

    #[allow(clippy::too_many_arguments)]
    fn table(
        &self,
        name: &FullName,
        columns: Vec<ColumnSpec>,
        indexes: Vec<IndexSpec>,
        projections: Vec<ProjectionSpec>,
        engine: Engine,
        order_by: &[&str],
        comment: Comment,
    ) -> Table {
        Table {
            name: name.clone(),
            columns,
            indexes,
            projections,
            engine,
            partition_by: Some(quote_ident(meta::CHAIN)),
            order_by: order_by.iter().map(|c| c.to_string()).collect(),
            settings: self.settings.clone(),
            comment,
        }
    }

    fn view(&self, order: ApplyOrder, name: FullName, select: String, comment: &Comment) -> ExpectedObject {
        ExpectedObject::new(
            order,
            TableOrView::View(View {
                name,
                select,
                comment: comment.clone(),
            }),
        )
    }

    /// Skipping indexes and projections from `@index` directives
    fn indexes(&self, entity: &EntityType, codec: &EntityCodec) -> (Vec<IndexSpec>, Vec<ProjectionSpec>) {
        let mut indexes = Vec::new();
        let mut projections = Vec::new();
        for field in &entity.fields {
            let directive = match &field.index {
                Some(directive) => directive,
                None => continue,
            };
            let expr = match codec.field(&field.name).and_then(index_expr) {
                Some(expr) => expr,
                None => continue,
            };
            let kind = match directive.kind {
                IndexKind::BloomFilter => "bloom_filter".to_string(),
                IndexKind::Minmax => "minmax".to_string(),
                IndexKind::Set => format!("set({})", directive.max_rows.unwrap_or(0)),
                IndexKind::Projection => {
                    projections.push(ProjectionSpec {
                        name: format!("proj_{}", field.name),
                        query: format!("SELECT * ORDER BY {}", expr),
                    });
                    continue;
                }
            };
            indexes.push(IndexSpec {
                name: format!("idx_{}", field.name),
                expr,
                kind,
                granularity: directive.granularity.unwrap_or(1),
            });
        }
        (indexes, projections)
    }
}

fn index_expr(field: &FieldCodec) -> Option<String> {
    field.filter_expr().or_else(|| field.array_expr())
}

fn aliased(column: &ViewColumn) -> String {
    if column.expr == quote_ident(&column.alias) {
        column.expr.clone()
    } else {
        format!("{} AS {}", column.expr, quote_ident(&column.alias))
    }
}

/// View projection: decoded fields, provenance and its `meta.*` aliases
pub fn project(codec: &EntityCodec, source: &str, layout: &Layout) -> String {
    let mut columns: Vec<String> = codec.view_columns().iter().map(aliased).collect();
    for name in meta::PROVENANCE {
        columns.push(quote_ident(name));
    }
    for (name, alias) in meta::ALIASES {
        columns.push(format!("{} AS {}", quote_ident(name), quote_ident(alias)));
    }
    match layout {
        Layout::Collapsing { .. } => {
            columns.push(quote_ident(meta::VERSION));
            columns.push(format!("{} AS {}", quote_ident(meta::VERSION), quote_ident(meta::VERSION_ALIAS)));
        }
        Layout::Aggregation { .. } => columns.push(quote_ident(meta::INTERVAL)),
        Layout::Plain { .. } | Layout::Immutable { .. } => {}
    }
    format!("SELECT {} FROM {}", columns.join(", "), source)
}

/// Columns an interface view takes from each implementor view
fn interface_names(codec: &EntityCodec) -> Vec<String> {
    let mut names: Vec<String> = codec.view_columns().into_iter().map(|c| c.alias).collect();
    names.extend(meta::PROVENANCE.iter().map(|c| c.to_string()));
    names.extend(meta::ALIASES.iter().map(|(_, alias)| alias.to_string()));
    names
}

fn interface_projection(codec: &EntityCodec) -> String {
    interface_names(codec)
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn empty_projection(codec: &EntityCodec) -> String {
    let mut columns = vec![format!("'' AS {}", quote_ident(meta::TYPENAME))];
    columns.extend(interface_names(codec).iter().map(|c| format!("NULL AS {}", quote_ident(c))));
    columns.join(", ")
}
