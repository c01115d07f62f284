//! Where a type's rows live
//!
//! Write, query and reorg all need to know which tables hold an entity and
//! how its latest rows are selected; `Layout` answers both.

use crate::codec::{meta, EntityCodec};
use crate::config::Features;
use crate::schema::{Aggregation, EntityType};
use crate::sql::quote_ident;

use super::latest;
use super::naming::{Category, FullName, Naming};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// Mutable entity with sign/version collapsing
    Collapsing { raw: FullName, collapsed: FullName },
    /// Mutable entity, latest row by block number
    Plain { table: FullName },
    /// Immutable or timeseries entity, one row per id
    Immutable { table: FullName },
    Aggregation { table: FullName },
}

impl Layout {
    pub fn for_entity(naming: &Naming, features: &Features, entity: &EntityType) -> Self {
        if !entity.is_mutable() {
            return Layout::Immutable {
                table: naming.name(Category::Entity, &entity.name),
            };
        }
        if features.version_collapsing {
            Layout::Collapsing {
                raw: naming.name(Category::VersionedEntity, &entity.name),
                collapsed: naming.name(Category::VersionedLatestEntity, &entity.name),
            }
        } else {
            Layout::Plain {
                table: naming.name(Category::Entity, &entity.name),
            }
        }
    }

    pub fn for_aggregation(naming: &Naming, aggregation: &Aggregation) -> Self {
        Layout::Aggregation {
            table: naming.name(Category::Aggregation, &aggregation.name),
        }
    }

    pub fn is_collapsing(&self) -> bool {
        matches!(self, Layout::Collapsing { .. })
    }

    pub fn is_immutable(&self) -> bool {
        matches!(self, Layout::Immutable { .. })
    }

    /// Table receiving inserts
    pub fn write_table(&self) -> &FullName {
        match self {
            Layout::Collapsing { raw, .. } => raw,
            Layout::Plain { table } | Layout::Immutable { table } | Layout::Aggregation { table } => table,
        }
    }

    /// Table latest rows are selected from
    pub fn query_table(&self) -> &FullName {
        match self {
            Layout::Collapsing { collapsed, .. } => collapsed,
            Layout::Plain { table } | Layout::Immutable { table } | Layout::Aggregation { table } => table,
        }
    }

    /// Tables holding rows by block number, in reorg order
    pub fn primary_tables(&self) -> Vec<&FullName> {
        match self {
            Layout::Collapsing { raw, collapsed } => vec![raw, collapsed],
            Layout::Plain { table } | Layout::Immutable { table } | Layout::Aggregation { table } => vec![table],
        }
    }

    /// Non-key columns of a latest row: block number and deleted flag first
    pub fn latest_columns(&self, codec: &EntityCodec) -> Vec<String> {
        let mut columns = vec![
            meta::BLOCK_NUMBER.to_string(),
            meta::DELETED.to_string(),
            meta::BLOCK_TIME.to_string(),
            meta::BLOCK_HASH.to_string(),
        ];
        if matches!(self, Layout::Aggregation { .. }) {
            columns.push(meta::INTERVAL.to_string());
        }
        columns.extend(codec.data_column_names().into_iter().filter(|c| c != meta::ID));
        columns
    }

    /// One row per (id, chain), deleted rows included
    ///
    /// `conditions` are applied before the reduction, so they must not
    /// depend on which version of a row is the latest.
    pub fn latest_rows(&self, codec: &EntityCodec, window: bool, conditions: &[String]) -> String {
        let columns = self.latest_columns(codec);
        match self {
            Layout::Collapsing { collapsed, .. } => latest::collapsed_rows(collapsed, &columns, conditions),
            Layout::Plain { table } | Layout::Aggregation { table } if window => {
                latest::window_latest_rows(table, &columns, conditions)
            }
            Layout::Plain { table } | Layout::Aggregation { table } => {
                latest::tuple_latest_rows(table, &columns, conditions)
            }
            Layout::Immutable { table } => {
                let mut sql = format!(
                    "SELECT {}, {}, {} FROM {}",
                    quote_ident(meta::ID),
                    quote_ident(meta::CHAIN),
                    columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
                    table
                );
                if !conditions.is_empty() {
                    sql.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
                }
                sql
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, TypeRef};

    fn entity() -> EntityType {
        EntityType::new(
            "Pool",
            vec![
                Field::new("id", TypeRef::required("ID")),
                Field::new("a", TypeRef::optional("Int")),
            ],
        )
    }

    #[test]
    fn test_layout_by_mutability_and_features() {
        let naming = Naming::new("db", "p1");
        let collapsing = Layout::for_entity(&naming, &Features::default(), &entity());
        assert!(collapsing.is_collapsing());
        assert_eq!(collapsing.write_table().name, "p1_versionedEntity_Pool");
        assert_eq!(collapsing.query_table().name, "p1_versionedLatestEntity_Pool");

        let plain = Layout::for_entity(&naming, &Features::plain(), &entity());
        assert_eq!(plain.write_table().name, "p1_entity_Pool");
        assert_eq!(plain.primary_tables().len(), 1);

        let immutable = Layout::for_entity(&naming, &Features::default(), &entity().immutable());
        assert!(immutable.is_immutable());
    }

    #[test]
    fn test_latest_columns() {
        let schema = crate::schema::Schema {
            entities: vec![entity()],
            ..Default::default()
        };
        let codec = EntityCodec::for_entity(&schema, &schema.entities[0], &Features::plain()).unwrap();
        let layout = Layout::for_entity(&Naming::new("db", "p1"), &Features::plain(), &entity());
        assert_eq!(
            layout.latest_columns(&codec),
            vec!["__genBlockNumber", "__deleted", "__genBlockTime", "__genBlockHash", "a"]
        );
    }
}
