//! Insert rows
//!
//! Row layout: data columns (id first), then provenance, then sign and
//! version on collapsing tables. Insert time is left to its default.
//!
//! On collapsing tables every write after the first retracts the previous
//! state: the retraction repeats the previous data and deleted flag with
//! sign -1 and the previous version, under the provenance of the new write,
//! and precedes the new row carrying sign +1 and the next version. Reorg
//! relies on the pair sharing a block number.

use sha2::{Digest, Sha256};

use crate::codec::{meta, EntityCodec};
use crate::ddl::FullName;
use crate::entity::EntityBox;
use crate::error::{StoreError, StoreResult};
use crate::sql::{quote_ident, Row, SqlValue};

use super::history::History;

/// Latest stored state of an id in the collapsing table
#[derive(Debug, Clone, PartialEq)]
pub struct Prior {
    pub version: u64,
    pub deleted: bool,
    /// Raw data column values, id first
    pub data: Vec<SqlValue>,
}

impl Prior {
    pub fn from_row(codec: &EntityCodec, row: &Row) -> StoreResult<Self> {
        let version = row.get(meta::VERSION).and_then(SqlValue::as_u64).ok_or_else(|| StoreError::Decode {
            entity: codec.entity().to_string(),
            field: meta::VERSION.to_string(),
            reason: "missing version".to_string(),
        })?;
        Ok(Self {
            version,
            deleted: row.get(meta::DELETED).and_then(SqlValue::as_bool).unwrap_or(false),
            data: codec
                .data_column_names()
                .iter()
                .map(|c| row.get(c).cloned().unwrap_or(SqlValue::Null))
                .collect(),
        })
    }
}

/// Builds insert rows of one entity
pub struct RowBuilder<'a> {
    codec: &'a EntityCodec,
    collapsing: bool,
}

impl<'a> RowBuilder<'a> {
    pub fn new(codec: &'a EntityCodec, collapsing: bool) -> Self {
        Self { codec, collapsing }
    }

    pub fn columns(&self) -> Vec<String> {
        let mut columns = self.codec.data_column_names();
        columns.extend(meta::PROVENANCE.iter().map(|c| c.to_string()));
        if self.collapsing {
            columns.push(meta::SIGN.to_string());
            columns.push(meta::VERSION.to_string());
        }
        columns
    }

    /// `INSERT INTO table (columns) VALUES`
    pub fn insert_sql(&self, table: &FullName) -> String {
        let columns: Vec<String> = self.columns().iter().map(|c| quote_ident(c)).collect();
        format!("INSERT INTO {} ({}) VALUES", table, columns.join(", "))
    }

    /// Rows of one history; `prior` only applies to collapsing tables
    pub fn history_rows(&self, history: &History, prior: Option<Prior>) -> StoreResult<Vec<Vec<SqlValue>>> {
        let mut rows = Vec::new();
        let mut previous = prior;
        for entity_box in &history.boxes {
            let data = self.codec.encode_data(&entity_box.id, entity_box.data.as_ref())?;
            let deleted = entity_box.is_delete();
            if !self.collapsing {
                rows.push(row(&data, entity_box, deleted, None));
                continue;
            }
            let version = match &previous {
                Some(prior) => {
                    rows.push(row(&prior.data, entity_box, prior.deleted, Some((-1, prior.version))));
                    prior.version + 1
                }
                None => 1,
            };
            rows.push(row(&data, entity_box, deleted, Some((1, version))));
            previous = Some(Prior { version, deleted, data });
        }
        Ok(rows)
    }
}

fn row(data: &[SqlValue], provenance: &EntityBox, deleted: bool, collapse: Option<(i8, u64)>) -> Vec<SqlValue> {
    let mut row = data.to_vec();
    row.push(SqlValue::UInt64(provenance.block_number));
    row.push(SqlValue::DateTime64(provenance.block_time));
    row.push(SqlValue::String(provenance.block_hash.clone()));
    row.push(SqlValue::String(provenance.chain.clone()));
    row.push(SqlValue::Bool(deleted));
    if let Some((sign, version)) = collapse {
        row.push(SqlValue::Int8(sign));
        row.push(SqlValue::UInt64(version));
    }
    row
}

/// Content hash of one flush, the insert deduplication token
pub fn dedup_token(table: &FullName, rows: &[Vec<SqlValue>]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(table.to_string().as_bytes());
    for row in rows {
        for value in row {
            hasher.update(value.to_string().as_bytes());
            hasher.update([0x1f]);
        }
        hasher.update([0x1e]);
    }
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Features;
    use crate::schema::{EntityType, Field, Schema, TypeRef};
    use crate::write::history::partition;

    fn codec() -> EntityCodec {
        let entity = EntityType::new(
            "Pool",
            vec![
                Field::new("id", TypeRef::required("ID")),
                Field::new("a", TypeRef::optional("Int")),
            ],
        );
        let schema = Schema {
            entities: vec![entity.clone()],
            ..Schema::default()
        };
        EntityCodec::for_entity(&schema, &entity, &Features::default()).unwrap()
    }

    fn history(writes: &[(u64, Option<i32>)]) -> History {
        let boxes = writes
            .iter()
            .map(|(block, a)| match a {
                Some(a) => EntityBox::new("Pool", "x", "eth", *block).with_field("a", *a),
                None => EntityBox::delete("Pool", "x", "eth", *block),
            })
            .collect();
        partition(boxes).remove(0)
    }

    const SIGN: usize = 7;
    const VERSION: usize = 8;

    #[test]
    fn test_columns() {
        let codec = codec();
        let builder = RowBuilder::new(&codec, true);
        assert_eq!(
            builder.columns(),
            vec![
                "id",
                "a",
                "__genBlockNumber",
                "__genBlockTime",
                "__genBlockHash",
                "__genBlockChain",
                "__deleted",
                "__sign",
                "__version"
            ]
        );
        assert_eq!(RowBuilder::new(&codec, false).columns().len(), 7);
    }

    #[test]
    fn test_first_write_has_no_retraction() {
        let codec = codec();
        let rows = RowBuilder::new(&codec, true)
            .history_rows(&history(&[(10, Some(1)), (20, Some(2)), (30, Some(3))]), None)
            .unwrap();
        assert_eq!(rows.len(), 5);
        let signs: Vec<&SqlValue> = rows.iter().map(|r| &r[SIGN]).collect();
        assert_eq!(
            signs,
            vec![
                &SqlValue::Int8(1),
                &SqlValue::Int8(-1),
                &SqlValue::Int8(1),
                &SqlValue::Int8(-1),
                &SqlValue::Int8(1)
            ]
        );
        // retraction of version 1 carries the data of block 10 at block 20
        assert_eq!(rows[1][1], SqlValue::Int32(1));
        assert_eq!(rows[1][2], SqlValue::UInt64(20));
        assert_eq!(rows[1][VERSION], SqlValue::UInt64(1));
        assert_eq!(rows[2][VERSION], SqlValue::UInt64(2));
        assert_eq!(rows[4][1], SqlValue::Int32(3));
        assert_eq!(rows[4][VERSION], SqlValue::UInt64(3));
    }

    #[test]
    fn test_prior_state_is_retracted() {
        let codec = codec();
        let prior = Prior {
            version: 7,
            deleted: true,
            data: vec![SqlValue::String("x".into()), SqlValue::Null],
        };
        let rows = RowBuilder::new(&codec, true)
            .history_rows(&history(&[(40, Some(5))]), Some(prior))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][6], SqlValue::Bool(true));
        assert_eq!(rows[0][VERSION], SqlValue::UInt64(7));
        assert_eq!(rows[1][6], SqlValue::Bool(false));
        assert_eq!(rows[1][VERSION], SqlValue::UInt64(8));
    }

    #[test]
    fn test_plain_rows_append() {
        let codec = codec();
        let rows = RowBuilder::new(&codec, false)
            .history_rows(&history(&[(10, Some(1)), (20, None)]), None)
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][1], SqlValue::Null);
        assert_eq!(rows[1][6], SqlValue::Bool(true));
    }

    #[test]
    fn test_prior_from_row() {
        let codec = codec();
        let row = Row::from_pairs(vec![
            ("id", SqlValue::String("x".into())),
            ("__version", SqlValue::UInt64(3)),
            ("__deleted", SqlValue::Bool(false)),
            ("a", SqlValue::Int32(9)),
        ]);
        let prior = Prior::from_row(&codec, &row).unwrap();
        assert_eq!(prior.version, 3);
        assert_eq!(prior.data, vec![SqlValue::String("x".into()), SqlValue::Int32(9)]);
    }

    #[test]
    fn test_token_depends_on_content() {
        let table = FullName::new("db", "t");
        let a = dedup_token(&table, &[vec![SqlValue::Int32(1)]]);
        let b = dedup_token(&table, &[vec![SqlValue::Int32(2)]]);
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(a, dedup_token(&table, &[vec![SqlValue::Int32(1)]]));
    }
}
