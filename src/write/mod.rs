//! Write path
//!
//! `set_entities` in four steps per flush:
//! 1. group boxes into per-id histories (`history`)
//! 2. look up which ids already exist, and their latest collapsed state
//! 3. reject writes to existing ids of immutable entities
//! 4. build rows (`rows`) and insert them under one deduplication token
//!
//! Every box is validated before the first statement runs.
//!
//! Collapsing writes read the current version of an id and write the next
//! one; two writers of the same (entity, chain, id) must be serialized by the
//! caller.

pub mod history;
pub mod rows;

pub use history::{batches, partition, History};
pub use rows::{dedup_token, Prior, RowBuilder};

use std::collections::{BTreeMap, BTreeSet};

use crate::codec::{meta, EntityCodec};
use crate::config::StoreConfig;
use crate::ddl::{latest, Layout};
use crate::entity::{EntityBox, Value};
use crate::error::{StoreError, StoreResult};
use crate::observability::{Event, Logger};
use crate::sql::{quote_ident, QueryContext, SqlValue, StatementExecutor, SETTING_DEDUP_TOKEN};

/// Writes of one entity
pub struct EntityWriter<'a> {
    exec: StatementExecutor<'a>,
    codec: &'a EntityCodec,
    layout: &'a Layout,
    config: &'a StoreConfig,
}

impl<'a> EntityWriter<'a> {
    pub fn new(exec: StatementExecutor<'a>, codec: &'a EntityCodec, layout: &'a Layout, config: &'a StoreConfig) -> Self {
        Self {
            exec,
            codec,
            layout,
            config,
        }
    }

    /// Write every box; returns the number of ids seen for the first time
    pub fn write(&self, ctx: &QueryContext, mut boxes: Vec<EntityBox>) -> StoreResult<u64> {
        for entity_box in &mut boxes {
            self.codec.validate(entity_box)?;
            // Histories and stored rows are matched by the id as stored
            entity_box.id = self.codec.canonical_id(&entity_box.id)?;
        }
        let mut created = 0;
        for batch in batches(partition(boxes), self.config.insert_batch_size) {
            created += self.flush(ctx, &batch)?;
        }
        Ok(created)
    }

    fn flush(&self, ctx: &QueryContext, batch: &[History]) -> StoreResult<u64> {
        let chain = match batch.first() {
            Some(history) => history.chain.clone(),
            None => return Ok(0),
        };
        let ids: Vec<&Value> = batch.iter().filter_map(|h| h.first().map(|b| &b.id)).collect();

        let mut priors = BTreeMap::new();
        let existing: BTreeSet<String> = if self.layout.is_collapsing() {
            priors = self.priors(ctx, &chain, &ids)?;
            priors.keys().cloned().collect()
        } else {
            self.existing_ids(ctx, &chain, &ids)?
        };

        if self.layout.is_immutable() {
            self.check_write_once(batch, &existing)?;
        }

        let builder = RowBuilder::new(self.codec, self.layout.is_collapsing());
        let mut rows = Vec::new();
        for history in batch {
            let prior = priors.remove(&history.id_key());
            rows.extend(builder.history_rows(history, prior)?);
        }
        let created = batch.iter().filter(|h| !existing.contains(&h.id_key())).count() as u64;

        let table = self.layout.write_table();
        let token = dedup_token(table, &rows);
        let insert_ctx = ctx.with_setting(SETTING_DEDUP_TOKEN, token);
        // One statement per flush so the token covers exactly one insert
        self.exec
            .batch_insert(&insert_ctx, &builder.insert_sql(table), rows.len(), &rows)?;

        self.exec.metrics().add_entities_created(created);
        Logger::info(
            Event::WriteFlush,
            &[
                ("entity", self.codec.entity()),
                ("chain", &chain),
                ("ids", &batch.len().to_string()),
                ("rows", &rows.len().to_string()),
                ("created", &created.to_string()),
            ],
        );
        Ok(created)
    }

    /// Encoded id parameters in chunks that fit inline
    fn id_chunks(&self, ids: &[&Value]) -> StoreResult<Vec<Vec<SqlValue>>> {
        let encoded = ids
            .iter()
            .map(|id| self.codec.encode_id(id))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(encoded
            .chunks(self.config.huge_id_threshold.max(1))
            .map(<[SqlValue]>::to_vec)
            .collect())
    }

    fn id_condition(count: usize) -> String {
        format!("{} IN ({})", quote_ident(meta::ID), vec!["?"; count].join(", "))
    }

    fn chain_condition() -> String {
        format!("{} = ?", quote_ident(meta::CHAIN))
    }

    fn id_key(&self, row: &crate::sql::Row) -> StoreResult<String> {
        let id = self.codec.id().decode(row).map_err(|e| StoreError::Decode {
            entity: self.codec.entity().to_string(),
            field: meta::ID.to_string(),
            reason: e.to_string(),
        })?;
        Ok(id.unwrap_or(Value::Null).to_string())
    }

    /// Ids with any stored row on the chain
    fn existing_ids(&self, ctx: &QueryContext, chain: &str, ids: &[&Value]) -> StoreResult<BTreeSet<String>> {
        let mut existing = BTreeSet::new();
        for chunk in self.id_chunks(ids)? {
            let sql = format!(
                "SELECT DISTINCT {id} FROM {table} WHERE {chain} AND {ids}",
                id = quote_ident(meta::ID),
                table = self.layout.write_table(),
                chain = Self::chain_condition(),
                ids = Self::id_condition(chunk.len()),
            );
            let mut args = vec![SqlValue::String(chain.to_string())];
            args.extend(chunk);
            self.exec.query(ctx, &sql, &args, &mut |row| {
                existing.insert(self.id_key(row)?);
                Ok(())
            })?;
        }
        Ok(existing)
    }

    /// Latest collapsed state of each id that has one
    fn priors(&self, ctx: &QueryContext, chain: &str, ids: &[&Value]) -> StoreResult<BTreeMap<String, Prior>> {
        let mut priors = BTreeMap::new();
        let columns = self.layout.latest_columns(self.codec);
        for chunk in self.id_chunks(ids)? {
            let sql = latest::collapsed_rows(
                self.layout.query_table(),
                &columns,
                &[Self::chain_condition(), Self::id_condition(chunk.len())],
            );
            let mut args = vec![SqlValue::String(chain.to_string())];
            args.extend(chunk);
            self.exec.query(ctx, &sql, &args, &mut |row| {
                let prior = Prior::from_row(self.codec, row)?;
                let key = self.id_key(row)?;
                // A merge in progress can leave two live groups; the higher version is current
                let newer = priors.get(&key).map_or(true, |p: &Prior| p.version < prior.version);
                if newer {
                    priors.insert(key, prior);
                }
                Ok(())
            })?;
        }
        Ok(priors)
    }

    fn check_write_once(&self, batch: &[History], existing: &BTreeSet<String>) -> StoreResult<()> {
        let offending: Vec<&History> = batch
            .iter()
            .filter(|h| existing.contains(&h.id_key()) || h.boxes.len() > 1)
            .collect();
        let sample = match offending.first().and_then(|h| h.boxes.last()) {
            Some(sample) => sample.to_string(),
            None => return Ok(()),
        };
        Err(StoreError::ImmutableWrite {
            entity: self.codec.entity().to_string(),
            ids: offending.iter().map(|h| h.id_key()).collect(),
            sample,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Features;
    use crate::ddl::Naming;
    use crate::observability::MetricsRegistry;
    use crate::schema::{EntityType, Field, Schema, TypeRef};
    use crate::sql::{MemoryConnection, Row, StatementKind};

    fn setup(config: &StoreConfig, immutable: bool) -> (EntityCodec, Layout) {
        let mut entity = EntityType::new(
            "Pool",
            vec![
                Field::new("id", TypeRef::required("ID")),
                Field::new("a", TypeRef::optional("Int")),
            ],
        );
        if immutable {
            entity = entity.immutable();
        }
        let schema = Schema {
            entities: vec![entity.clone()],
            ..Schema::default()
        };
        let codec = EntityCodec::for_entity(&schema, &entity, &config.features).unwrap();
        let layout = Layout::for_entity(&Naming::new("db", "p1"), &config.features, &entity);
        (codec, layout)
    }

    fn write(id: &str, block: u64, a: i32) -> EntityBox {
        EntityBox::new("Pool", id, "eth", block).with_field("a", a)
    }

    #[test]
    fn test_collapsing_write_retracts_stored_state() {
        let config = StoreConfig::new("db", "p1");
        let (codec, layout) = setup(&config, false);
        let conn = MemoryConnection::new();
        conn.script(
            "HAVING sum(`__sign`) > 0",
            vec![Row::from_pairs(vec![
                ("id", SqlValue::String("x".into())),
                ("__genBlockChain", SqlValue::String("eth".into())),
                ("__version", SqlValue::UInt64(4)),
                ("__genBlockNumber", SqlValue::UInt64(5)),
                ("__deleted", SqlValue::Bool(false)),
                ("a", SqlValue::Int32(7)),
            ])],
        );
        let metrics = MetricsRegistry::new();
        let writer = EntityWriter::new(StatementExecutor::new(&conn, &metrics, 1_000), &codec, &layout, &config);

        let created = writer
            .write(&QueryContext::new(), vec![write("x", 10, 8), write("y", 10, 1)])
            .unwrap();
        assert_eq!(created, 1);

        let stmts = conn.statements();
        assert_eq!(stmts[0].args[0], SqlValue::String("eth".into()));
        let insert = stmts.iter().find(|s| s.kind == StatementKind::Insert).unwrap();
        assert!(insert.sql.starts_with("INSERT INTO `db`.`p1_versionedEntity_Pool`"));
        assert!(insert.settings.contains_key(SETTING_DEDUP_TOKEN));
        assert_eq!(insert.rows.len(), 3);
        // retraction of version 4 then version 5 for x, first version for y
        assert_eq!(insert.rows[0][1], SqlValue::Int32(7));
        assert_eq!(insert.rows[0][7], SqlValue::Int8(-1));
        assert_eq!(insert.rows[0][8], SqlValue::UInt64(4));
        assert_eq!(insert.rows[1][8], SqlValue::UInt64(5));
        assert_eq!(insert.rows[2][0], SqlValue::String("y".into()));
        assert_eq!(insert.rows[2][8], SqlValue::UInt64(1));
        assert_eq!(metrics.snapshot().entities_created, 1);
    }

    fn bytes_id_codec(config: &StoreConfig) -> (EntityCodec, Layout) {
        let entity = EntityType::new(
            "Pool",
            vec![
                Field::new("id", TypeRef::required("Bytes")),
                Field::new("a", TypeRef::optional("Int")),
            ],
        );
        let schema = Schema {
            entities: vec![entity.clone()],
            ..Schema::default()
        };
        let codec = EntityCodec::for_entity(&schema, &entity, &config.features).unwrap();
        let layout = Layout::for_entity(&Naming::new("db", "p1"), &config.features, &entity);
        (codec, layout)
    }

    fn bytes_write(id: &str, block: u64, a: i32) -> EntityBox {
        EntityBox::new("Pool", Value::Bytes(id.into()), "eth", block).with_field("a", a)
    }

    #[test]
    fn test_mixed_case_bytes_id_finds_stored_state() {
        let config = StoreConfig::new("db", "p1");
        let (codec, layout) = bytes_id_codec(&config);
        let conn = MemoryConnection::new();
        conn.script(
            "HAVING sum(`__sign`) > 0",
            vec![Row::from_pairs(vec![
                ("id", SqlValue::String("0xab".into())),
                ("__genBlockChain", SqlValue::String("eth".into())),
                ("__version", SqlValue::UInt64(4)),
                ("__genBlockNumber", SqlValue::UInt64(5)),
                ("__deleted", SqlValue::Bool(false)),
                ("a", SqlValue::Int32(7)),
            ])],
        );
        let metrics = MetricsRegistry::new();
        let writer = EntityWriter::new(StatementExecutor::new(&conn, &metrics, 1_000), &codec, &layout, &config);

        let created = writer
            .write(&QueryContext::new(), vec![bytes_write("0xAB", 10, 8)])
            .unwrap();
        assert_eq!(created, 0);

        let rows = conn.inserted_rows("p1_versionedEntity_Pool");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], SqlValue::String("0xab".into()));
        assert_eq!(rows[0][1], SqlValue::Int32(7));
        assert_eq!(rows[0][7], SqlValue::Int8(-1));
        assert_eq!(rows[0][8], SqlValue::UInt64(4));
        assert_eq!(rows[1][1], SqlValue::Int32(8));
        assert_eq!(rows[1][7], SqlValue::Int8(1));
        assert_eq!(rows[1][8], SqlValue::UInt64(5));
    }

    #[test]
    fn test_bytes_ids_differing_in_case_share_a_history() {
        let config = StoreConfig::new("db", "p1");
        let (codec, layout) = bytes_id_codec(&config);
        let conn = MemoryConnection::new();
        let metrics = MetricsRegistry::new();
        let writer = EntityWriter::new(StatementExecutor::new(&conn, &metrics, 1_000), &codec, &layout, &config);

        let created = writer
            .write(
                &QueryContext::new(),
                vec![bytes_write("0xAB", 10, 1), bytes_write("0xab", 20, 2)],
            )
            .unwrap();
        assert_eq!(created, 1);

        let rows = conn.inserted_rows("p1_versionedEntity_Pool");
        let versions: Vec<&SqlValue> = rows.iter().map(|r| &r[8]).collect();
        assert_eq!(
            versions,
            vec![&SqlValue::UInt64(1), &SqlValue::UInt64(1), &SqlValue::UInt64(2)]
        );
    }

    #[test]
    fn test_immutable_bytes_id_rewrite_is_rejected_in_any_case() {
        let config = StoreConfig::new("db", "p1");
        let entity = EntityType::new(
            "Token",
            vec![
                Field::new("id", TypeRef::required("Bytes")),
                Field::new("a", TypeRef::optional("Int")),
            ],
        )
        .immutable();
        let schema = Schema {
            entities: vec![entity.clone()],
            ..Schema::default()
        };
        let codec = EntityCodec::for_entity(&schema, &entity, &config.features).unwrap();
        let layout = Layout::for_entity(&Naming::new("db", "p1"), &config.features, &entity);
        let conn = MemoryConnection::new();
        conn.script(
            "SELECT DISTINCT",
            vec![Row::from_pairs(vec![("id", SqlValue::String("0xab".into()))])],
        );
        let metrics = MetricsRegistry::new();
        let writer = EntityWriter::new(StatementExecutor::new(&conn, &metrics, 1_000), &codec, &layout, &config);
        let token = EntityBox::new("Token", Value::Bytes("0xAB".into()), "eth", 10).with_field("a", 1);
        let err = writer.write(&QueryContext::new(), vec![token]).unwrap_err();
        assert!(matches!(err, StoreError::ImmutableWrite { .. }));
    }

    #[test]
    fn test_plain_write_appends() {
        let config = StoreConfig::new("db", "p1").with_features(Features::plain());
        let (codec, layout) = setup(&config, false);
        let conn = MemoryConnection::new();
        let metrics = MetricsRegistry::new();
        let writer = EntityWriter::new(StatementExecutor::new(&conn, &metrics, 1_000), &codec, &layout, &config);
        let created = writer
            .write(&QueryContext::new(), vec![write("x", 20, 2), write("x", 10, 1)])
            .unwrap();
        assert_eq!(created, 1);
        let rows = conn.inserted_rows("p1_entity_Pool");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][2], SqlValue::UInt64(10));
        assert_eq!(rows[1][2], SqlValue::UInt64(20));
        assert!(conn.executed_sql()[0].starts_with("SELECT DISTINCT `id`"));
    }

    #[test]
    fn test_immutable_rejects_existing_ids() {
        let config = StoreConfig::new("db", "p1");
        let (codec, layout) = setup(&config, true);
        let conn = MemoryConnection::new();
        conn.script(
            "SELECT DISTINCT",
            vec![Row::from_pairs(vec![("id", SqlValue::String("x".into()))])],
        );
        let metrics = MetricsRegistry::new();
        let writer = EntityWriter::new(StatementExecutor::new(&conn, &metrics, 1_000), &codec, &layout, &config);
        let err = writer
            .write(&QueryContext::new(), vec![write("x", 10, 1), write("y", 10, 1)])
            .unwrap_err();
        match err {
            StoreError::ImmutableWrite { entity, ids, sample } => {
                assert_eq!(entity, "Pool");
                assert_eq!(ids, vec!["x".to_string()]);
                assert!(sample.contains("id: x"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(conn.inserted_rows("p1_entity_Pool").is_empty());
    }

    #[test]
    fn test_invalid_box_writes_nothing() {
        let config = StoreConfig::new("db", "p1");
        let (codec, layout) = setup(&config, false);
        let conn = MemoryConnection::new();
        let metrics = MetricsRegistry::new();
        let writer = EntityWriter::new(StatementExecutor::new(&conn, &metrics, 1_000), &codec, &layout, &config);
        let bad = EntityBox::new("Pool", "x", "eth", 1).with_field("nope", 1);
        assert!(writer.write(&QueryContext::new(), vec![write("y", 1, 1), bad]).is_err());
        assert!(conn.statements().is_empty());
    }

    #[test]
    fn test_flushes_follow_batch_size() {
        let mut config = StoreConfig::new("db", "p1").with_features(Features::plain());
        config.insert_batch_size = 2;
        let (codec, layout) = setup(&config, false);
        let conn = MemoryConnection::new();
        let metrics = MetricsRegistry::new();
        let writer = EntityWriter::new(StatementExecutor::new(&conn, &metrics, 1_000), &codec, &layout, &config);
        let boxes = (0..5).map(|i| write(&format!("id{}", i), 1, i)).collect();
        assert_eq!(writer.write(&QueryContext::new(), boxes).unwrap(), 5);
        let inserts: Vec<_> = conn
            .statements()
            .into_iter()
            .filter(|s| s.kind == StatementKind::Insert)
            .collect();
        assert_eq!(inserts.len(), 3);
        let tokens: BTreeSet<_> = inserts
            .iter()
            .map(|s| s.settings.get(SETTING_DEDUP_TOKEN).cloned())
            .collect();
        assert_eq!(tokens.len(), 3);
    }
}
