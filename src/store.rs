//! Store facade
//!
//! `Store` owns the resolved codecs and layouts of one schema and exposes the
//! read, write, reorg, migration and rollup operations over a connection.
//!
//! Reads of an interface fan out to every implementor and merge the results
//! in id order. Writes, reorgs and rollups go through their own engines; the
//! store only resolves which codec and layout apply.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::aggregate::{Aggregator, Rollup};
use crate::codec::{meta, EntityCodec};
use crate::config::StoreConfig;
use crate::ddl::{ExpectedObject, Layout, Naming, ObjectBuilder};
use crate::entity::{EntityBox, Value};
use crate::error::{StoreError, StoreResult};
use crate::migrate::{MigrationPlan, Migrator, ObjectCatalog, SystemCatalog};
use crate::observability::{Event, Logger, MetricsRegistry, MetricsSnapshot};
use crate::query::{compare_ids, EntityQuery, Filter};
use crate::reorg::{ReorgEngine, ReorgReport, ReorgTarget};
use crate::schema::{AggregationInterval, Schema};
use crate::sql::{Connection, QueryContext, StatementExecutor};
use crate::write::{EntityWriter, RowBuilder};

/// Versioned entity store of one processor
pub struct Store<C: Connection> {
    conn: C,
    config: StoreConfig,
    schema: Schema,
    naming: Naming,
    /// Entity, interface and aggregation codecs by type name
    codecs: BTreeMap<String, EntityCodec>,
    /// Entity and aggregation layouts by type name
    layouts: BTreeMap<String, Layout>,
    metrics: MetricsRegistry,
    catalog: Box<dyn ObjectCatalog>,
    migration_lock: Mutex<()>,
}

impl<C: Connection> Store<C> {
    /// Validate the config and resolve every type of the schema
    pub fn open(conn: C, config: StoreConfig, schema: Schema) -> StoreResult<Self> {
        config.validate()?;
        let naming = Naming::new(&config.database, &config.processor_id);
        let features = &config.features;

        let mut codecs = BTreeMap::new();
        let mut layouts = BTreeMap::new();
        for entity in &schema.entities {
            codecs.insert(entity.name.clone(), EntityCodec::for_entity(&schema, entity, features)?);
            layouts.insert(entity.name.clone(), Layout::for_entity(&naming, features, entity));
        }
        for interface in &schema.interfaces {
            codecs.insert(interface.name.clone(), EntityCodec::for_interface(&schema, interface, features)?);
        }
        for aggregation in &schema.aggregations {
            codecs.insert(
                aggregation.name.clone(),
                EntityCodec::for_aggregation(&schema, aggregation, features)?,
            );
            layouts.insert(aggregation.name.clone(), Layout::for_aggregation(&naming, aggregation));
        }

        Logger::info(
            Event::StoreOpened,
            &[
                ("database", &config.database),
                ("processor", &config.processor_id),
                ("entities", &schema.entities.len().to_string()),
                ("interfaces", &schema.interfaces.len().to_string()),
                ("aggregations", &schema.aggregations.len().to_string()),
            ],
        );
        Ok(Self {
            conn,
            config,
            schema,
            naming,
            codecs,
            layouts,
            metrics: MetricsRegistry::new(),
            catalog: Box::new(SystemCatalog),
            migration_lock: Mutex::new(()),
        })
    }

    /// Replace where existing objects are read from
    pub fn with_catalog(mut self, catalog: Box<dyn ObjectCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn executor(&self) -> StatementExecutor<'_> {
        StatementExecutor::new(&self.conn, &self.metrics, self.config.slow_query_ms)
    }

    fn codec(&self, type_name: &str) -> StoreResult<&EntityCodec> {
        self.codecs
            .get(type_name)
            .ok_or_else(|| StoreError::UnknownEntity(type_name.to_string()))
    }

    fn layout(&self, type_name: &str) -> StoreResult<&Layout> {
        self.layouts
            .get(type_name)
            .ok_or_else(|| StoreError::UnknownEntity(type_name.to_string()))
    }

    /// Readers of a type: itself, or every implementor of an interface
    fn readers(&self, type_name: &str) -> StoreResult<Vec<EntityQuery<'_>>> {
        let names: Vec<&str> = if self.schema.interface(type_name).is_some() {
            self.schema
                .implementors(type_name)
                .into_iter()
                .map(|e| e.name.as_str())
                .collect()
        } else {
            vec![type_name]
        };
        names
            .into_iter()
            .map(|name| {
                Ok(EntityQuery::new(
                    self.executor(),
                    self.codec(name)?,
                    self.layout(name)?,
                    &self.config,
                ))
            })
            .collect()
    }

    /// Latest live version of one id
    pub fn get_entity(&self, ctx: &QueryContext, type_name: &str, chain: &str, id: &Value) -> StoreResult<Option<EntityBox>> {
        for reader in self.readers(type_name)? {
            if let Some(found) = reader.get(ctx, chain, id)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Latest live versions matching every filter, in id order
    pub fn list_entities(
        &self,
        ctx: &QueryContext,
        type_name: &str,
        chain: &str,
        filters: &[Filter],
        limit: Option<usize>,
    ) -> StoreResult<Vec<EntityBox>> {
        let readers = self.readers(type_name)?;
        if let [reader] = readers.as_slice() {
            return reader.list(ctx, chain, filters, limit);
        }
        let mut merged = Vec::new();
        for reader in &readers {
            merged.extend(reader.list(ctx, chain, filters, limit)?);
        }
        merged.sort_by(|a, b| compare_ids(&a.id, &b.id));
        if let Some(limit) = limit {
            merged.truncate(limit);
        }
        Ok(merged)
    }

    pub fn count_entity(&self, ctx: &QueryContext, type_name: &str, chain: &str, filters: &[Filter]) -> StoreResult<u64> {
        let mut total = 0;
        for reader in self.readers(type_name)? {
            total += reader.count(ctx, chain, filters)?;
        }
        Ok(total)
    }

    /// Every live id, in id order
    pub fn get_all_id(&self, ctx: &QueryContext, type_name: &str, chain: &str) -> StoreResult<Vec<String>> {
        let mut ids = Vec::new();
        for reader in self.readers(type_name)? {
            ids.extend(reader.all_ids(ctx, chain)?);
        }
        ids.sort_by(compare_ids);
        Ok(ids.iter().map(Value::to_string).collect())
    }

    pub fn get_max_id(&self, ctx: &QueryContext, type_name: &str, chain: &str) -> StoreResult<Option<Value>> {
        let mut max: Option<Value> = None;
        for reader in self.readers(type_name)? {
            if let Some(id) = reader.max_id(ctx, chain)? {
                max = match max {
                    Some(current) if compare_ids(&current, &id).is_ge() => Some(current),
                    _ => Some(id),
                };
            }
        }
        Ok(max)
    }

    /// Write the boxes of one entity; returns the number of ids written
    pub fn set_entities(&self, ctx: &QueryContext, type_name: &str, boxes: Vec<EntityBox>) -> StoreResult<u64> {
        if self.schema.entity(type_name).is_none() {
            return match self.schema.kind_of(type_name) {
                Some(_) => Err(StoreError::invalid_input(format!(
                    "{} is not an entity and cannot be written",
                    type_name
                ))),
                None => Err(StoreError::UnknownEntity(type_name.to_string())),
            };
        }
        EntityWriter::new(self.executor(), self.codec(type_name)?, self.layout(type_name)?, &self.config)
            .write(ctx, boxes)
    }

    /// Roll every entity and aggregation of a chain back to `block_number`
    pub fn reorg(&self, ctx: &QueryContext, block_number: u64, chain: &str) -> StoreResult<ReorgReport> {
        let mut targets = Vec::with_capacity(self.layouts.len());
        for (name, layout) in &self.layouts {
            let codec = self.codec(name)?;
            let mut columns = RowBuilder::new(codec, layout.is_collapsing()).columns();
            if matches!(layout, Layout::Aggregation { .. }) {
                columns.push(meta::INTERVAL.to_string());
            }
            targets.push(ReorgTarget {
                name: name.as_str(),
                layout,
                columns,
            });
        }
        ReorgEngine::new(self.executor()).reorg(ctx, &targets, block_number, chain)
    }

    /// Every object the schema requires, in apply order
    pub fn expected_objects(&self) -> Vec<ExpectedObject> {
        ObjectBuilder {
            naming: &self.naming,
            features: &self.config.features,
            settings: &self.config.table_settings,
            schema: &self.schema,
            codecs: &self.codecs,
        }
        .build()
    }

    /// Bring tables and views in line with the schema
    pub fn init_entity_schema(&self, ctx: &QueryContext) -> StoreResult<MigrationPlan> {
        self.sync(ctx, false)
    }

    /// Re-derive views only; tables are left untouched
    pub fn create_views(&self, ctx: &QueryContext) -> StoreResult<MigrationPlan> {
        self.sync(ctx, true)
    }

    fn sync(&self, ctx: &QueryContext, views_only: bool) -> StoreResult<MigrationPlan> {
        let _guard = self
            .migration_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let expected = self.expected_objects();
        Migrator::new(self.executor(), self.catalog.as_ref(), &self.naming).sync(ctx, &expected, views_only)
    }

    /// Compute one bucket of an aggregation; returns the rows inserted
    pub fn aggregate(
        &self,
        ctx: &QueryContext,
        aggregation: &str,
        interval: AggregationInterval,
        chain: &str,
        window_start: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let declared = self
            .schema
            .aggregation(aggregation)
            .ok_or_else(|| StoreError::UnknownEntity(aggregation.to_string()))?;
        let rollup = Rollup {
            aggregation: declared,
            source: self.codec(&declared.source)?,
            source_layout: self.layout(&declared.source)?,
            codec: self.codec(aggregation)?,
            layout: self.layout(aggregation)?,
        };
        Aggregator::new(self.executor(), &self.config).rollup(ctx, &rollup, interval, chain, window_start)
    }
}
