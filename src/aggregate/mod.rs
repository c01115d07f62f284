//! Aggregation rollups
//!
//! A rollup computes one bucket `[start, start + interval)` of an
//! aggregation from the live rows of its source entity on one chain:
//! - rows are grouped by the declared dimensions
//! - every aggregate is computed in the database from the source column
//! - results are re-encoded through the aggregation codec and inserted
//!   with the bucket's `__interval`
//!
//! Bucket ids are `<interval>-<start micros>[-<dimension>...]`, so
//! recomputing a bucket replaces it once the table merges.

use chrono::{DateTime, TimeZone, Utc};
use num_bigint::BigInt;

use crate::codec::{meta, EntityCodec, FieldCodec};
use crate::config::StoreConfig;
use crate::ddl::{latest, Layout};
use crate::entity::{Decimal, EntityBox, Value};
use crate::error::{StoreError, StoreResult};
use crate::observability::{Event, Logger};
use crate::schema::{AggregateField, AggregateFunc, Aggregation, AggregationInterval};
use crate::sql::{quote_ident, QueryContext, Row, SqlValue, StatementExecutor, SETTING_DEDUP_TOKEN};
use crate::write::{dedup_token, History, RowBuilder};

/// Source timestamp field buckets are cut on
pub const TIMESTAMP_FIELD: &str = "timestamp";

const MAX_BLOCK: &str = "__agg_block";
const MAX_TIME: &str = "__agg_time";
const LAST_HASH: &str = "__agg_hash";

/// Everything a rollup reads from and writes to
#[derive(Debug, Clone, Copy)]
pub struct Rollup<'a> {
    pub aggregation: &'a Aggregation,
    pub source: &'a EntityCodec,
    pub source_layout: &'a Layout,
    pub codec: &'a EntityCodec,
    pub layout: &'a Layout,
}

/// Start of the bucket holding `time`
pub fn bucket_start(time: DateTime<Utc>, interval: AggregationInterval) -> DateTime<Utc> {
    let seconds = interval.seconds();
    let start = time.timestamp().div_euclid(seconds) * seconds;
    Utc.timestamp_opt(start, 0).single().unwrap_or(time)
}

/// Id of one bucket row; `-` and `\` inside dimension values are escaped
pub fn bucket_id(interval: AggregationInterval, start: DateTime<Utc>, dimensions: &[Value]) -> String {
    let mut parts = vec![interval.as_str().to_string(), start.timestamp_micros().to_string()];
    parts.extend(
        dimensions
            .iter()
            .map(|d| d.to_string().replace('\\', "\\\\").replace('-', "\\-")),
    );
    parts.join("-")
}

pub struct Aggregator<'a> {
    exec: StatementExecutor<'a>,
    config: &'a StoreConfig,
}

impl<'a> Aggregator<'a> {
    pub fn new(exec: StatementExecutor<'a>, config: &'a StoreConfig) -> Self {
        Self { exec, config }
    }

    /// Compute and insert one bucket; returns the number of bucket rows
    pub fn rollup(
        &self,
        ctx: &QueryContext,
        target: &Rollup<'_>,
        interval: AggregationInterval,
        chain: &str,
        start: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let aggregation = target.aggregation;
        if !aggregation.intervals.contains(&interval) {
            return Err(StoreError::invalid_input(format!(
                "aggregation {} has no {} interval",
                aggregation.name,
                interval.as_str()
            )));
        }
        if bucket_start(start, interval) != start {
            return Err(StoreError::invalid_input(format!(
                "bucket start {} is not aligned to {}",
                start.to_rfc3339(),
                interval.as_str()
            )));
        }

        let (sql, args) = self.bucket_query(target, interval, chain, start)?;
        let mut boxes = Vec::new();
        self.exec.query(ctx, &sql, &args, &mut |row| {
            boxes.push(self.bucket_box(target, interval, chain, start, row)?);
            Ok(())
        })?;
        if boxes.is_empty() {
            return Ok(0);
        }

        let builder = RowBuilder::new(target.codec, false);
        let mut rows = Vec::with_capacity(boxes.len());
        for entity_box in boxes {
            let history = History {
                chain: chain.to_string(),
                boxes: vec![entity_box],
            };
            for mut row in builder.history_rows(&history, None)? {
                row.push(SqlValue::String(interval.as_str().to_string()));
                rows.push(row);
            }
        }

        let table = target.layout.write_table();
        let mut columns: Vec<String> = builder.columns().iter().map(|c| quote_ident(c)).collect();
        columns.push(quote_ident(meta::INTERVAL));
        let insert = format!("INSERT INTO {} ({}) VALUES", table, columns.join(", "));
        let insert_ctx = ctx.with_setting(SETTING_DEDUP_TOKEN, dedup_token(table, &rows));
        self.exec
            .batch_insert(&insert_ctx, &insert, self.config.insert_batch_size, &rows)?;

        let count = rows.len();
        Logger::info(
            Event::AggregationRollup,
            &[
                ("aggregation", &aggregation.name),
                ("interval", interval.as_str()),
                ("chain", chain),
                ("start", &start.to_rfc3339()),
                ("rows", &count.to_string()),
            ],
        );
        Ok(count)
    }

    fn bucket_query(
        &self,
        target: &Rollup<'_>,
        interval: AggregationInterval,
        chain: &str,
        start: DateTime<Utc>,
    ) -> StoreResult<(String, Vec<SqlValue>)> {
        let source = target.source;
        let aggregation = target.aggregation;
        let timestamp = source
            .field(TIMESTAMP_FIELD)
            .filter(|f| f.is_timestamp())
            .ok_or_else(|| {
                StoreError::invalid_input(format!("source {} has no Timestamp field 'timestamp'", source.entity()))
            })?;
        let ts_expr = timestamp
            .filter_expr()
            .ok_or_else(|| StoreError::invalid_input("timestamp field is not comparable"))?;

        let mut group_by = Vec::new();
        for dimension in &aggregation.dimensions {
            let field = source_field(target, dimension)?;
            group_by.extend(field.columns().into_iter().map(|c| quote_ident(&c.name)));
        }

        let mut select = group_by.clone();
        for aggregate in &aggregation.aggregates {
            select.push(format!(
                "{} AS {}",
                aggregate_expr(target, aggregate, &ts_expr)?,
                quote_ident(&output_alias(&aggregate.name))
            ));
        }
        let block = quote_ident(meta::BLOCK_NUMBER);
        select.push(format!("max({}) AS {}", block, quote_ident(MAX_BLOCK)));
        select.push(format!(
            "max({}) AS {}",
            quote_ident(meta::BLOCK_TIME),
            quote_ident(MAX_TIME)
        ));
        select.push(format!(
            "argMax({}, {}) AS {}",
            quote_ident(meta::BLOCK_HASH),
            block,
            quote_ident(LAST_HASH)
        ));

        let rows = target.source_layout.latest_rows(
            source,
            self.config.features.window_latest,
            &[format!("{} = ?", quote_ident(meta::CHAIN))],
        );
        let live = latest::live_rows(&rows, &[format!("{} >= ?", ts_expr), format!("{} < ?", ts_expr)]);

        let mut sql = format!("SELECT {} FROM ({})", select.join(", "), live);
        if !group_by.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", group_by.join(", ")));
        }
        sql.push_str(" HAVING count() > 0");

        let end = start + chrono::Duration::seconds(interval.seconds());
        let bound = |t: DateTime<Utc>| {
            timestamp
                .filter_param(&Value::Timestamp(t))
                .map_err(|e| StoreError::invalid_input(e.to_string()))
        };
        let args = vec![SqlValue::String(chain.to_string()), bound(start)?, bound(end)?];
        Ok((sql, args))
    }

    fn bucket_box(
        &self,
        target: &Rollup<'_>,
        interval: AggregationInterval,
        chain: &str,
        start: DateTime<Utc>,
        row: &Row,
    ) -> StoreResult<EntityBox> {
        let aggregation = target.aggregation;
        let decode_error = |field: &str, reason: String| StoreError::Decode {
            entity: aggregation.name.clone(),
            field: field.to_string(),
            reason,
        };

        let mut dimensions = Vec::with_capacity(aggregation.dimensions.len());
        for dimension in &aggregation.dimensions {
            let value = source_field(target, dimension)?
                .decode(row)
                .map_err(|e| decode_error(dimension, e.to_string()))?
                .unwrap_or(Value::Null);
            dimensions.push(value);
        }

        let block = row.get(MAX_BLOCK).and_then(SqlValue::as_u64).unwrap_or(0);
        let mut entity_box = EntityBox::new(
            aggregation.name.as_str(),
            bucket_id(interval, start, &dimensions),
            chain,
            block,
        )
        .with_field(TIMESTAMP_FIELD, Value::Timestamp(start));
        entity_box = match row.get(MAX_TIME) {
            Some(SqlValue::DateTime64(time)) => entity_box.with_block_time(*time),
            _ => entity_box.with_block_time(start),
        };
        if let Some(hash) = row.get(LAST_HASH).and_then(SqlValue::as_str) {
            entity_box = entity_box.with_block_hash(hash);
        }
        for (name, value) in aggregation.dimensions.iter().zip(dimensions) {
            entity_box = entity_box.with_field(name.as_str(), value);
        }
        for aggregate in &aggregation.aggregates {
            let raw = row.get(&output_alias(&aggregate.name)).unwrap_or(&SqlValue::Null);
            let value = to_value(raw, aggregate.ty.base_name()).map_err(|reason| decode_error(&aggregate.name, reason))?;
            entity_box = entity_box.with_field(aggregate.name.as_str(), value);
        }
        target.codec.validate(&entity_box)?;
        Ok(entity_box)
    }
}

fn source_field<'t>(target: &Rollup<'t>, name: &str) -> StoreResult<&'t FieldCodec> {
    target
        .source
        .field(name)
        .filter(|f| !f.is_virtual())
        .ok_or_else(|| {
            StoreError::invalid_input(format!(
                "aggregation {} reads unknown field {}.{}",
                target.aggregation.name,
                target.source.entity(),
                name
            ))
        })
}

fn output_alias(name: &str) -> String {
    format!("__agg_{}", name)
}

/// Database expression of one aggregate
fn aggregate_expr(target: &Rollup<'_>, aggregate: &AggregateField, ts_expr: &str) -> StoreResult<String> {
    let arg = match &aggregate.arg {
        Some(arg) => {
            let field = source_field(target, arg)?;
            Some(field.filter_expr().ok_or_else(|| {
                StoreError::invalid_input(format!("aggregate {} cannot read list field {}", aggregate.name, arg))
            })?)
        }
        None => None,
    };
    let expr = match (aggregate.func, arg) {
        (AggregateFunc::Count, None) => "count()".to_string(),
        (AggregateFunc::Count, Some(arg)) => format!("count({})", arg),
        (AggregateFunc::First, Some(arg)) => format!("argMin({}, {})", arg, ts_expr),
        (AggregateFunc::Last, Some(arg)) => format!("argMax({}, {})", arg, ts_expr),
        (func, Some(arg)) => format!("{}({})", func.as_str(), arg),
        (func, None) => {
            return Err(StoreError::invalid_input(format!(
                "aggregate {} uses {} without an argument",
                aggregate.name,
                func.as_str()
            )))
        }
    };
    Ok(match aggregate.ty.base_name() {
        "BigInt" | "BigDecimal" => format!("toString({})", expr),
        "Float" => format!("toFloat64({})", expr),
        _ => expr,
    })
}

/// Database result to a value of the aggregate's declared type
fn to_value(raw: &SqlValue, base: &str) -> Result<Value, String> {
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let bad = || format!("unexpected {} for {}", raw, base);
    Ok(match base {
        "BigInt" => match raw {
            SqlValue::Int256(v) => Value::BigInt(v.clone()),
            SqlValue::String(s) => Value::BigInt(s.parse::<BigInt>().map_err(|_| bad())?),
            other => Value::BigInt(BigInt::from(other.as_i64().ok_or_else(bad)?)),
        },
        "BigDecimal" => match raw {
            SqlValue::Decimal(d) => Value::BigDecimal(d.clone()),
            SqlValue::String(s) => Value::BigDecimal(s.parse::<Decimal>().map_err(|_| bad())?),
            other => Value::BigDecimal(Decimal::new(BigInt::from(other.as_i64().ok_or_else(bad)?), 0)),
        },
        "Int" => Value::Int(i32::try_from(raw.as_i64().ok_or_else(bad)?).map_err(|_| bad())?),
        "Int8" => Value::Int8(raw.as_i64().ok_or_else(bad)?),
        "Float" => match raw {
            SqlValue::Float64(f) => Value::Float(*f),
            other => Value::Float(other.as_i64().ok_or_else(bad)? as f64),
        },
        "Boolean" => Value::Bool(raw.as_bool().ok_or_else(bad)?),
        "Timestamp" => match raw {
            SqlValue::DateTime64(t) => Value::Timestamp(*t),
            _ => return Err(bad()),
        },
        "Bytes" => Value::Bytes(raw.as_str().ok_or_else(bad)?.to_string()),
        _ => Value::String(raw.as_str().ok_or_else(bad)?.to_string()),
    })
}
