//! Meta columns
//!
//! Every entity table carries the id, the write provenance, the soft-delete
//! flag and the insert time. Collapsing tables add sign and version,
//! aggregation tables add the interval and interface views add the
//! implementor name.

use chrono::{DateTime, Utc};

use crate::error::{StoreError, StoreResult};
use crate::sql::{Row, SqlValue};

use super::ColumnSpec;

pub const ID: &str = "id";
pub const BLOCK_NUMBER: &str = "__genBlockNumber";
pub const BLOCK_TIME: &str = "__genBlockTime";
pub const BLOCK_HASH: &str = "__genBlockHash";
pub const CHAIN: &str = "__genBlockChain";
pub const DELETED: &str = "__deleted";
pub const INSERT_TIME: &str = "__timestamp";
pub const SIGN: &str = "__sign";
pub const VERSION: &str = "__version";
pub const INTERVAL: &str = "__interval";
pub const TYPENAME: &str = "__typename";

/// Provenance columns written with every row, in write order
pub const PROVENANCE: [&str; 5] = [BLOCK_NUMBER, BLOCK_TIME, BLOCK_HASH, CHAIN, DELETED];

/// Read-only aliases exposed by views
pub const ALIASES: [(&str, &str); 5] = [
    (BLOCK_NUMBER, "meta.block_number"),
    (BLOCK_TIME, "meta.block_time"),
    (BLOCK_HASH, "meta.block_hash"),
    (CHAIN, "meta.chain"),
    (DELETED, "meta.deleted"),
];

/// Alias of the version column on collapsing views
pub const VERSION_ALIAS: &str = "meta.version";

/// Provenance column specs, insert time included
pub fn provenance_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new(BLOCK_NUMBER, "UInt64"),
        ColumnSpec::new(BLOCK_TIME, "DateTime64(6, 'UTC')"),
        ColumnSpec::new(BLOCK_HASH, "String"),
        ColumnSpec::new(CHAIN, "LowCardinality(String)"),
        ColumnSpec::new(DELETED, "Bool"),
        ColumnSpec::new(INSERT_TIME, "DateTime64(6, 'UTC') DEFAULT now64(6)"),
    ]
}

/// Sign and version of collapsing tables
pub fn collapsing_columns() -> Vec<ColumnSpec> {
    vec![ColumnSpec::new(SIGN, "Int8"), ColumnSpec::new(VERSION, "UInt64")]
}

/// Provenance read back from a result row
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub block_number: u64,
    pub block_time: DateTime<Utc>,
    pub block_hash: String,
    pub chain: String,
    pub deleted: bool,
}

impl Provenance {
    pub fn from_row(row: &Row) -> StoreResult<Self> {
        let missing = |column: &str| StoreError::Decode {
            entity: String::new(),
            field: column.to_string(),
            reason: "meta column missing or mistyped".to_string(),
        };
        let block_time = match row.get(BLOCK_TIME) {
            Some(SqlValue::DateTime64(t)) => *t,
            Some(SqlValue::Null) | None => DateTime::<Utc>::default(),
            Some(_) => return Err(missing(BLOCK_TIME)),
        };
        Ok(Self {
            block_number: row
                .get(BLOCK_NUMBER)
                .and_then(SqlValue::as_u64)
                .ok_or_else(|| missing(BLOCK_NUMBER))?,
            block_time,
            block_hash: row
                .get(BLOCK_HASH)
                .and_then(SqlValue::as_str)
                .unwrap_or_default()
                .to_string(),
            chain: row
                .get(CHAIN)
                .and_then(SqlValue::as_str)
                .ok_or_else(|| missing(CHAIN))?
                .to_string(),
            deleted: row.get(DELETED).and_then(SqlValue::as_bool).unwrap_or(false),
        })
    }
}
