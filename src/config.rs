//! Store configuration
//!
//! Loaded from JSON (all fields but `database` and `processor_id` default),
//! immutable once a `Store` is built. Feature flags select the physical
//! encoding and are part of every schema hash, so flipping one triggers a
//! migration of every object.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::sql::is_plain_identifier;

/// How BigDecimal fields are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecimalMode {
    /// `Decimal(76, 30)`
    #[default]
    Decimal76,
    /// `Decimal(154, 60)`
    Decimal154,
    /// Exact decimal text in a `String` column
    String,
}

impl DecimalMode {
    /// Returns (precision, scale) for fixed-precision modes
    pub fn precision_scale(&self) -> Option<(u32, u32)> {
        match self {
            DecimalMode::Decimal76 => Some((76, 30)),
            DecimalMode::Decimal154 => Some((154, 60)),
            DecimalMode::String => None,
        }
    }
}

/// How Timestamp fields are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimestampMode {
    /// Microseconds since the epoch in an `Int64`
    EpochMicros,
    /// `DateTime64(6, 'UTC')`
    #[default]
    DateTime64,
}

/// Feature flags selecting storage layout and encodings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    /// Mutable entities use raw + collapsing table pairs
    pub version_collapsing: bool,
    /// BigInt stored as `Int256` instead of the portable tuple
    pub native_bigint: bool,
    /// BigDecimal encoding
    pub decimal_mode: DecimalMode,
    /// Timestamp encoding
    pub timestamp_mode: TimestampMode,
    /// Lists stored as native nested arrays instead of JSON text
    pub native_arrays: bool,
    /// Plain mutable latest views use row_number() instead of max(tuple(...))
    pub window_latest: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            version_collapsing: true,
            native_bigint: false,
            decimal_mode: DecimalMode::default(),
            timestamp_mode: TimestampMode::default(),
            native_arrays: false,
            window_latest: false,
        }
    }
}

impl Features {
    /// Plain (non-collapsing) layout with otherwise default encodings
    pub fn plain() -> Self {
        Self {
            version_collapsing: false,
            ..Self::default()
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database holding every object of this processor
    pub database: String,

    /// Processor id, the prefix of every object name
    pub processor_id: String,

    /// Encoding and layout flags
    #[serde(default)]
    pub features: Features,

    /// Extra table settings applied to every table (additively migrated)
    #[serde(default)]
    pub table_settings: BTreeMap<String, String>,

    /// Rows per insert batch
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,

    /// In/NotIn on id above this many values uses a temporary table
    #[serde(default = "default_huge_id_threshold")]
    pub huge_id_threshold: usize,

    /// Rows per insert into a temporary id table
    #[serde(default = "default_temp_table_batch_size")]
    pub temp_table_batch_size: usize,

    /// Statements slower than this are logged
    #[serde(default = "default_slow_query_ms")]
    pub slow_query_ms: u64,
}

fn default_insert_batch_size() -> usize {
    1000
}

fn default_huge_id_threshold() -> usize {
    1000
}

fn default_temp_table_batch_size() -> usize {
    10000
}

fn default_slow_query_ms() -> u64 {
    2000
}

impl StoreConfig {
    /// Create a config with default features and limits
    pub fn new(database: impl Into<String>, processor_id: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            processor_id: processor_id.into(),
            features: Features::default(),
            table_settings: BTreeMap::new(),
            insert_batch_size: default_insert_batch_size(),
            huge_id_threshold: default_huge_id_threshold(),
            temp_table_batch_size: default_temp_table_batch_size(),
            slow_query_ms: default_slow_query_ms(),
        }
    }

    /// Replace the feature flags
    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    /// Add a table setting
    pub fn with_table_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.table_settings.insert(key.into(), value.into());
        self
    }

    /// Load a config from a JSON file
    pub fn from_file(path: &Path) -> StoreResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: StoreConfig = serde_json::from_str(&content).map_err(|e| {
            StoreError::Config(format!("malformed {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> StoreResult<()> {
        if self.database.is_empty() {
            return Err(StoreError::Config("database must not be empty".into()));
        }
        if !is_plain_identifier(&self.processor_id) {
            return Err(StoreError::Config(format!(
                "processor_id '{}' must be alphanumeric or underscore",
                self.processor_id
            )));
        }
        if self.insert_batch_size == 0 || self.temp_table_batch_size == 0 {
            return Err(StoreError::Config("batch sizes must be positive".into()));
        }
        for key in self.table_settings.keys() {
            if !is_plain_identifier(key) {
                return Err(StoreError::Config(format!("invalid table setting '{}'", key)));
            }
        }
        Ok(())
    }
}
