//! entity-store - versioned entity storage over a columnar database
//!
//! Projects a logical entity schema onto physical tables and views and keeps
//! them in sync, writes versioned entity histories, answers filtered latest
//! state queries and repairs data after chain reorganizations.
//!
//! - `codec`: per-field column encodings
//! - `ddl`: expected tables and views
//! - `migrate`: schema sync against the existing objects
//! - `query`: filter compiler and latest-state reads
//! - `write`: batched, versioned inserts
//! - `reorg`: rollback and collapsed-table repair
//! - `aggregate`: interval rollups of timeseries entities
//! - `store`: the facade tying them together

pub mod aggregate;
pub mod cli;
pub mod codec;
pub mod config;
pub mod ddl;
pub mod entity;
pub mod error;
pub mod migrate;
pub mod observability;
pub mod query;
pub mod reorg;
pub mod schema;
pub mod sql;
pub mod store;
pub mod write;

pub use config::{DecimalMode, Features, StoreConfig, TimestampMode};
pub use entity::{Decimal, EntityBox, Value};
pub use error::{ErrorKind, StoreError, StoreResult};
pub use query::{Filter, FilterOp};
pub use schema::{Schema, SchemaLoader};
pub use sql::{Connection, MemoryConnection, QueryContext};
pub use store::Store;
