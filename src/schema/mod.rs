//! Logical schema subsystem
//!
//! The entity model the store projects onto physical tables:
//!
//! - Entities (mutable, immutable, timeseries) with typed fields
//! - Interfaces and their implementors
//! - Enums, whose declaration order is their encoding order
//! - Aggregations over timeseries entities
//!
//! Schemas are loaded from JSON and validated once; the store never mutates
//! them. The schema hash ties each physical object to the logical item it was
//! derived from.

mod errors;
mod hash;
mod loader;
mod types;

pub use errors::{SchemaError, SchemaErrorCode, SchemaResult};
pub use hash::{schema_hash, HASH_LEN, LAYOUT_VERSION};
pub use loader::SchemaLoader;
pub use types::{
    AggregateField, AggregateFunc, Aggregation, AggregationInterval, EntityType, EnumType, Field,
    IndexDirective, IndexKind, Interface, NamedKind, ScalarType, Schema, TypeRef,
};
