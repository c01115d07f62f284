//! Table and view builder
//!
//! Derives the physical objects of every logical type and renders their DDL.
//!
//! - `naming`: `<processor>_<category>_<type>` object names
//! - `comment`: the `SCHEMA_HASH(...) IMPL(...) SRC(...)` comment microformat
//! - `object`: table, view and materialized view specs
//! - `layout`: which tables hold a type's rows
//! - `latest`: latest-row selection shared by views and queries
//! - `builder`: expected objects for a schema
//! - `render`: CREATE and DROP statements

pub mod builder;
pub mod comment;
pub mod latest;
pub mod layout;
pub mod naming;
pub mod object;
pub mod render;

pub use builder::{project, ApplyOrder, ExpectedObject, ObjectBuilder};
pub use comment::Comment;
pub use layout::Layout;
pub use naming::{Category, FullName, Naming};
pub use object::{
    normalize_expr, Engine, IndexSpec, MaterializedView, ObjectKind, ProjectionSpec, Table, TableOrView, View,
};
