//! SQL execution seam
//!
//! - `Connection`: the trait any transport implements
//! - `StatementExecutor`: logging, metrics and error context around it
//! - `MemoryConnection`: recording implementation for tests and dry runs
//! - quoting helpers for identifiers and literals

mod conn;
mod executor;
mod ident;
mod memory;
mod value;

pub use conn::{
    Connection, QueryContext, SETTING_DEDUP_TOKEN, SETTING_INSERT_QUORUM, SETTING_MUTATIONS_SYNC,
    SETTING_SESSION_ID,
};
pub use executor::StatementExecutor;
pub use ident::{is_plain_identifier, quote_ident, quote_str, strip_quotes};
pub use memory::{MemoryConnection, RecordedStatement, StatementKind};
pub use value::{Row, SqlValue};
