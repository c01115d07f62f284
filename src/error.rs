//! Store error types
//!
//! Error classes:
//! - VALIDATION (REJECT): malformed filter, bad entity box, unknown type
//! - OVERFLOW (REJECT): value exceeds the encodable precision of its column
//! - INVARIANT (REJECT): write to an existing id of an immutable entity
//! - TRANSIENT (RETRY): connection or engine failure, carries SQL and timing
//! - SCHEMA (FATAL): logical schema cannot be mapped onto physical objects
//!
//! Migration drift is never raised; it is logged as a warning.

use std::fmt;

use thiserror::Error;

use crate::schema::SchemaError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Error classes used to decide how a caller reacts to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected immediately, retrying cannot help
    Validation,
    /// Value does not fit its column
    Overflow,
    /// Storage invariant would be broken by the write
    InvariantViolation,
    /// Connection or engine error, the whole operation may be retried
    Transient,
    /// Logical schema is inconsistent
    Schema,
}

impl ErrorKind {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Overflow => "OVERFLOW",
            ErrorKind::InvariantViolation => "INVARIANT",
            ErrorKind::Transient => "TRANSIENT",
            ErrorKind::Schema => "SCHEMA",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Malformed filter
    #[error("invalid filter on field '{field}': {reason}")]
    InvalidFilter { field: String, reason: String },

    /// Entity box or argument rejected before any statement ran
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Type name is not an entity, interface or aggregation
    #[error("unknown entity type '{0}'")]
    UnknownEntity(String),

    /// Value does not fit the declared precision
    #[error(
        "value of {entity}.{field} overflows its column: {digits} digits, at most {max_digits} allowed"
    )]
    Overflow {
        entity: String,
        field: String,
        digits: u32,
        max_digits: u32,
    },

    /// Value cannot be encoded into its column
    #[error("cannot encode {entity}.{field}: {reason}")]
    Encode {
        entity: String,
        field: String,
        reason: String,
    },

    /// Result row cannot be decoded back into an entity value
    #[error("cannot decode {entity}.{field}: {reason}")]
    Decode {
        entity: String,
        field: String,
        reason: String,
    },

    /// Write to an id that already exists on an immutable entity
    #[error("immutable entity {entity} already has ids [{}], sample row: {sample}", ids.join(", "))]
    ImmutableWrite {
        entity: String,
        ids: Vec<String>,
        sample: String,
    },

    /// Raw failure reported by the connection, before context is attached
    #[error("connection error: {0}")]
    Connection(String),

    /// Connection failure with statement context
    #[error("statement failed after {elapsed_ms}ms: {message} [sql: {sql}]")]
    Transient {
        sql: String,
        elapsed_ms: u64,
        message: String,
    },

    /// Logical schema cannot be mapped
    #[error("schema error: {0}")]
    Schema(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// Create an invalid filter error
    pub fn invalid_filter(field: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::InvalidFilter {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        StoreError::InvalidInput(reason.into())
    }

    /// Create a schema error
    pub fn schema(reason: impl Into<String>) -> Self {
        StoreError::Schema(reason.into())
    }

    /// Create a connection error; used by `Connection` implementations
    pub fn connection(message: impl Into<String>) -> Self {
        StoreError::Connection(message.into())
    }

    /// Returns the error class
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidFilter { .. }
            | StoreError::InvalidInput(_)
            | StoreError::UnknownEntity(_)
            | StoreError::Encode { .. }
            | StoreError::Config(_) => ErrorKind::Validation,
            StoreError::Overflow { .. } => ErrorKind::Overflow,
            StoreError::ImmutableWrite { .. } => ErrorKind::InvariantViolation,
            StoreError::Connection(_) | StoreError::Transient { .. } => ErrorKind::Transient,
            StoreError::Decode { .. } | StoreError::Schema(_) => ErrorKind::Schema,
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::InvalidFilter { .. } => "ENTITY_STORE_INVALID_FILTER",
            StoreError::InvalidInput(_) => "ENTITY_STORE_INVALID_INPUT",
            StoreError::UnknownEntity(_) => "ENTITY_STORE_UNKNOWN_ENTITY",
            StoreError::Overflow { .. } => "ENTITY_STORE_OVERFLOW",
            StoreError::Encode { .. } => "ENTITY_STORE_ENCODE_FAILED",
            StoreError::Decode { .. } => "ENTITY_STORE_DECODE_FAILED",
            StoreError::ImmutableWrite { .. } => "ENTITY_STORE_IMMUTABLE_WRITE",
            StoreError::Connection(_) | StoreError::Transient { .. } => {
                "ENTITY_STORE_STATEMENT_FAILED"
            }
            StoreError::Schema(_) => "ENTITY_STORE_SCHEMA_INVALID",
            StoreError::Config(_) => "ENTITY_STORE_CONFIG_INVALID",
        }
    }

    /// Whether retrying the whole operation may succeed
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<SchemaError> for StoreError {
    fn from(err: SchemaError) -> Self {
        StoreError::Schema(err.to_string())
    }
}
