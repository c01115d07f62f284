//! Schema error types
//!
//! Error codes:
//! - SCHEMA_MALFORMED (FATAL): file unreadable or not valid JSON
//! - SCHEMA_DUPLICATE_NAME (FATAL): two types or two fields share a name
//! - SCHEMA_MISSING_ID (FATAL): entity without a usable `id` field
//! - SCHEMA_UNKNOWN_TYPE (FATAL): reference to an undeclared type
//! - SCHEMA_INVALID_DIRECTIVE (FATAL): index/derivedFrom/dbType misuse
//! - SCHEMA_INVALID_AGGREGATION (FATAL): bad source, dimension or aggregate
//! - SCHEMA_UNSUPPORTED_ENCODING (FATAL): type has no column encoding under the active features

use std::fmt;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Schema error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorCode {
    Malformed,
    DuplicateName,
    MissingId,
    UnknownType,
    InvalidDirective,
    InvalidAggregation,
    UnsupportedEncoding,
}

impl SchemaErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaErrorCode::Malformed => "SCHEMA_MALFORMED",
            SchemaErrorCode::DuplicateName => "SCHEMA_DUPLICATE_NAME",
            SchemaErrorCode::MissingId => "SCHEMA_MISSING_ID",
            SchemaErrorCode::UnknownType => "SCHEMA_UNKNOWN_TYPE",
            SchemaErrorCode::InvalidDirective => "SCHEMA_INVALID_DIRECTIVE",
            SchemaErrorCode::InvalidAggregation => "SCHEMA_INVALID_AGGREGATION",
            SchemaErrorCode::UnsupportedEncoding => "SCHEMA_UNSUPPORTED_ENCODING",
        }
    }
}

impl fmt::Display for SchemaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Schema error with the offending type name, if any
#[derive(Debug, Clone)]
pub struct SchemaError {
    code: SchemaErrorCode,
    message: String,
    type_name: Option<String>,
}

impl SchemaError {
    /// Create an error for an unreadable or malformed schema document
    pub fn malformed(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code: SchemaErrorCode::Malformed,
            message: format!("malformed schema '{}': {}", source.into(), reason.into()),
            type_name: None,
        }
    }

    /// Create a duplicate name error
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            code: SchemaErrorCode::DuplicateName,
            message: format!("name '{}' is declared more than once", name),
            type_name: Some(name),
        }
    }

    /// Create a missing id error
    pub fn missing_id(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        let entity = entity.into();
        Self {
            code: SchemaErrorCode::MissingId,
            message: format!("entity '{}': {}", entity, reason.into()),
            type_name: Some(entity),
        }
    }

    /// Create an unknown type error
    pub fn unknown_type(owner: impl Into<String>, referenced: impl Into<String>) -> Self {
        let owner = owner.into();
        Self {
            code: SchemaErrorCode::UnknownType,
            message: format!("'{}' references unknown type '{}'", owner, referenced.into()),
            type_name: Some(owner),
        }
    }

    /// Create an invalid directive error
    pub fn invalid_directive(
        owner: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let owner = owner.into();
        Self {
            code: SchemaErrorCode::InvalidDirective,
            message: format!("{}.{}: {}", owner, field.into(), reason.into()),
            type_name: Some(owner),
        }
    }

    /// Create an invalid aggregation error
    pub fn invalid_aggregation(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            code: SchemaErrorCode::InvalidAggregation,
            message: format!("aggregation '{}': {}", name, reason.into()),
            type_name: Some(name),
        }
    }

    /// Create an unsupported encoding error
    pub fn unsupported_encoding(
        owner: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let owner = owner.into();
        Self {
            code: SchemaErrorCode::UnsupportedEncoding,
            message: format!("{}.{}: {}", owner, field.into(), reason.into()),
            type_name: Some(owner),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> SchemaErrorCode {
        self.code
    }

    /// Returns the message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the offending type, if known
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl std::error::Error for SchemaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(SchemaErrorCode::MissingId.code(), "SCHEMA_MISSING_ID");
        let err = SchemaError::unknown_type("Pool", "Token");
        assert_eq!(err.code(), SchemaErrorCode::UnknownType);
        assert_eq!(err.type_name(), Some("Pool"));
    }

    #[test]
    fn test_display_includes_code() {
        let err = SchemaError::duplicate_name("Pool");
        assert!(err.to_string().starts_with("[SCHEMA_DUPLICATE_NAME]"));
    }
}
