//! Schema loader
//!
//! Reads the parsed schema model from JSON and checks its structure before a
//! store is built on it. A schema that passes here can always be mapped to
//! column encodings, except for feature-dependent restrictions (native
//! arrays) which are checked when codecs are resolved.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use super::errors::{SchemaError, SchemaResult};
use super::types::{AggregateFunc, Aggregation, Field, NamedKind, ScalarType, Schema, TypeRef};

/// Loads and validates schema documents
pub struct SchemaLoader;

impl SchemaLoader {
    /// Parse and validate a schema from a JSON string
    pub fn from_str(source: &str) -> SchemaResult<Schema> {
        let schema: Schema = serde_json::from_str(source)
            .map_err(|e| SchemaError::malformed("<inline>", e.to_string()))?;
        Self::validate(&schema)?;
        Ok(schema)
    }

    /// Read, parse and validate a schema file
    pub fn from_file(path: &Path) -> SchemaResult<Schema> {
        let content = fs::read_to_string(path)
            .map_err(|e| SchemaError::malformed(path.display().to_string(), e.to_string()))?;
        let schema: Schema = serde_json::from_str(&content)
            .map_err(|e| SchemaError::malformed(path.display().to_string(), e.to_string()))?;
        Self::validate(&schema)?;
        Ok(schema)
    }

    /// Structural checks: names, ids, references, directives, aggregations
    pub fn validate(schema: &Schema) -> SchemaResult<()> {
        let mut names = HashSet::new();
        let declared = schema
            .entities
            .iter()
            .map(|e| e.name.as_str())
            .chain(schema.interfaces.iter().map(|i| i.name.as_str()))
            .chain(schema.enums.iter().map(|e| e.name.as_str()))
            .chain(schema.aggregations.iter().map(|a| a.name.as_str()));
        for name in declared {
            if !is_type_name(name) || ScalarType::from_name(name).is_some() {
                return Err(SchemaError::malformed(name, "invalid type name"));
            }
            if !names.insert(name) {
                return Err(SchemaError::duplicate_name(name));
            }
        }

        for entity in &schema.entities {
            Self::validate_fields(schema, &entity.name, &entity.fields)?;
            let id = entity
                .id_field()
                .ok_or_else(|| SchemaError::missing_id(&entity.name, "no 'id' field"))?;
            let id_ok = id.ty.is_non_null()
                && !id.ty.is_list()
                && id.derived_from.is_none()
                && matches!(
                    schema.kind_of(id.ty.base_name()),
                    Some(NamedKind::Scalar(s)) if s.is_id_capable()
                );
            if !id_ok {
                return Err(SchemaError::missing_id(
                    &entity.name,
                    format!("id must be a non-null ID, String, Bytes, Int or Int8, got {}", id.ty),
                ));
            }
            for interface in &entity.interfaces {
                if schema.interface(interface).is_none() {
                    return Err(SchemaError::unknown_type(&entity.name, interface));
                }
            }
        }

        for interface in &schema.interfaces {
            Self::validate_fields(schema, &interface.name, &interface.fields)?;
            for implementor in &interface.implementors {
                if schema.entity(implementor).is_none() {
                    return Err(SchemaError::unknown_type(&interface.name, implementor));
                }
            }
            for entity in schema.implementors(&interface.name) {
                for field in &interface.fields {
                    let matches = entity.field(&field.name).map(|f| f.ty.nullable() == field.ty.nullable());
                    if matches != Some(true) {
                        return Err(SchemaError::invalid_directive(
                            &entity.name,
                            &field.name,
                            format!("does not match interface {}", interface.name),
                        ));
                    }
                }
            }
        }

        for enum_type in &schema.enums {
            let mut values = HashSet::new();
            if enum_type.values.is_empty() {
                return Err(SchemaError::malformed(&enum_type.name, "enum has no values"));
            }
            for value in &enum_type.values {
                if value.contains('\'') || value.contains('\\') || !values.insert(value) {
                    return Err(SchemaError::malformed(
                        &enum_type.name,
                        format!("invalid or duplicate value '{}'", value),
                    ));
                }
            }
        }

        for aggregation in &schema.aggregations {
            Self::validate_aggregation(schema, aggregation)?;
        }

        Ok(())
    }

    fn validate_fields(schema: &Schema, owner: &str, fields: &[Field]) -> SchemaResult<()> {
        let mut seen = HashSet::new();
        for field in fields {
            if !is_field_name(&field.name) {
                return Err(SchemaError::invalid_directive(owner, &field.name, "invalid field name"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::duplicate_name(format!("{}.{}", owner, field.name)));
            }
            let kind = schema
                .kind_of(field.ty.base_name())
                .ok_or_else(|| SchemaError::unknown_type(owner, field.ty.base_name()))?;

            if let Some(derived) = &field.derived_from {
                if !matches!(kind, NamedKind::Entity | NamedKind::Interface) {
                    return Err(SchemaError::invalid_directive(
                        owner,
                        &field.name,
                        "derivedFrom requires an entity or interface type",
                    ));
                }
                if let Some(target) = schema.entity(field.ty.base_name()) {
                    if target.field(derived).is_none() {
                        return Err(SchemaError::invalid_directive(
                            owner,
                            &field.name,
                            format!("{} has no field '{}'", target.name, derived),
                        ));
                    }
                }
                if field.index.is_some() {
                    return Err(SchemaError::invalid_directive(
                        owner,
                        &field.name,
                        "derived fields have no column to index",
                    ));
                }
            }

            if let Some(db_type) = &field.db_type {
                if !matches!(kind, NamedKind::Scalar(_)) || field.ty.is_list() || db_type.trim().is_empty() {
                    return Err(SchemaError::invalid_directive(
                        owner,
                        &field.name,
                        "dbType applies to non-list scalar fields only",
                    ));
                }
            }
        }
        Ok(())
    }

    fn validate_aggregation(schema: &Schema, aggregation: &Aggregation) -> SchemaResult<()> {
        let name = &aggregation.name;
        let source = schema.entity(&aggregation.source).ok_or_else(|| {
            SchemaError::invalid_aggregation(name, format!("unknown source '{}'", aggregation.source))
        })?;
        if !source.timeseries {
            return Err(SchemaError::invalid_aggregation(name, "source must be a timeseries entity"));
        }
        let timestamp_ok = source
            .field("timestamp")
            .map(|f| f.ty.nullable() == &TypeRef::Named("Timestamp".into()))
            .unwrap_or(false);
        if !timestamp_ok {
            return Err(SchemaError::invalid_aggregation(
                name,
                "source needs a 'timestamp: Timestamp' field",
            ));
        }
        if aggregation.intervals.is_empty() {
            return Err(SchemaError::invalid_aggregation(name, "no intervals"));
        }
        if aggregation.aggregates.is_empty() {
            return Err(SchemaError::invalid_aggregation(name, "no aggregates"));
        }

        let mut columns: HashSet<&str> = ["id", "timestamp"].into_iter().collect();
        for dimension in &aggregation.dimensions {
            let field = source.field(dimension).ok_or_else(|| {
                SchemaError::invalid_aggregation(name, format!("unknown dimension '{}'", dimension))
            })?;
            if field.ty.is_list() || field.derived_from.is_some() {
                return Err(SchemaError::invalid_aggregation(
                    name,
                    format!("dimension '{}' must be a plain column", dimension),
                ));
            }
            if !columns.insert(dimension.as_str()) {
                return Err(SchemaError::invalid_aggregation(
                    name,
                    format!("column '{}' declared twice", dimension),
                ));
            }
        }
        for aggregate in &aggregation.aggregates {
            if !is_field_name(&aggregate.name) || !columns.insert(aggregate.name.as_str()) {
                return Err(SchemaError::invalid_aggregation(
                    name,
                    format!("invalid or duplicate column '{}'", aggregate.name),
                ));
            }
            match (&aggregate.arg, aggregate.func) {
                (None, AggregateFunc::Count) => {}
                (None, _) => {
                    return Err(SchemaError::invalid_aggregation(
                        name,
                        format!("'{}' needs an argument", aggregate.name),
                    ))
                }
                (Some(arg), _) => {
                    let field = source.field(arg).ok_or_else(|| {
                        SchemaError::invalid_aggregation(name, format!("unknown argument '{}'", arg))
                    })?;
                    if field.ty.is_list() || field.derived_from.is_some() {
                        return Err(SchemaError::invalid_aggregation(
                            name,
                            format!("argument '{}' must be a plain column", arg),
                        ));
                    }
                }
            }
            if !matches!(schema.kind_of(aggregate.ty.base_name()), Some(NamedKind::Scalar(_)))
                || aggregate.ty.is_list()
            {
                return Err(SchemaError::invalid_aggregation(
                    name,
                    format!("'{}' must have a scalar type", aggregate.name),
                ));
            }
        }
        Ok(())
    }
}

fn is_type_name(name: &str) -> bool {
    name.chars().next().map_or(false, |c| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Field names become column names; the `__` prefix is reserved for meta columns
fn is_field_name(name: &str) -> bool {
    is_type_name(name) && !name.starts_with("__") && !name.contains("__")
}
