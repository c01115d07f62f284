//! Per-entity codec
//!
//! Resolves every field of an entity, interface or aggregation once and
//! attaches entity and field names to field-level failures.

use std::collections::BTreeMap;

use crate::config::Features;
use crate::entity::{EntityBox, Value};
use crate::error::{StoreError, StoreResult};
use crate::schema::{
    Aggregation, EntityType, Field, Interface, NamedKind, ScalarType, Schema, SchemaError,
    SchemaResult, TypeRef,
};
use crate::sql::{Row, SqlValue};

use super::bigint::BigIntCodec;
use super::column::Single;
use super::decimal::DecimalCodec;
use super::enums::EnumCodec;
use super::field::{ElementCodec, FieldCodec};
use super::list::ListCodec;
use super::meta::{self, Provenance};
use super::reference::{ForeignKeyCodec, ReverseForeignKeyCodec};
use super::scalar::ScalarCodec;
use super::{CodecError, ColumnSpec, ViewColumn};

/// Resolved codecs of one logical type
#[derive(Debug, Clone, PartialEq)]
pub struct EntityCodec {
    entity: String,
    id: FieldCodec,
    /// Non-id fields in declaration order
    fields: Vec<FieldCodec>,
}

impl EntityCodec {
    pub fn for_entity(schema: &Schema, entity: &EntityType, features: &Features) -> SchemaResult<Self> {
        Self::resolve(schema, &entity.name, &entity.fields, features)
    }

    pub fn for_interface(schema: &Schema, interface: &Interface, features: &Features) -> SchemaResult<Self> {
        Self::resolve(schema, &interface.name, &interface.fields, features)
    }

    /// Aggregation rows: a string id, the bucket timestamp, the dimensions
    /// as declared on the source and one column per aggregate
    pub fn for_aggregation(
        schema: &Schema,
        aggregation: &Aggregation,
        features: &Features,
    ) -> SchemaResult<Self> {
        let source = schema.entity(&aggregation.source).ok_or_else(|| {
            SchemaError::invalid_aggregation(&aggregation.name, format!("unknown source {}", aggregation.source))
        })?;
        Self::resolve(schema, &aggregation.name, &aggregation_fields(source, aggregation)?, features)
    }

    fn resolve(schema: &Schema, owner: &str, fields: &[Field], features: &Features) -> SchemaResult<Self> {
        let mut id = None;
        let mut resolved = Vec::with_capacity(fields.len());
        for field in fields {
            let codec = resolve_field(schema, owner, field, features)?;
            if field.name == meta::ID {
                id = Some(codec);
            } else {
                resolved.push(codec);
            }
        }
        let id = id.ok_or_else(|| SchemaError::missing_id(owner, "no id field"))?;
        Ok(Self {
            entity: owner.to_string(),
            id,
            fields: resolved,
        })
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn id(&self) -> &FieldCodec {
        &self.id
    }

    pub fn fields(&self) -> &[FieldCodec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldCodec> {
        if name == meta::ID {
            return Some(&self.id);
        }
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Fields with a column, id first
    pub fn stored_fields(&self) -> impl Iterator<Item = &FieldCodec> {
        std::iter::once(&self.id).chain(self.fields.iter().filter(|f| !f.is_virtual()))
    }

    /// Physical data columns, id first, meta columns excluded
    pub fn data_columns(&self) -> Vec<ColumnSpec> {
        self.stored_fields().flat_map(FieldCodec::columns).collect()
    }

    pub fn data_column_names(&self) -> Vec<String> {
        self.data_columns().into_iter().map(|c| c.name).collect()
    }

    /// View projections of the data columns
    pub fn view_columns(&self) -> Vec<ViewColumn> {
        self.stored_fields().flat_map(FieldCodec::view_columns).collect()
    }

    /// Reject boxes that do not belong to this entity or miss required fields
    pub fn validate(&self, entity_box: &EntityBox) -> StoreResult<()> {
        if entity_box.entity != self.entity {
            return Err(StoreError::invalid_input(format!(
                "box of {} written to {}",
                entity_box.entity, self.entity
            )));
        }
        if entity_box.id.is_null() {
            return Err(StoreError::invalid_input(format!("{} without an id", entity_box)));
        }
        if entity_box.chain.is_empty() {
            return Err(StoreError::invalid_input(format!("{} without a chain", entity_box)));
        }
        let data = match &entity_box.data {
            Some(data) => data,
            None => return Ok(()),
        };
        for name in data.keys() {
            match self.field(name) {
                None => {
                    return Err(StoreError::invalid_input(format!(
                        "{} has no field '{}'",
                        self.entity, name
                    )))
                }
                Some(field) if field.is_virtual() => {
                    return Err(StoreError::invalid_input(format!(
                        "{}.{} is derived and cannot be written",
                        self.entity, name
                    )))
                }
                Some(_) => {}
            }
        }
        for field in &self.fields {
            if field.is_non_null() && !field.is_virtual() && data.get(field.name()).map_or(true, Value::is_null) {
                return Err(StoreError::invalid_input(format!(
                    "{} is missing non-null field '{}'",
                    entity_box,
                    field.name()
                )));
            }
        }
        Ok(())
    }

    /// Parameters for the data columns; `None` data writes placeholders
    pub fn encode_data(&self, id: &Value, data: Option<&BTreeMap<String, Value>>) -> StoreResult<Vec<SqlValue>> {
        let null = Value::Null;
        let mut out = Vec::new();
        self.id
            .encode(id, &mut out)
            .map_err(|e| self.encode_error(meta::ID, e))?;
        for field in self.fields.iter().filter(|f| !f.is_virtual()) {
            match data {
                Some(data) => {
                    let value = data.get(field.name()).unwrap_or(&null);
                    field
                        .encode(value, &mut out)
                        .map_err(|e| self.encode_error(field.name(), e))?;
                }
                None => field.encode_empty(&mut out),
            }
        }
        Ok(out)
    }

    /// Encode one id as the id column parameter
    pub fn encode_id(&self, id: &Value) -> StoreResult<SqlValue> {
        self.id
            .filter_param(id)
            .map_err(|e| self.encode_error(meta::ID, e))
    }

    /// The id as it reads back after storage, e.g. lowercase Bytes
    pub fn canonical_id(&self, id: &Value) -> StoreResult<Value> {
        let row = Row::from_pairs(vec![(meta::ID, self.encode_id(id)?)]);
        Ok(self
            .id
            .decode(&row)
            .map_err(|e| self.decode_error(meta::ID, e))?
            .unwrap_or(Value::Null))
    }

    /// Read id and field values back from a row
    pub fn decode_data(&self, row: &Row) -> StoreResult<(Value, BTreeMap<String, Value>)> {
        let id = self
            .id
            .decode(row)
            .map_err(|e| self.decode_error(meta::ID, e))?
            .unwrap_or(Value::Null);
        let mut data = BTreeMap::new();
        for field in &self.fields {
            if let Some(value) = field.decode(row).map_err(|e| self.decode_error(field.name(), e))? {
                data.insert(field.name().to_string(), value);
            }
        }
        Ok((id, data))
    }

    /// Rebuild an entity box from a row holding data and provenance columns
    pub fn decode_box(&self, row: &Row) -> StoreResult<EntityBox> {
        let provenance = Provenance::from_row(row).map_err(|e| match e {
            StoreError::Decode { field, reason, .. } => StoreError::Decode {
                entity: self.entity.clone(),
                field,
                reason,
            },
            other => other,
        })?;
        let (id, data) = self.decode_data(row)?;
        let entity = row
            .get(meta::TYPENAME)
            .and_then(SqlValue::as_str)
            .unwrap_or(&self.entity)
            .to_string();
        Ok(EntityBox {
            entity,
            id,
            data: if provenance.deleted { None } else { Some(data) },
            block_number: provenance.block_number,
            block_time: provenance.block_time,
            block_hash: provenance.block_hash,
            chain: provenance.chain,
        })
    }

    fn encode_error(&self, field: &str, error: CodecError) -> StoreError {
        match error {
            CodecError::Overflow { digits, max_digits } => StoreError::Overflow {
                entity: self.entity.clone(),
                field: field.to_string(),
                digits,
                max_digits,
            },
            other => StoreError::Encode {
                entity: self.entity.clone(),
                field: field.to_string(),
                reason: other.to_string(),
            },
        }
    }

    fn decode_error(&self, field: &str, error: CodecError) -> StoreError {
        StoreError::Decode {
            entity: self.entity.clone(),
            field: field.to_string(),
            reason: error.to_string(),
        }
    }
}

/// Logical fields of an aggregation table
pub(crate) fn aggregation_fields(source: &EntityType, aggregation: &Aggregation) -> SchemaResult<Vec<Field>> {
    let mut fields = vec![
        Field::new(meta::ID, TypeRef::required("ID")),
        Field::new("timestamp", TypeRef::required("Timestamp")),
    ];
    for dimension in &aggregation.dimensions {
        let field = source.field(dimension).ok_or_else(|| {
            SchemaError::invalid_aggregation(&aggregation.name, format!("unknown dimension {}", dimension))
        })?;
        fields.push(Field::new(&field.name, field.ty.clone()));
    }
    for aggregate in &aggregation.aggregates {
        fields.push(Field::new(&aggregate.name, aggregate.ty.clone()));
    }
    Ok(fields)
}

fn resolve_field(schema: &Schema, owner: &str, field: &Field, features: &Features) -> SchemaResult<FieldCodec> {
    let non_null = field.ty.is_non_null();
    let depth = field.ty.list_depth();
    let base = field.ty.base_name();
    let kind = schema
        .kind_of(base)
        .ok_or_else(|| SchemaError::unknown_type(owner, base))?;

    if let Some(back) = &field.derived_from {
        return Ok(FieldCodec::ReverseForeignKey(ReverseForeignKeyCodec {
            name: field.name.clone(),
            target: base.to_string(),
            field: back.clone(),
        }));
    }

    let element = match kind {
        NamedKind::Scalar(ScalarType::BigInt) => ElementCodec::BigInt(BigIntCodec::new(features.native_bigint)),
        NamedKind::Scalar(ScalarType::BigDecimal) => ElementCodec::Decimal(DecimalCodec::new(features.decimal_mode)),
        NamedKind::Scalar(scalar) => ElementCodec::Scalar(ScalarCodec::new(scalar, features.timestamp_mode)),
        NamedKind::Enum => {
            let values = schema
                .enum_type(base)
                .map(|e| e.values.clone())
                .ok_or_else(|| SchemaError::unknown_type(owner, base))?;
            ElementCodec::Enum(EnumCodec::new(base, values))
        }
        NamedKind::Entity | NamedKind::Interface => return resolve_reference(schema, owner, field),
    };

    if depth > 0 {
        let nullable_elements = field.ty.has_nullable_elements();
        if features.native_arrays && nullable_elements {
            return Err(SchemaError::unsupported_encoding(
                owner,
                &field.name,
                "native arrays cannot hold null elements; declare the elements non-null",
            ));
        }
        return Ok(FieldCodec::List(ListCodec::new(
            &field.name,
            non_null,
            depth,
            nullable_elements,
            element,
            features.native_arrays,
        )));
    }

    let db_type = field.db_type.clone();
    Ok(match element {
        ElementCodec::Scalar(c) => FieldCodec::Scalar(Single::new(&field.name, non_null, c).with_db_type(db_type)),
        ElementCodec::BigInt(c) => FieldCodec::BigInt(Single::new(&field.name, non_null, c).with_db_type(db_type)),
        ElementCodec::Decimal(c) => {
            FieldCodec::BigDecimal(Single::new(&field.name, non_null, c).with_db_type(db_type))
        }
        ElementCodec::Enum(c) => FieldCodec::Enum(Single::new(&field.name, non_null, c).with_db_type(db_type)),
    })
}

/// Single or repeated reference to an entity or interface
fn resolve_reference(schema: &Schema, owner: &str, field: &Field) -> SchemaResult<FieldCodec> {
    let non_null = field.ty.is_non_null();
    let base = field.ty.base_name();
    let id = reference_id(schema, owner, field, base)?;
    match field.ty.list_depth() {
        0 => Ok(FieldCodec::ForeignKey(ForeignKeyCodec::One {
            target: base.to_string(),
            column: Single::new(&field.name, non_null, id),
        })),
        1 if !field.ty.has_nullable_elements() => Ok(FieldCodec::ForeignKey(ForeignKeyCodec::Many {
            target: base.to_string(),
            list: ListCodec::new(&field.name, non_null, 1, false, ElementCodec::Scalar(id), true),
        })),
        1 => Err(SchemaError::unsupported_encoding(
            owner,
            &field.name,
            "reference lists cannot hold null elements",
        )),
        _ => Err(SchemaError::unsupported_encoding(
            owner,
            &field.name,
            "nested reference lists are not supported",
        )),
    }
}

/// Id codec of a referenced entity or interface
fn reference_id(schema: &Schema, owner: &str, field: &Field, target: &str) -> SchemaResult<ScalarCodec> {
    let id_type = |fields: &[Field]| {
        fields
            .iter()
            .find(|f| f.name == meta::ID)
            .and_then(|f| ScalarType::from_name(f.ty.base_name()))
    };
    let scalar = if let Some(entity) = schema.entity(target) {
        id_type(&entity.fields)
    } else {
        schema
            .interface(target)
            .and_then(|i| id_type(&i.fields))
            .or_else(|| {
                schema
                    .implementors(target)
                    .first()
                    .and_then(|e| id_type(&e.fields))
            })
            .or(Some(ScalarType::Id))
    };
    let scalar = scalar.ok_or_else(|| {
        SchemaError::unsupported_encoding(owner, &field.name, format!("{} has no usable id", target))
    })?;
    Ok(ScalarCodec::new(scalar, crate::config::TimestampMode::DateTime64))
}
