//! Logical schema model
//!
//! The already-parsed entity model: entities, interfaces, enums and
//! aggregations. Field types use the familiar notation `Name`, `[T]` and
//! `T!`, e.g. `[[BigInt!]]!`.
//!
//! Built-in scalars:
//! - ID, String, Bytes, Boolean
//! - Int (32-bit), Int8 (64-bit), Float
//! - BigInt, BigDecimal (arbitrary precision)
//! - Timestamp (microsecond resolution)

use std::fmt;

use serde::{Deserialize, Serialize};

/// Built-in scalar types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Id,
    String,
    Bytes,
    Boolean,
    Int,
    Int8,
    Float,
    BigInt,
    BigDecimal,
    Timestamp,
}

impl ScalarType {
    /// Resolve a scalar by its schema name
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "ID" => ScalarType::Id,
            "String" => ScalarType::String,
            "Bytes" => ScalarType::Bytes,
            "Boolean" => ScalarType::Boolean,
            "Int" => ScalarType::Int,
            "Int8" => ScalarType::Int8,
            "Float" => ScalarType::Float,
            "BigInt" => ScalarType::BigInt,
            "BigDecimal" => ScalarType::BigDecimal,
            "Timestamp" => ScalarType::Timestamp,
            _ => return None,
        })
    }

    /// Returns the schema name
    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::Id => "ID",
            ScalarType::String => "String",
            ScalarType::Bytes => "Bytes",
            ScalarType::Boolean => "Boolean",
            ScalarType::Int => "Int",
            ScalarType::Int8 => "Int8",
            ScalarType::Float => "Float",
            ScalarType::BigInt => "BigInt",
            ScalarType::BigDecimal => "BigDecimal",
            ScalarType::Timestamp => "Timestamp",
        }
    }

    /// Scalars usable with Like/NotLike
    pub fn is_string_like(&self) -> bool {
        matches!(self, ScalarType::Id | ScalarType::String | ScalarType::Bytes)
    }

    /// Scalars allowed as an entity id
    pub fn is_id_capable(&self) -> bool {
        matches!(
            self,
            ScalarType::Id | ScalarType::String | ScalarType::Bytes | ScalarType::Int | ScalarType::Int8
        )
    }
}

/// Field type: a named type wrapped in list and non-null modifiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    /// Parse `[[Name!]]!`-style notation
    pub fn parse(input: &str) -> Result<Self, String> {
        let s = input.trim();
        if s.is_empty() {
            return Err("empty type".into());
        }
        if let Some(inner) = s.strip_suffix('!') {
            let inner = TypeRef::parse(inner)?;
            if matches!(inner, TypeRef::NonNull(_)) {
                return Err(format!("'{}' is non-null twice", input));
            }
            return Ok(TypeRef::NonNull(Box::new(inner)));
        }
        if let Some(rest) = s.strip_prefix('[') {
            let inner = rest
                .strip_suffix(']')
                .ok_or_else(|| format!("unbalanced brackets in '{}'", input))?;
            return Ok(TypeRef::List(Box::new(TypeRef::parse(inner)?)));
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid type name '{}'", s));
        }
        Ok(TypeRef::Named(s.to_string()))
    }

    /// Named non-null shorthand
    pub fn required(name: &str) -> Self {
        TypeRef::NonNull(Box::new(TypeRef::Named(name.to_string())))
    }

    /// Named nullable shorthand
    pub fn optional(name: &str) -> Self {
        TypeRef::Named(name.to_string())
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }

    /// The type without its outer non-null marker
    pub fn nullable(&self) -> &TypeRef {
        match self {
            TypeRef::NonNull(inner) => inner,
            other => other,
        }
    }

    /// Number of list levels
    pub fn list_depth(&self) -> usize {
        match self {
            TypeRef::Named(_) => 0,
            TypeRef::List(inner) => 1 + inner.list_depth(),
            TypeRef::NonNull(inner) => inner.list_depth(),
        }
    }

    pub fn is_list(&self) -> bool {
        self.list_depth() > 0
    }

    /// The innermost named type
    pub fn base_name(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.base_name(),
        }
    }

    /// For list types: the element type one level down
    pub fn element(&self) -> Option<&TypeRef> {
        match self.nullable() {
            TypeRef::List(inner) => Some(inner),
            _ => None,
        }
    }

    /// Whether any list level below the outermost admits null elements
    pub fn has_nullable_elements(&self) -> bool {
        match self.element() {
            Some(element) => !element.is_non_null() || element.has_nullable_elements(),
            None => false,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => write!(f, "{}", name),
            TypeRef::List(inner) => write!(f, "[{}]", inner),
            TypeRef::NonNull(inner) => write!(f, "{}!", inner),
        }
    }
}

impl TryFrom<String> for TypeRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TypeRef::parse(&value)
    }
}

impl From<TypeRef> for String {
    fn from(value: TypeRef) -> Self {
        value.to_string()
    }
}

/// Kind of data-skipping structure requested by `@index`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    BloomFilter,
    Minmax,
    Set,
    Projection,
}

/// `@index(type: ..., granularity: ..., maxRows: ...)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexDirective {
    #[serde(rename = "type")]
    pub kind: IndexKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity: Option<u32>,
    /// `set(N)` parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<u32>,
}

/// A field of an entity or interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexDirective>,
    /// Reverse reference: the field on the referenced entity pointing back here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<String>,
    /// Column type override for scalars
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_type: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            index: None,
            derived_from: None,
            db_type: None,
        }
    }

    pub fn with_index(mut self, kind: IndexKind) -> Self {
        self.index = Some(IndexDirective {
            kind,
            granularity: None,
            max_rows: None,
        });
        self
    }

    pub fn derived_from(mut self, field: impl Into<String>) -> Self {
        self.derived_from = Some(field.into());
        self
    }

    pub fn with_db_type(mut self, db_type: impl Into<String>) -> Self {
        self.db_type = Some(db_type.into());
        self
    }
}

/// An entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    pub fields: Vec<Field>,
    /// Written once per id, never updated
    #[serde(default)]
    pub immutable: bool,
    /// Append-only series; stored like immutable entities
    #[serde(default)]
    pub timeseries: bool,
    /// Excluded from the external response cache
    #[serde(default)]
    pub cache_exempt: bool,
    /// Interfaces declared on the entity
    #[serde(default)]
    pub interfaces: Vec<String>,
}

impl EntityType {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
            immutable: false,
            timeseries: false,
            cache_exempt: false,
            interfaces: Vec::new(),
        }
    }

    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    pub fn timeseries(mut self) -> Self {
        self.timeseries = true;
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Entities whose rows may be superseded by later writes
    pub fn is_mutable(&self) -> bool {
        !self.immutable && !self.timeseries
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn id_field(&self) -> Option<&Field> {
        self.field("id")
    }
}

/// An interface and its implementors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    pub fields: Vec<Field>,
    /// Implementors listed on the interface side, unioned with entity declarations
    #[serde(default)]
    pub implementors: Vec<String>,
}

impl Interface {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// An enum; declaration order is the encoding order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumType {
    pub name: String,
    pub values: Vec<String>,
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunc {
    Sum,
    Count,
    Min,
    Max,
    First,
    Last,
    Avg,
}

impl AggregateFunc {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunc::Sum => "sum",
            AggregateFunc::Count => "count",
            AggregateFunc::Min => "min",
            AggregateFunc::Max => "max",
            AggregateFunc::First => "first",
            AggregateFunc::Last => "last",
            AggregateFunc::Avg => "avg",
        }
    }
}

/// Rollup interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationInterval {
    Hour,
    Day,
}

impl AggregationInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationInterval::Hour => "hour",
            AggregationInterval::Day => "day",
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            AggregationInterval::Hour => 3600,
            AggregationInterval::Day => 86400,
        }
    }
}

/// One aggregate column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    pub func: AggregateFunc,
    /// Source field the function applies to; `count` may omit it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<String>,
}

/// Time-bucketed rollup over a timeseries entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    pub name: String,
    pub source: String,
    /// Source fields grouped by
    #[serde(default)]
    pub dimensions: Vec<String>,
    pub aggregates: Vec<AggregateField>,
    pub intervals: Vec<AggregationInterval>,
}

/// What a named type resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedKind {
    Scalar(ScalarType),
    Enum,
    Entity,
    Interface,
}

/// The whole logical schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub entities: Vec<EntityType>,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    #[serde(default)]
    pub enums: Vec<EnumType>,
    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
}

impl Schema {
    pub fn entity(&self, name: &str) -> Option<&EntityType> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub fn enum_type(&self, name: &str) -> Option<&EnumType> {
        self.enums.iter().find(|e| e.name == name)
    }

    pub fn aggregation(&self, name: &str) -> Option<&Aggregation> {
        self.aggregations.iter().find(|a| a.name == name)
    }

    /// Resolve a named type
    pub fn kind_of(&self, name: &str) -> Option<NamedKind> {
        if let Some(scalar) = ScalarType::from_name(name) {
            return Some(NamedKind::Scalar(scalar));
        }
        if self.enum_type(name).is_some() {
            return Some(NamedKind::Enum);
        }
        if self.entity(name).is_some() {
            return Some(NamedKind::Entity);
        }
        if self.interface(name).is_some() {
            return Some(NamedKind::Interface);
        }
        None
    }

    /// Entities implementing an interface, in declaration order
    pub fn implementors(&self, interface: &str) -> Vec<&EntityType> {
        let listed = self
            .interface(interface)
            .map(|i| i.implementors.as_slice())
            .unwrap_or(&[]);
        self.entities
            .iter()
            .filter(|e| e.interfaces.iter().any(|i| i == interface) || listed.contains(&e.name))
            .collect()
    }

    /// Sorted interface names an entity implements
    pub fn interfaces_of(&self, entity: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .interfaces
            .iter()
            .filter(|i| self.implementors(&i.name).iter().any(|e| e.name == entity))
            .map(|i| i.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Enums referenced by a field list, sorted by name
    pub fn enums_used_by<'a>(&'a self, fields: &[Field]) -> Vec<&'a EnumType> {
        let mut used: Vec<&EnumType> = self
            .enums
            .iter()
            .filter(|e| fields.iter().any(|f| f.ty.base_name() == e.name))
            .collect();
        used.sort_by(|a, b| a.name.cmp(&b.name));
        used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_type_notation() {
        let ty = TypeRef::parse("[[BigInt!]]!").unwrap();
        assert!(ty.is_non_null());
        assert_eq!(ty.list_depth(), 2);
        assert_eq!(ty.base_name(), "BigInt");
        assert_eq!(ty.to_string(), "[[BigInt!]]!");
        assert!(ty.has_nullable_elements());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TypeRef::parse("[String").is_err());
        assert!(TypeRef::parse("String!!").is_err());
        assert!(TypeRef::parse("").is_err());
        assert!(TypeRef::parse("Str ing").is_err());
    }

    #[test]
    fn test_non_null_elements() {
        let ty = TypeRef::parse("[String!]").unwrap();
        assert!(!ty.has_nullable_elements());
        let ty = TypeRef::parse("[String]!").unwrap();
        assert!(ty.has_nullable_elements());
    }

    #[test]
    fn test_field_json_shape() {
        let field: Field = serde_json::from_str(
            r#"{"name":"owner","type":"Bytes!","index":{"type":"bloom_filter","granularity":4}}"#,
        )
        .unwrap();
        assert_eq!(field.ty, TypeRef::required("Bytes"));
        assert_eq!(field.index.unwrap().kind, IndexKind::BloomFilter);
    }

    #[test]
    fn test_mutability() {
        let e = EntityType::new("A", vec![]);
        assert!(e.is_mutable());
        assert!(!e.clone().immutable().is_mutable());
        assert!(!e.timeseries().is_mutable());
    }

    #[test]
    fn test_implementors_union() {
        let schema = Schema {
            entities: vec![
                EntityType::new("A", vec![]).implements("Node"),
                EntityType::new("B", vec![]),
                EntityType::new("C", vec![]),
            ],
            interfaces: vec![Interface {
                name: "Node".into(),
                fields: vec![],
                implementors: vec!["B".into()],
            }],
            ..Default::default()
        };
        let names: Vec<&str> = schema.implementors("Node").iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(schema.interfaces_of("B"), vec!["Node".to_string()]);
        assert!(schema.interfaces_of("C").is_empty());
    }
}
