//! Versioned entity records

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use super::value::Value;

/// One versioned record of an entity
///
/// `data == None` is a delete. Provenance names the block that produced the
/// write; the write path orders a history by `block_number`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityBox {
    /// Entity type name
    pub entity: String,
    pub id: Value,
    /// Field values keyed by field name, `id` excluded
    pub data: Option<BTreeMap<String, Value>>,
    pub block_number: u64,
    pub block_time: DateTime<Utc>,
    pub block_hash: String,
    pub chain: String,
}

impl EntityBox {
    /// An empty upsert at the given block
    pub fn new(
        entity: impl Into<String>,
        id: impl Into<Value>,
        chain: impl Into<String>,
        block_number: u64,
    ) -> Self {
        Self {
            entity: entity.into(),
            id: id.into(),
            data: Some(BTreeMap::new()),
            block_number,
            block_time: DateTime::<Utc>::default(),
            block_hash: String::new(),
            chain: chain.into(),
        }
    }

    /// A delete at the given block
    pub fn delete(
        entity: impl Into<String>,
        id: impl Into<Value>,
        chain: impl Into<String>,
        block_number: u64,
    ) -> Self {
        Self {
            data: None,
            ..Self::new(entity, id, chain, block_number)
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_block_time(mut self, time: DateTime<Utc>) -> Self {
        self.block_time = time;
        self
    }

    pub fn with_block_hash(mut self, hash: impl Into<String>) -> Self {
        self.block_hash = hash.into();
        self
    }

    pub fn is_delete(&self) -> bool {
        self.data.is_none()
    }

    /// Field value; absent fields and deletes read as `Null`
    pub fn get(&self, field: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.data
            .as_ref()
            .and_then(|data| data.get(field))
            .unwrap_or(&NULL)
    }

    /// Stable key of the id, used to group a history
    pub fn id_key(&self) -> String {
        self.id.to_string()
    }
}

impl fmt::Display for EntityBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{{id: {}, chain: {}, block: {}",
            self.entity, self.id, self.chain, self.block_number
        )?;
        match &self.data {
            None => write!(f, ", deleted")?,
            Some(data) => {
                for (name, value) in data {
                    write!(f, ", {}: {}", name, value)?;
                }
            }
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let b = EntityBox::new("Pool", "0x01", "1", 10)
            .with_field("fee", 3)
            .with_block_hash("0xabc");
        assert!(!b.is_delete());
        assert_eq!(b.get("fee"), &Value::Int(3));
        assert_eq!(b.get("missing"), &Value::Null);
        assert_eq!(b.block_hash, "0xabc");
    }

    #[test]
    fn test_delete_reads_null() {
        let b = EntityBox::delete("Pool", "0x01", "1", 11);
        assert!(b.is_delete());
        assert_eq!(b.get("fee"), &Value::Null);
        assert_eq!(b.to_string(), "Pool{id: 0x01, chain: 1, block: 11, deleted}");
    }

    #[test]
    fn test_display_sample() {
        let b = EntityBox::new("Token", "t1", "1", 5).with_field("symbol", "ETH");
        assert_eq!(b.to_string(), "Token{id: t1, chain: 1, block: 5, symbol: ETH}");
    }
}
