//! Schema hash
//!
//! Every physical object carries the hash of the logical item it was derived
//! from. The hash covers the item, the enums it references, the feature flags,
//! the table settings and the physical layout version, so a change to any of
//! them re-syncs the object. Canonical JSON has sorted keys.

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::Features;

use super::types::EnumType;

/// Bumped whenever the derived DDL changes for an unchanged schema
pub const LAYOUT_VERSION: u32 = 3;

/// Number of hex characters kept
pub const HASH_LEN: usize = 16;

#[derive(Serialize)]
struct HashInput<'a, T: Serialize> {
    layout: u32,
    kind: &'a str,
    item: &'a T,
    enums: &'a [&'a EnumType],
    features: &'a Features,
    settings: &'a BTreeMap<String, String>,
}

/// Compute the truncated hex hash of one logical item
pub fn schema_hash<T: Serialize>(
    kind: &str,
    item: &T,
    enums: &[&EnumType],
    features: &Features,
    settings: &BTreeMap<String, String>,
) -> String {
    let input = HashInput {
        layout: LAYOUT_VERSION,
        kind,
        item,
        enums,
        features,
        settings,
    };
    // Round-trip through Value so object keys are emitted in sorted order
    let canonical = serde_json::to_value(&input)
        .and_then(|value| serde_json::to_vec(&value))
        .unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    let mut hex = String::with_capacity(HASH_LEN);
    for byte in digest.iter().take(HASH_LEN / 2) {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityType, Field, TypeRef};

    fn entity() -> EntityType {
        EntityType::new(
            "Pool",
            vec![
                Field::new("id", TypeRef::required("ID")),
                Field::new("fee", TypeRef::optional("BigInt")),
            ],
        )
    }

    #[test]
    fn test_hash_is_stable_and_short() {
        let settings = BTreeMap::new();
        let a = schema_hash("entity", &entity(), &[], &Features::default(), &settings);
        let b = schema_hash("entity", &entity(), &[], &Features::default(), &settings);
        assert_eq!(a, b);
        assert_eq!(a.len(), HASH_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_changes_with_features_settings_and_item() {
        let settings = BTreeMap::new();
        let base = schema_hash("entity", &entity(), &[], &Features::default(), &settings);
        let plain = schema_hash("entity", &entity(), &[], &Features::plain(), &settings);
        assert_ne!(base, plain);

        let mut tuned = BTreeMap::new();
        tuned.insert("index_granularity".to_string(), "4096".to_string());
        assert_ne!(base, schema_hash("entity", &entity(), &[], &Features::default(), &tuned));

        let mut changed = entity();
        changed.fields.push(Field::new("tvl", TypeRef::optional("BigDecimal")));
        assert_ne!(base, schema_hash("entity", &changed, &[], &Features::default(), &settings));
        assert_ne!(base, schema_hash("view", &entity(), &[], &Features::default(), &settings));
    }

    #[test]
    fn test_hash_covers_referenced_enums() {
        let settings = BTreeMap::new();
        let e1 = EnumType {
            name: "Side".into(),
            values: vec!["BUY".into(), "SELL".into()],
        };
        let e2 = EnumType {
            name: "Side".into(),
            values: vec!["BUY".into(), "SELL".into(), "HOLD".into()],
        };
        assert_ne!(
            schema_hash("entity", &entity(), &[&e1], &Features::default(), &settings),
            schema_hash("entity", &entity(), &[&e2], &Features::default(), &settings)
        );
    }
}
