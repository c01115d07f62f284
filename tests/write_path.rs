//! Write Path Tests
//!
//! Versioned writes through the store:
//! - Collapsing entities write a retraction before every later version
//! - The stored state of an id is retracted by the next write
//! - Immutable entities reject a second write of an id
//! - Decimals beyond the column precision are rejected, never truncated
//! - Identical flushes carry identical deduplication tokens

use entity_store::schema::{EntityType, Field, Schema, TypeRef};
use entity_store::sql::{Row, SqlValue, SETTING_DEDUP_TOKEN};
use entity_store::{EntityBox, MemoryConnection, QueryContext, Store, StoreConfig, StoreError, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn schema() -> Schema {
    Schema {
        entities: vec![
            EntityType::new(
                "Pool",
                vec![
                    Field::new("id", TypeRef::required("ID")),
                    Field::new("fee", TypeRef::optional("Int")),
                    Field::new("tvl", TypeRef::optional("BigDecimal")),
                ],
            ),
            EntityType::new(
                "Token",
                vec![
                    Field::new("id", TypeRef::required("ID")),
                    Field::new("symbol", TypeRef::required("String")),
                ],
            )
            .immutable(),
        ],
        ..Schema::default()
    }
}

fn store() -> Store<MemoryConnection> {
    Store::open(MemoryConnection::new(), StoreConfig::new("db", "p1"), schema()).unwrap()
}

fn pool(id: &str, block: u64, fee: i32) -> EntityBox {
    EntityBox::new("Pool", id, "eth", block).with_field("fee", fee)
}

const RAW: &str = "`db`.`p1_versionedEntity_Pool`";
const SIGN: usize = 8;
const VERSION: usize = 9;

// =============================================================================
// Collapsing Tests
// =============================================================================

/// N writes of a new id produce 2N-1 rows: one insert, then pairs.
#[test]
fn test_new_id_history_rows() {
    let store = store();
    let created = store
        .set_entities(
            &QueryContext::new(),
            "Pool",
            vec![pool("x", 30, 3), pool("x", 10, 1), pool("x", 20, 2)],
        )
        .unwrap();
    assert_eq!(created, 1);

    let rows = store.connection().inserted_rows(RAW);
    assert_eq!(rows.len(), 5);
    let signs: Vec<SqlValue> = rows.iter().map(|r| r[SIGN].clone()).collect();
    assert_eq!(
        signs,
        vec![
            SqlValue::Int8(1),
            SqlValue::Int8(-1),
            SqlValue::Int8(1),
            SqlValue::Int8(-1),
            SqlValue::Int8(1)
        ]
    );
    let versions: Vec<SqlValue> = rows.iter().map(|r| r[VERSION].clone()).collect();
    assert_eq!(
        versions,
        vec![
            SqlValue::UInt64(1),
            SqlValue::UInt64(1),
            SqlValue::UInt64(2),
            SqlValue::UInt64(2),
            SqlValue::UInt64(3)
        ]
    );
    // each retraction shares the block of the write that supersedes it
    assert_eq!(rows[1][3], rows[2][3]);
    assert_eq!(rows[1][1], SqlValue::Int32(1));
    assert_eq!(store.metrics().entities_created, 1);
}

/// The stored latest state is retracted by the first new write.
#[test]
fn test_stored_state_is_retracted() {
    let store = store();
    store.connection().script(
        "HAVING sum(`__sign`) > 0",
        vec![Row::from_pairs(vec![
            ("id", SqlValue::String("x".into())),
            ("__genBlockChain", SqlValue::String("eth".into())),
            ("__version", SqlValue::UInt64(4)),
            ("__genBlockNumber", SqlValue::UInt64(5)),
            ("__deleted", SqlValue::Bool(false)),
            ("fee", SqlValue::Int32(7)),
            ("tvl", SqlValue::Null),
        ])],
    );
    let created = store
        .set_entities(&QueryContext::new(), "Pool", vec![pool("x", 40, 8)])
        .unwrap();
    assert_eq!(created, 0);

    let rows = store.connection().inserted_rows(RAW);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][1], SqlValue::Int32(7));
    assert_eq!(rows[0][SIGN], SqlValue::Int8(-1));
    assert_eq!(rows[0][VERSION], SqlValue::UInt64(4));
    assert_eq!(rows[1][1], SqlValue::Int32(8));
    assert_eq!(rows[1][VERSION], SqlValue::UInt64(5));
}

/// Deletes are written as rows with the deleted flag.
#[test]
fn test_delete_is_a_flagged_row() {
    let store = store();
    store
        .set_entities(
            &QueryContext::new(),
            "Pool",
            vec![pool("x", 10, 1), EntityBox::delete("Pool", "x", "eth", 11)],
        )
        .unwrap();
    let rows = store.connection().inserted_rows(RAW);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2][7], SqlValue::Bool(true));
    assert_eq!(rows[2][1], SqlValue::Null);
}

// =============================================================================
// Immutable Tests
// =============================================================================

/// Writing an id that already exists fails the batch and inserts nothing.
#[test]
fn test_immutable_rewrite_is_rejected() {
    let store = store();
    store.connection().script(
        "SELECT DISTINCT `id`",
        vec![Row::from_pairs(vec![("id", SqlValue::String("usdc".into()))])],
    );
    let boxes = vec![
        EntityBox::new("Token", "usdc", "eth", 9).with_field("symbol", "USDC"),
        EntityBox::new("Token", "dai", "eth", 9).with_field("symbol", "DAI"),
    ];
    let err = store.set_entities(&QueryContext::new(), "Token", boxes).unwrap_err();
    match err {
        StoreError::ImmutableWrite { entity, ids, sample } => {
            assert_eq!(entity, "Token");
            assert_eq!(ids, vec!["usdc".to_string()]);
            assert!(sample.contains("usdc"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(store.connection().inserted_rows("p1_entity_Token").is_empty());
}

/// New immutable ids are written once.
#[test]
fn test_immutable_first_write() {
    let store = store();
    let created = store
        .set_entities(
            &QueryContext::new(),
            "Token",
            vec![EntityBox::new("Token", "dai", "eth", 9).with_field("symbol", "DAI")],
        )
        .unwrap();
    assert_eq!(created, 1);
    assert_eq!(store.connection().inserted_rows("p1_entity_Token").len(), 1);
}

// =============================================================================
// Validation Tests
// =============================================================================

/// 46 integer digits fit Decimal(76, 30); 47 overflow with both counts reported.
#[test]
fn test_decimal_precision_boundary() {
    let store = store();
    let ctx = QueryContext::new();
    let widest: Value = Value::BigDecimal("9".repeat(46).parse().unwrap());
    store
        .set_entities(&ctx, "Pool", vec![EntityBox::new("Pool", "a", "eth", 1).with_field("tvl", widest)])
        .unwrap();

    let too_wide: Value = Value::BigDecimal(format!("1{}", "0".repeat(46)).parse().unwrap());
    let err = store
        .set_entities(&ctx, "Pool", vec![EntityBox::new("Pool", "b", "eth", 1).with_field("tvl", too_wide)])
        .unwrap_err();
    match err {
        StoreError::Overflow {
            entity,
            field,
            digits,
            max_digits,
        } => {
            assert_eq!(entity, "Pool");
            assert_eq!(field, "tvl");
            assert_eq!(digits, 77);
            assert_eq!(max_digits, 76);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

/// Decimal text with an absurd exponent is rejected, not expanded.
#[test]
fn test_decimal_text_exponent_is_bounded() {
    let store = store();
    let ctx = QueryContext::new();
    for text in ["1e-4000000000", "1e4000000000", "1e-3000000"] {
        let entity_box = EntityBox::new("Pool", "a", "eth", 1).with_field("tvl", Value::String(text.into()));
        let err = store.set_entities(&ctx, "Pool", vec![entity_box]).unwrap_err();
        assert!(matches!(err, StoreError::Encode { .. }), "{}: {:?}", text, err);
    }
    assert!(store.connection().inserted_rows("p1_versionedEntity_Pool").is_empty());
}

/// A box with an undeclared field is rejected before anything runs.
#[test]
fn test_unknown_field_runs_nothing() {
    let store = store();
    let bad = EntityBox::new("Pool", "x", "eth", 1).with_field("nope", 1);
    let err = store.set_entities(&QueryContext::new(), "Pool", vec![bad]).unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)));
    assert!(store.connection().statements().is_empty());
}

// =============================================================================
// Deduplication Tests
// =============================================================================

/// A retried flush repeats its token.
#[test]
fn test_retry_repeats_dedup_token() {
    let store = store();
    let ctx = QueryContext::new();
    store.set_entities(&ctx, "Pool", vec![pool("x", 10, 1)]).unwrap();
    store.set_entities(&ctx, "Pool", vec![pool("x", 10, 1)]).unwrap();
    store.set_entities(&ctx, "Pool", vec![pool("x", 10, 2)]).unwrap();

    let tokens: Vec<String> = store
        .connection()
        .statements()
        .iter()
        .filter_map(|s| s.settings.get(SETTING_DEDUP_TOKEN).cloned())
        .collect();
    assert_eq!(tokens.len(), 3);
    assert_eq!(tokens[0], tokens[1]);
    assert_ne!(tokens[0], tokens[2]);
}
