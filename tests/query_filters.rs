//! Query Filter Tests
//!
//! Filters compiled against the latest state:
//! - Empty membership filters are constant predicates, not invalid SQL
//! - List containment uses hasAll/hasAny over the stored array
//! - Null comparisons become null tests
//! - Huge id sets go through a session temporary table that is always dropped
//! - Invalid filters are rejected before any statement runs

use chrono::{TimeZone, Utc};
use entity_store::schema::{EntityType, Field, Schema, TypeRef};
use entity_store::sql::{Row, SqlValue, StatementKind};
use entity_store::{
    EntityBox, Features, Filter, MemoryConnection, QueryContext, Store, StoreConfig, StoreError, Value,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn schema() -> Schema {
    Schema {
        entities: vec![EntityType::new(
            "Pool",
            vec![
                Field::new("id", TypeRef::required("ID")),
                Field::new("fee", TypeRef::optional("Int")),
                Field::new("name", TypeRef::optional("String")),
                Field::new("tags", TypeRef::parse("[String!]").unwrap()),
            ],
        )],
        ..Schema::default()
    }
}

fn store_with(config: StoreConfig) -> Store<MemoryConnection> {
    Store::open(MemoryConnection::new(), config, schema()).unwrap()
}

fn store() -> Store<MemoryConnection> {
    store_with(StoreConfig::new("db", "p1"))
}

fn list_sql(store: &Store<MemoryConnection>, filters: &[Filter]) -> (String, Vec<SqlValue>) {
    store
        .list_entities(&QueryContext::new(), "Pool", "eth", filters, None)
        .unwrap();
    let statement = store.connection().statements().pop().unwrap();
    (statement.sql, statement.args)
}

fn pool_row(id: &str, block: u64, fee: i32) -> Row {
    Row::from_pairs(vec![
        ("id", SqlValue::String(id.into())),
        ("__genBlockChain", SqlValue::String("eth".into())),
        ("__genBlockNumber", SqlValue::UInt64(block)),
        ("__genBlockTime", SqlValue::DateTime64(Utc.timestamp_opt(1_700_000_000, 0).unwrap())),
        ("__genBlockHash", SqlValue::String("0x01".into())),
        ("__deleted", SqlValue::Bool(false)),
        ("fee", SqlValue::Int32(fee)),
        ("name", SqlValue::Null),
        ("tags", SqlValue::Null),
    ])
}

// =============================================================================
// Membership Tests
// =============================================================================

/// An empty IN matches nothing and an empty NOT IN matches everything.
#[test]
fn test_empty_membership() {
    let store = store();
    let (sql, args) = list_sql(&store, &[Filter::is_in("fee", Vec::<i32>::new())]);
    assert!(sql.contains("AND false"), "{}", sql);
    assert_eq!(args, vec![SqlValue::String("eth".into())]);

    let (sql, _) = list_sql(&store, &[Filter::not_in("fee", Vec::<i32>::new())]);
    assert!(sql.contains("AND true"), "{}", sql);
}

/// Membership with a null element also matches null values.
#[test]
fn test_membership_with_null() {
    let store = store();
    let (sql, args) = list_sql(&store, &[Filter::is_in("fee", vec![Value::Int(1), Value::Null])]);
    assert!(sql.contains("(`fee` IN (?) OR `fee` IS NULL)"), "{}", sql);
    assert_eq!(args.last(), Some(&SqlValue::Int32(1)));
}

// =============================================================================
// List Tests
// =============================================================================

/// hasAll and hasAny test the decoded array against one array parameter.
#[test]
fn test_list_containment() {
    let store = store();
    let (sql, args) = list_sql(&store, &[Filter::has_all("tags", vec!["a", "b"])]);
    assert!(sql.contains("hasAll(JSONExtract(ifNull(`tags`, '[]')"), "{}", sql);
    assert_eq!(args.len(), 2);

    let (sql, _) = list_sql(&store, &[Filter::has_any("tags", vec!["a"])]);
    assert!(sql.contains("hasAny("), "{}", sql);
}

/// Containment on a scalar field is invalid.
#[test]
fn test_containment_on_scalar_is_invalid() {
    let store = store();
    let err = store
        .list_entities(&QueryContext::new(), "Pool", "eth", &[Filter::has_all("fee", vec![1])], None)
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidFilter { .. }));
    assert!(store.connection().statements().is_empty());
}

// =============================================================================
// Null and Ordering Tests
// =============================================================================

/// Equality with null is a null test with no parameter.
#[test]
fn test_null_equality() {
    let store = store();
    let (sql, args) = list_sql(&store, &[Filter::eq("name", Value::Null)]);
    assert!(sql.contains("`name` IS NULL"), "{}", sql);
    assert_eq!(args.len(), 1);

    let (sql, _) = list_sql(&store, &[Filter::ne("name", Value::Null)]);
    assert!(sql.contains("`name` IS NOT NULL"), "{}", sql);
}

/// Ordering against null is rejected.
#[test]
fn test_ordering_against_null_is_invalid() {
    let store = store();
    let err = store
        .count_entity(&QueryContext::new(), "Pool", "eth", &[Filter::gt("fee", Value::Null)])
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidFilter { .. }));
}

// =============================================================================
// Huge Id Set Tests
// =============================================================================

/// Id sets above the threshold are staged in a temporary table of one session.
#[test]
fn test_huge_id_set_uses_session_table() {
    let mut config = StoreConfig::new("db", "p1");
    config.huge_id_threshold = 3;
    let store = store_with(config);
    let ids: Vec<String> = (0..10).map(|i| format!("id{}", i)).collect();
    store
        .list_entities(&QueryContext::new(), "Pool", "eth", &[Filter::is_in("id", ids)], None)
        .unwrap();

    let stmts = store.connection().statements();
    assert!(stmts[0].sql.starts_with("CREATE TEMPORARY TABLE"));
    assert_eq!(stmts[1].kind, StatementKind::Insert);
    assert_eq!(stmts[1].rows.len(), 10);
    assert!(stmts.last().unwrap().sql.starts_with("DROP TEMPORARY TABLE IF EXISTS"));
    let session = stmts[0].settings.get("session_id").cloned().unwrap();
    assert!(stmts.iter().all(|s| s.settings.get("session_id") == Some(&session)));
}

/// The temporary table is dropped even when the query fails.
#[test]
fn test_session_table_dropped_on_failure() {
    let mut config = StoreConfig::new("db", "p1");
    config.huge_id_threshold = 1;
    let store = store_with(config);
    store.connection().fail_on("ORDER BY", "boom");
    let result = store.list_entities(
        &QueryContext::new(),
        "Pool",
        "eth",
        &[Filter::not_in("id", vec!["a", "b"])],
        None,
    );
    assert!(result.is_err());
    let sql = store.connection().executed_sql();
    assert!(sql.last().unwrap().starts_with("DROP TEMPORARY TABLE IF EXISTS"));
}

// =============================================================================
// Plain Layout Tests
// =============================================================================

/// Without collapsing, the latest row comes from the max tuple per id.
#[test]
fn test_plain_get_latest() {
    let store = store_with(StoreConfig::new("db", "p1").with_features(Features::plain()));
    store.connection().script("max(tuple(", vec![pool_row("x", 12, 5)]);
    let found: EntityBox = store
        .get_entity(&QueryContext::new(), "Pool", "eth", &Value::from("x"))
        .unwrap()
        .unwrap();
    assert_eq!(found.block_number, 12);
    assert_eq!(found.get("fee"), &Value::Int(5));

    let stmt = store.connection().statements().pop().unwrap();
    assert!(stmt.sql.contains("FROM `db`.`p1_entity_Pool`"));
    assert!(stmt.sql.contains("NOT `__deleted`"));
    assert!(stmt.sql.ends_with("LIMIT 1"));
}

/// A missing id is not an error.
#[test]
fn test_get_missing_id() {
    let store = store();
    let found = store
        .get_entity(&QueryContext::new(), "Pool", "eth", &Value::from("nope"))
        .unwrap();
    assert!(found.is_none());
}
