//! Reorg Repair Tests
//!
//! Rollback of a chain to a block:
//! - Rows above the block are deleted from every primary table, synchronously
//! - Only the reorganized chain is touched
//! - A collapsed table that disagrees with its raw table is rebuilt from it
//! - Failures surface and stop the reorg

use entity_store::schema::{EntityType, Field, Schema, TypeRef};
use entity_store::sql::{SqlValue, SETTING_MUTATIONS_SYNC};
use entity_store::{Features, MemoryConnection, QueryContext, Store, StoreConfig, StoreError};

// =============================================================================
// Helper Functions
// =============================================================================

fn schema() -> Schema {
    let fields = || {
        vec![
            Field::new("id", TypeRef::required("ID")),
            Field::new("fee", TypeRef::optional("Int")),
        ]
    };
    Schema {
        entities: vec![
            EntityType::new("Pool", fields()),
            EntityType::new("Swap", fields()).immutable(),
        ],
        ..Schema::default()
    }
}

fn store(features: Features) -> Store<MemoryConnection> {
    Store::open(
        MemoryConnection::new(),
        StoreConfig::new("db", "p1").with_features(features),
        schema(),
    )
    .unwrap()
}

// =============================================================================
// Rollback Tests
// =============================================================================

/// Plain tables only need the synchronous delete.
#[test]
fn test_plain_reorg_deletes_above_block() {
    let store = store(Features::plain());
    let report = store.reorg(&QueryContext::new(), 100, "base").unwrap();
    assert_eq!(report.tables, 2);
    assert!(report.rebuilt.is_empty());

    let stmts = store.connection().statements();
    assert_eq!(stmts.len(), 2);
    for stmt in &stmts {
        assert!(stmt.sql.starts_with("ALTER TABLE `db`.`p1_entity_"));
        assert!(stmt.sql.ends_with("DELETE WHERE `__genBlockChain` = ? AND `__genBlockNumber` > ?"));
        assert_eq!(stmt.args, vec![SqlValue::String("base".into()), SqlValue::UInt64(100)]);
        assert_eq!(stmt.settings.get(SETTING_MUTATIONS_SYNC).map(String::as_str), Some("2"));
    }
}

/// Matching id counts leave the collapsed table alone.
#[test]
fn test_consistent_collapsed_table_is_kept() {
    let store = store(Features::default());
    store.connection().script_count("count(DISTINCT `id`) AS count FROM `db`.`p1_versionedEntity_Pool`", 8);
    store.connection().script_count("HAVING sum(`__sign`) > 0", 8);
    let report = store.reorg(&QueryContext::new(), 100, "eth").unwrap();
    assert_eq!(report.tables, 3);
    assert!(report.rebuilt.is_empty());
    assert!(!store
        .connection()
        .executed_sql()
        .iter()
        .any(|sql| sql.contains("DROP PARTITION")));
    assert_eq!(store.metrics().partition_rebuilds, 0);
}

/// A mismatch drops the chain partition and copies it from the raw table.
#[test]
fn test_mismatch_rebuilds_partition() {
    let store = store(Features::default());
    store.connection().script_count("count(DISTINCT `id`) AS count FROM `db`.`p1_versionedEntity_Pool`", 8);
    store.connection().script_count("HAVING sum(`__sign`) > 0", 7);
    let report = store.reorg(&QueryContext::new(), 100, "eth").unwrap();
    assert_eq!(report.rebuilt, vec!["Pool".to_string()]);

    let sql = store.connection().executed_sql();
    let drop = sql
        .iter()
        .position(|s| s == "ALTER TABLE `db`.`p1_versionedLatestEntity_Pool` DROP PARTITION 'eth'")
        .unwrap();
    let copy = &sql[drop + 1];
    assert!(copy.starts_with("INSERT INTO `db`.`p1_versionedLatestEntity_Pool` (`id`, `fee`, `__genBlockNumber`"));
    assert!(copy.contains("`__sign`, `__version`) SELECT `id`, `fee`"));
    assert!(copy.ends_with("FROM `db`.`p1_versionedEntity_Pool` WHERE `__genBlockChain` = ?"));
    assert_eq!(store.metrics().partition_rebuilds, 1);
    assert_eq!(store.metrics().reorgs, 1);
}

/// Running the same reorg again repeats the deletes and finds nothing to rebuild.
#[test]
fn test_repeated_reorg_is_a_no_op() {
    let store = store(Features::default());
    let conn = store.connection();
    conn.script_count("count(DISTINCT `id`) AS count FROM `db`.`p1_versionedEntity_Pool`", 8);
    conn.script_count("HAVING sum(`__sign`) > 0", 7);
    conn.script_count("count(DISTINCT `id`) AS count FROM `db`.`p1_versionedEntity_Pool`", 8);
    conn.script_count("HAVING sum(`__sign`) > 0", 8);

    let first = store.reorg(&QueryContext::new(), 100, "eth").unwrap();
    let first_deletes: Vec<_> = conn
        .statements()
        .into_iter()
        .filter(|s| s.sql.contains("DELETE WHERE"))
        .map(|s| (s.sql, s.args))
        .collect();
    conn.clear();

    let second = store.reorg(&QueryContext::new(), 100, "eth").unwrap();
    let second_deletes: Vec<_> = conn
        .statements()
        .into_iter()
        .filter(|s| s.sql.contains("DELETE WHERE"))
        .map(|s| (s.sql, s.args))
        .collect();

    assert_eq!(first.rebuilt, vec!["Pool".to_string()]);
    assert!(second.rebuilt.is_empty());
    assert_eq!(first.tables, second.tables);
    assert_eq!(first_deletes.len(), 3);
    assert_eq!(first_deletes, second_deletes);
    assert!(!conn.executed_sql().iter().any(|sql| sql.contains("DROP PARTITION")));
    assert_eq!(store.metrics().partition_rebuilds, 1);
    assert_eq!(store.metrics().reorgs, 2);
}

/// A failing delete is reported as transient and stops the reorg.
#[test]
fn test_failed_delete_is_transient() {
    let store = store(Features::plain());
    store.connection().fail_on("DELETE WHERE", "replica unavailable");
    let err = store.reorg(&QueryContext::new(), 100, "eth").unwrap_err();
    assert!(matches!(err, StoreError::Transient { .. }));
    assert!(err.is_retryable());
    assert_eq!(store.connection().statements().len(), 1);
}
