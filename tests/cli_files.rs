//! CLI Tests
//!
//! Offline commands over configuration and schema files:
//! - ddl prints one CREATE per expected object
//! - hash prints one line per object with its schema hash
//! - check summarizes valid inputs and rejects invalid ones with a code

use std::fs;
use std::path::Path;

use entity_store::cli::{check, ddl, hash, CliErrorCode, Inputs};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const CONFIG: &str = r#"{"database": "analytics", "processor_id": "p7"}"#;

const SCHEMA: &str = r#"{
  "entities": [
    {
      "name": "Pool",
      "fields": [
        {"name": "id", "type": "ID!"},
        {"name": "fee", "type": "Int"},
        {"name": "tokens", "type": "[Token!]!"}
      ]
    },
    {
      "name": "Token",
      "immutable": true,
      "fields": [
        {"name": "id", "type": "ID!"},
        {"name": "symbol", "type": "String!"}
      ]
    }
  ]
}"#;

fn write_inputs(dir: &Path, config: &str, schema: &str) -> Inputs {
    let config_path = dir.join("entity-store.json");
    let schema_path = dir.join("schema.json");
    fs::write(&config_path, config).unwrap();
    fs::write(&schema_path, schema).unwrap();
    Inputs {
        config: config_path,
        schema: schema_path,
    }
}

fn output(out: Vec<u8>) -> String {
    String::from_utf8(out).unwrap()
}

// =============================================================================
// Command Tests
// =============================================================================

/// Every expected object is printed as a terminated CREATE statement.
#[test]
fn test_ddl_prints_creates() {
    let tmp = TempDir::new().unwrap();
    let inputs = write_inputs(tmp.path(), CONFIG, SCHEMA);
    let mut out = Vec::new();
    ddl(&inputs, &mut out).unwrap();
    let text = output(out);

    assert!(text.starts_with("CREATE TABLE IF NOT EXISTS `analytics`.`p7_"));
    assert!(text.contains("`analytics`.`p7_versionedEntity_Pool`"));
    assert!(text.contains("`analytics`.`p7_entity_Token`"));
    assert!(text.contains("CREATE MATERIALIZED VIEW IF NOT EXISTS"));
    assert!(text.contains("SCHEMA_HASH("));
    let statements = text.matches(";\n").count();
    assert!(statements >= 7, "{}", text);
}

/// One line per object: kind, name, hash.
#[test]
fn test_hash_lists_objects() {
    let tmp = TempDir::new().unwrap();
    let inputs = write_inputs(tmp.path(), CONFIG, SCHEMA);
    let mut out = Vec::new();
    hash(&inputs, &mut out).unwrap();
    let text = output(out);
    for line in text.lines() {
        let parts: Vec<&str> = line.split('\t').collect();
        assert_eq!(parts.len(), 3, "{}", line);
        assert!(parts[1].starts_with("`analytics`.`p7_"));
        assert_ne!(parts[2], "-");
    }
    assert!(text.lines().any(|l| l.starts_with("MATERIALIZED VIEW\t")));
}

/// Valid inputs produce a JSON summary.
#[test]
fn test_check_summarizes() {
    let tmp = TempDir::new().unwrap();
    let inputs = write_inputs(tmp.path(), CONFIG, SCHEMA);
    let mut out = Vec::new();
    check(&inputs, &mut out).unwrap();
    let summary: serde_json::Value = serde_json::from_str(output(out).trim()).unwrap();
    assert_eq!(summary["status"], "ok");
    assert_eq!(summary["data"]["entities"], 2);
    assert_eq!(summary["data"]["processor_id"], "p7");
}

/// Unknown field types fail as schema errors.
#[test]
fn test_check_rejects_unknown_type() {
    let tmp = TempDir::new().unwrap();
    let schema = SCHEMA.replace("[Token!]!", "[Coin!]!");
    let inputs = write_inputs(tmp.path(), CONFIG, &schema);
    let err = check(&inputs, &mut Vec::new()).unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::SchemaError);
}

/// A config with an empty processor id fails as a config error.
#[test]
fn test_check_rejects_bad_config() {
    let tmp = TempDir::new().unwrap();
    let inputs = write_inputs(tmp.path(), r#"{"database": "analytics", "processor_id": ""}"#, SCHEMA);
    let err = check(&inputs, &mut Vec::new()).unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::ConfigError);
}

/// A missing config file fails as a config error.
#[test]
fn test_missing_config_file() {
    let tmp = TempDir::new().unwrap();
    let inputs = Inputs {
        config: tmp.path().join("absent.json"),
        schema: tmp.path().join("absent-schema.json"),
    };
    let err = ddl(&inputs, &mut Vec::new()).unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::ConfigError);
}
