//! Latest-row selection
//!
//! Three ways to reduce a history to one row per (id, chain):
//! - collapsed: group the collapsing copy by id, chain and version and keep
//!   groups whose signs sum above zero
//! - tuple max: pack (block number, deleted, fields...) into one tuple and
//!   keep the greatest per key; tuples compare element by element, so the
//!   highest block number wins
//! - window: `row_number()` over the key ordered by block number descending,
//!   for engines without tuple ordering
//!
//! Rows keep their physical column names, so the same filters and decoders
//! apply before and after the reduction. Latest views and point/list queries
//! share these builders.

use crate::codec::meta;
use crate::sql::quote_ident;

use super::naming::FullName;

const PACKED: &str = "__latest";
const ROW_NUMBER: &str = "__rn";

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

fn quoted(columns: &[String]) -> Vec<String> {
    columns.iter().map(|c| quote_ident(c)).collect()
}

fn key() -> String {
    format!("{}, {}", quote_ident(meta::ID), quote_ident(meta::CHAIN))
}

/// Collapsed rows; `columns` excludes the key and the version
pub fn collapsed_rows(table: &FullName, columns: &[String], conditions: &[String]) -> String {
    let aggregated: Vec<String> = columns
        .iter()
        .map(|c| format!("any_respect_nulls({q}) AS {q}", q = quote_ident(c)))
        .collect();
    format!(
        "SELECT {key}, {version}, {cols} FROM {table}{filter} GROUP BY {key}, {version} HAVING sum({sign}) > 0",
        key = key(),
        version = quote_ident(meta::VERSION),
        cols = aggregated.join(", "),
        table = table,
        filter = where_clause(conditions),
        sign = quote_ident(meta::SIGN),
    )
}

/// Greatest packed tuple per key; `columns` must start with block number and deleted flag
pub fn tuple_latest_rows(table: &FullName, columns: &[String], conditions: &[String]) -> String {
    let unpacked: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("tupleElement({}, {}) AS {}", quote_ident(PACKED), i + 1, quote_ident(c)))
        .collect();
    format!(
        "SELECT {key}, {unpacked} FROM (SELECT {key}, max(tuple({packed})) AS {latest} FROM {table}{filter} GROUP BY {key})",
        key = key(),
        unpacked = unpacked.join(", "),
        packed = quoted(columns).join(", "),
        latest = quote_ident(PACKED),
        table = table,
        filter = where_clause(conditions),
    )
}

/// First row per key by descending block number, then insert time
pub fn window_latest_rows(table: &FullName, columns: &[String], conditions: &[String]) -> String {
    let cols = quoted(columns).join(", ");
    format!(
        "SELECT {key}, {cols} FROM (SELECT {key}, {cols}, row_number() OVER (PARTITION BY {key} ORDER BY {block} DESC, {inserted} DESC) AS {rn} FROM {table}{filter}) WHERE {rn} = 1",
        key = key(),
        cols = cols,
        block = quote_ident(meta::BLOCK_NUMBER),
        inserted = quote_ident(meta::INSERT_TIME),
        rn = quote_ident(ROW_NUMBER),
        table = table,
        filter = where_clause(conditions),
    )
}

/// Drop deleted rows, then apply the remaining conditions
pub fn live_rows(rows: &str, conditions: &[String]) -> String {
    let mut all = vec![format!("NOT {}", quote_ident(meta::DELETED))];
    all.extend(conditions.iter().cloned());
    format!("SELECT * FROM ({}){}", rows, where_clause(&all))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> FullName {
        FullName::new("db", "t")
    }

    fn columns() -> Vec<String> {
        vec![meta::BLOCK_NUMBER.to_string(), meta::DELETED.to_string(), "a".to_string()]
    }

    #[test]
    fn test_tuple_latest() {
        let sql = tuple_latest_rows(&table(), &columns(), &["`__genBlockChain` = ?".to_string()]);
        assert_eq!(
            sql,
            "SELECT `id`, `__genBlockChain`, tupleElement(`__latest`, 1) AS `__genBlockNumber`, tupleElement(`__latest`, 2) AS `__deleted`, tupleElement(`__latest`, 3) AS `a` FROM (SELECT `id`, `__genBlockChain`, max(tuple(`__genBlockNumber`, `__deleted`, `a`)) AS `__latest` FROM `db`.`t` WHERE `__genBlockChain` = ? GROUP BY `id`, `__genBlockChain`)"
        );
    }

    #[test]
    fn test_collapsed() {
        let sql = collapsed_rows(&table(), &columns(), &[]);
        assert!(sql.starts_with("SELECT `id`, `__genBlockChain`, `__version`, any_respect_nulls(`__genBlockNumber`) AS `__genBlockNumber`"));
        assert!(sql.ends_with("GROUP BY `id`, `__genBlockChain`, `__version` HAVING sum(`__sign`) > 0"));
    }

    #[test]
    fn test_window() {
        let sql = window_latest_rows(&table(), &columns(), &[]);
        assert!(sql.contains("row_number() OVER (PARTITION BY `id`, `__genBlockChain` ORDER BY `__genBlockNumber` DESC, `__timestamp` DESC)"));
        assert!(sql.ends_with("WHERE `__rn` = 1"));
    }

    #[test]
    fn test_live_rows() {
        assert_eq!(
            live_rows("SELECT 1", &["`a` > ?".to_string()]),
            "SELECT * FROM (SELECT 1) WHERE NOT `__deleted` AND `a` > ?"
        );
    }
}
