//! Identifier and literal quoting
//!
//! Only names produced by the store (processor id, type and field names,
//! which are validated plain identifiers) are interpolated into statements.
//! Values always travel as `?` parameters, except enum labels and comment
//! strings, which go through `quote_str`.

/// Non-empty ASCII alphanumerics and underscores
pub fn is_plain_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Backtick-quote an identifier
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}

/// Single-quote a string literal
pub fn quote_str(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Remove identifier and string quoting, for comparing expressions
pub fn strip_quotes(expr: &str) -> String {
    expr.chars().filter(|c| *c != '`' && *c != '"').collect()
}
