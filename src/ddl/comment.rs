//! Object comment microformat
//!
//! `SCHEMA_HASH(3f2a...) IMPL(Named,Owned) SRC(Trade)`: space separated
//! `KEY(value)` pairs. The hash is what migration compares; `IMPL` lists the
//! interfaces an entity implements and `SRC` names an aggregation source.
//! Unknown keys are kept so comments written by newer layouts survive.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;

pub const KEY_SCHEMA_HASH: &str = "SCHEMA_HASH";
pub const KEY_IMPL: &str = "IMPL";
pub const KEY_SRC: &str = "SRC";

/// Parsed object comment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comment {
    entries: BTreeMap<String, String>,
}

impl Comment {
    pub fn new(schema_hash: impl Into<String>) -> Self {
        let mut comment = Self::default();
        comment.entries.insert(KEY_SCHEMA_HASH.to_string(), schema_hash.into());
        comment
    }

    pub fn with_impl(mut self, interfaces: &[String]) -> Self {
        if !interfaces.is_empty() {
            self.entries.insert(KEY_IMPL.to_string(), interfaces.join(","));
        }
        self
    }

    pub fn with_src(mut self, source: impl Into<String>) -> Self {
        self.entries.insert(KEY_SRC.to_string(), source.into());
        self
    }

    pub fn schema_hash(&self) -> Option<&str> {
        self.get(KEY_SCHEMA_HASH)
    }

    pub fn interfaces(&self) -> Vec<String> {
        self.get(KEY_IMPL)
            .map(|v| v.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn source(&self) -> Option<&str> {
        self.get(KEY_SRC)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Parse a stored comment; text outside `KEY(value)` pairs is ignored
    pub fn parse(text: &str) -> Self {
        let pattern = match Regex::new(r"([A-Z_]+)\(([^)]*)\)") {
            Ok(p) => p,
            Err(_) => return Self::default(),
        };
        let entries = pattern
            .captures_iter(text)
            .map(|c| (c[1].to_string(), c[2].to_string()))
            .collect();
        Self { entries }
    }
}

impl fmt::Display for Comment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        // Hash first, the rest in key order
        let ordered = self
            .entries
            .get_key_value(KEY_SCHEMA_HASH)
            .into_iter()
            .chain(self.entries.iter().filter(|(k, _)| k.as_str() != KEY_SCHEMA_HASH));
        for (key, value) in ordered {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}({})", key, value)?;
            first = false;
        }
        Ok(())
    }
}
