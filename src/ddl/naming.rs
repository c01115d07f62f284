//! Physical object naming
//!
//! Every object is named `<processor>_<category>_<type>`, so all objects of
//! one processor share the `<processor>_` prefix.

use std::fmt;

use crate::sql::quote_ident;

/// Role of a physical object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Append-only history of a collapsing entity
    VersionedEntity,
    /// Sign/version collapsing copy of the history
    VersionedLatestEntity,
    /// Materialized view feeding the collapsing copy
    VersionedLatestEntityMV,
    /// Plain entity table
    Entity,
    /// Union of implementor views
    Interface,
    Aggregation,
    View,
    LatestView,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::VersionedEntity,
        Category::VersionedLatestEntity,
        Category::VersionedLatestEntityMV,
        Category::Entity,
        Category::Interface,
        Category::Aggregation,
        Category::View,
        Category::LatestView,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::VersionedEntity => "versionedEntity",
            Category::VersionedLatestEntity => "versionedLatestEntity",
            Category::VersionedLatestEntityMV => "versionedLatestEntityMV",
            Category::Entity => "entity",
            Category::Interface => "interface",
            Category::Aggregation => "aggregation",
            Category::View => "view",
            Category::LatestView => "latestView",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Database-qualified object name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FullName {
    pub database: String,
    pub name: String,
}

impl FullName {
    pub fn new(database: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", quote_ident(&self.database), quote_ident(&self.name))
    }
}

/// Name factory for one processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    database: String,
    processor_id: String,
}

impl Naming {
    pub fn new(database: impl Into<String>, processor_id: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            processor_id: processor_id.into(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Prefix shared by every object of the processor
    pub fn prefix(&self) -> String {
        format!("{}_", self.processor_id)
    }

    pub fn name(&self, category: Category, type_name: &str) -> FullName {
        FullName::new(
            &self.database,
            format!("{}_{}_{}", self.processor_id, category.as_str(), type_name),
        )
    }

    /// Category and type name of an object owned by this processor
    pub fn parse(&self, name: &str) -> Option<(Category, String)> {
        let rest = name.strip_prefix(&self.prefix())?;
        let (category, type_name) = rest.split_once('_')?;
        Some((Category::from_name(category)?, type_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        let naming = Naming::new("db", "p1");
        let name = naming.name(Category::VersionedLatestEntityMV, "Pool");
        assert_eq!(name.name, "p1_versionedLatestEntityMV_Pool");
        assert_eq!(name.to_string(), "`db`.`p1_versionedLatestEntityMV_Pool`");
    }

    #[test]
    fn test_parse_round_trips() {
        let naming = Naming::new("db", "p1");
        for category in Category::ALL {
            let name = naming.name(category, "Big_Type");
            assert_eq!(naming.parse(&name.name), Some((category, "Big_Type".to_string())));
        }
        assert_eq!(naming.parse("p2_entity_Pool"), None);
        assert_eq!(naming.parse("p1_unknown_Pool"), None);
    }
}
