//! Observable events
//!
//! Every log line names one of these events.

use std::fmt;

/// Observable events of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Store lifecycle
    /// Store built, codecs resolved
    StoreOpened,

    // Schema sync
    /// Full schema sync started
    SchemaSyncBegin,
    /// Schema sync finished
    SchemaSyncComplete,
    /// Schema sync failed
    SchemaSyncFailed,
    /// Object created
    ObjectCreated,
    /// Table altered in place
    ObjectAltered,
    /// View replaced
    ObjectReplaced,
    /// Object dropped
    ObjectDropped,
    /// Engine, partition, order-by or column type change left unapplied
    MigrationDrift,

    // Statements
    /// Statement executed
    Statement,
    /// Statement slower than the configured threshold
    SlowStatement,
    /// Statement failed
    StatementFailed,

    // Writes
    /// Batch of rows flushed
    WriteFlush,

    // Queries
    /// Temporary id table created for a huge id filter
    TempTableCreated,
    /// Temporary id table could not be dropped
    TempTableCleanupFailed,

    // Reorg
    /// Reorg started
    ReorgBegin,
    /// Reorg finished
    ReorgComplete,
    /// Reorg failed
    ReorgFailed,
    /// Collapsed table disagrees with its raw table
    CollapseMismatch,
    /// Collapsed partition rebuilt from the raw table
    PartitionRebuilt,

    // Aggregation
    /// Aggregation bucket computed
    AggregationRollup,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::StoreOpened => "STORE_OPENED",

            Event::SchemaSyncBegin => "SCHEMA_SYNC_BEGIN",
            Event::SchemaSyncComplete => "SCHEMA_SYNC_COMPLETE",
            Event::SchemaSyncFailed => "SCHEMA_SYNC_FAILED",
            Event::ObjectCreated => "OBJECT_CREATED",
            Event::ObjectAltered => "OBJECT_ALTERED",
            Event::ObjectReplaced => "OBJECT_REPLACED",
            Event::ObjectDropped => "OBJECT_DROPPED",
            Event::MigrationDrift => "MIGRATION_DRIFT",

            Event::Statement => "STATEMENT",
            Event::SlowStatement => "SLOW_STATEMENT",
            Event::StatementFailed => "STATEMENT_FAILED",

            Event::WriteFlush => "WRITE_FLUSH",

            Event::TempTableCreated => "TEMP_TABLE_CREATED",
            Event::TempTableCleanupFailed => "TEMP_TABLE_CLEANUP_FAILED",

            Event::ReorgBegin => "REORG_BEGIN",
            Event::ReorgComplete => "REORG_COMPLETE",
            Event::ReorgFailed => "REORG_FAILED",
            Event::CollapseMismatch => "COLLAPSE_MISMATCH",
            Event::PartitionRebuilt => "PARTITION_REBUILT",

            Event::AggregationRollup => "AGGREGATION_ROLLUP",
        }
    }

    /// Returns true if this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::SchemaSyncFailed
                | Event::StatementFailed
                | Event::TempTableCleanupFailed
                | Event::ReorgFailed
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(Event::MigrationDrift.as_str(), "MIGRATION_DRIFT");
        assert_eq!(Event::PartitionRebuilt.to_string(), "PARTITION_REBUILT");
    }

    #[test]
    fn test_failure_events() {
        assert!(Event::TempTableCleanupFailed.is_failure());
        assert!(!Event::ObjectCreated.is_failure());
    }
}
