//! Metrics registry
//!
//! Counters only, monotonic, reset when the store is rebuilt.

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters of one store
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    statements: AtomicU64,
    statement_failures: AtomicU64,
    rows_inserted: AtomicU64,
    entities_created: AtomicU64,
    objects_migrated: AtomicU64,
    drift_warnings: AtomicU64,
    reorgs: AtomicU64,
    partition_rebuilds: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_statements(&self) {
        self.statements.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_statement_failures(&self) {
        self.statement_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_rows_inserted(&self, rows: u64) {
        self.rows_inserted.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn add_entities_created(&self, count: u64) {
        self.entities_created.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_objects_migrated(&self, count: u64) {
        self.objects_migrated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_drift_warnings(&self, count: u64) {
        self.drift_warnings.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_reorgs(&self) {
        self.reorgs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_partition_rebuilds(&self) {
        self.partition_rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            statements: self.statements.load(Ordering::Relaxed),
            statement_failures: self.statement_failures.load(Ordering::Relaxed),
            rows_inserted: self.rows_inserted.load(Ordering::Relaxed),
            entities_created: self.entities_created.load(Ordering::Relaxed),
            objects_migrated: self.objects_migrated.load(Ordering::Relaxed),
            drift_warnings: self.drift_warnings.load(Ordering::Relaxed),
            reorgs: self.reorgs.load(Ordering::Relaxed),
            partition_rebuilds: self.partition_rebuilds.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub statements: u64,
    pub statement_failures: u64,
    pub rows_inserted: u64,
    pub entities_created: u64,
    pub objects_migrated: u64,
    pub drift_warnings: u64,
    pub reorgs: u64,
    pub partition_rebuilds: u64,
}
