//! Observability subsystem
//!
//! - Structured logging (JSON lines, deterministic key order)
//! - Typed lifecycle events
//! - Counters
//!
//! Observability never changes the outcome of an operation: logging failures
//! are swallowed and cleanup failures are reported here instead of raised.
//!
//! ```ignore
//! use entity_store::observability::{Event, Logger};
//!
//! Logger::warn(Event::MigrationDrift, &[("table", "p_entity_Pool"), ("property", "engine")]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};
