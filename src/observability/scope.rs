//! ObservationScope for begin/complete logging around multi-step operations
//!
//! - Logs the begin event on creation
//! - Logs the complete event, with elapsed time, on `complete()`
//! - Logs the failure event on `fail()` or when dropped unfinished

use std::time::Instant;

use super::events::Event;
use super::logger::Logger;

/// A scope that logs begin/complete/failed events for one operation
pub struct ObservationScope {
    complete_event: Event,
    failed_event: Event,
    fields: Vec<(&'static str, String)>,
    timer: Timer,
    finished: bool,
}

impl ObservationScope {
    /// Open a scope, logging `begin` immediately
    pub fn new(
        begin: Event,
        complete: Event,
        failed: Event,
        fields: &[(&'static str, &str)],
    ) -> Self {
        Logger::info(begin, fields);
        Self {
            complete_event: complete,
            failed_event: failed,
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            timer: Timer::new(),
            finished: false,
        }
    }

    /// Mark the scope as completed with extra result fields
    pub fn complete(mut self, extra: &[(&str, &str)]) {
        self.finished = true;
        let elapsed = self.timer.elapsed_ms().to_string();
        let mut fields: Vec<(&str, &str)> =
            self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        fields.extend(extra.iter().copied());
        fields.push(("elapsed_ms", &elapsed));
        Logger::info(self.complete_event, &fields);
    }

    /// Mark the scope as failed
    pub fn fail(mut self, reason: &str) {
        self.finished = true;
        self.log_failure(reason);
    }

    /// Whether `complete` or `fail` was called
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn log_failure(&self, reason: &str) {
        let elapsed = self.timer.elapsed_ms().to_string();
        let mut fields: Vec<(&str, &str)> =
            self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        fields.push(("reason", reason));
        fields.push(("elapsed_ms", &elapsed));
        Logger::error(self.failed_event, &fields);
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.finished {
            self.log_failure("scope dropped without completion");
        }
    }
}

/// Elapsed-time helper
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Milliseconds since creation
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_marks_finished() {
        let scope = ObservationScope::new(
            Event::ReorgBegin,
            Event::ReorgComplete,
            Event::ReorgFailed,
            &[("chain", "1")],
        );
        assert!(!scope.is_finished());
        scope.complete(&[("tables", "3")]);
    }

    #[test]
    fn test_drop_without_complete_does_not_panic() {
        let scope = ObservationScope::new(
            Event::SchemaSyncBegin,
            Event::SchemaSyncComplete,
            Event::SchemaSyncFailed,
            &[],
        );
        drop(scope);
    }

    #[test]
    fn test_timer_is_monotonic() {
        let timer = Timer::new();
        let first = timer.elapsed_ms();
        assert!(timer.elapsed_ms() >= first);
    }
}
