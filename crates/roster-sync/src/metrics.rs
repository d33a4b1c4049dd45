// Metrics for the sync engine
// Counters and histograms are recorded through the `metrics` facade; the
// binary decides which recorder (if any) receives them.

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use roster_common::{ChangeChannel, SyncError};

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    describe_counter!(
        "roster_events_total",
        "Total number of change events handled, by channel, operation and outcome"
    );
    describe_histogram!(
        "roster_operation_duration_seconds",
        "Sync coordinator operation duration in seconds"
    );
    describe_counter!(
        "roster_notifications_total",
        "Total number of refresh notifications published"
    );

    tracing::info!("Metrics initialized");
}

/// Outcome label of a handled event
pub fn outcome_label(result: &Result<(), SyncError>) -> &'static str {
    match result {
        Ok(()) => "ok",
        Err(e) => e.kind().as_str(),
    }
}

/// Record a routed event
pub fn record_event(channel: ChangeChannel, operation: &str, outcome: &str) {
    counter!("roster_events_total", "channel" => channel.as_str(), "operation" => operation.to_string(), "outcome" => outcome.to_string()).increment(1);
}

/// Record a finished coordinator operation
pub fn record_operation(operation: &'static str, success: bool, duration_secs: f64) {
    histogram!("roster_operation_duration_seconds", "operation" => operation, "success" => success.to_string()).record(duration_secs);
}

/// Record a published refresh notification
pub fn record_notification(scope: &'static str) {
    counter!("roster_notifications_total", "scope" => scope).increment(1);
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
