//! Metrics and observability utilities
//!
//! Counters and histograms for the external service calls and the
//! reconciler. Without an installed recorder every helper is a no-op.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Tuneboard metrics
pub const METRICS_PREFIX: &str = "tuneboard";

/// Buckets for external request latency (in seconds)
pub const REQUEST_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s, dataset generation
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_backend_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total requests sent to external services"
    );

    describe_histogram!(
        format!("{}_backend_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "External request latency in seconds"
    );

    describe_counter!(
        format!("{}_status_polls_total", METRICS_PREFIX),
        Unit::Count,
        "Status polls applied by the reconciler"
    );

    describe_counter!(
        format!("{}_training_transitions_total", METRICS_PREFIX),
        Unit::Count,
        "Terminal training transitions observed"
    );

    describe_counter!(
        format!("{}_notifications_total", METRICS_PREFIX),
        Unit::Count,
        "Notifications emitted"
    );

    describe_gauge!(
        format!("{}_requests_in_flight", METRICS_PREFIX),
        Unit::Count,
        "Requests issued by the reconciler and not yet applied"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record one external request
pub struct RequestMetrics {
    start: Instant,
    service: &'static str,
    endpoint: &'static str,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(service: &'static str, endpoint: &'static str) -> Self {
        Self {
            start: Instant::now(),
            service,
            endpoint,
        }
    }

    /// Record request completion
    pub fn finish(self, success: bool) {
        let duration = self.start.elapsed().as_secs_f64();
        let outcome = if success { "success" } else { "error" };

        counter!(
            format!("{}_backend_requests_total", METRICS_PREFIX),
            "service" => self.service,
            "endpoint" => self.endpoint,
            "outcome" => outcome
        )
        .increment(1);

        histogram!(
            format!("{}_backend_request_duration_seconds", METRICS_PREFIX),
            "service" => self.service,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record a status poll applied by the reconciler
pub fn record_poll(source: &'static str, success: bool) {
    let outcome = if success { "applied" } else { "degraded" };
    counter!(
        format!("{}_status_polls_total", METRICS_PREFIX),
        "source" => source,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a terminal training transition
pub fn record_transition(state: &'static str) {
    counter!(
        format!("{}_training_transitions_total", METRICS_PREFIX),
        "state" => state
    )
    .increment(1);
}

/// Record an emitted notification
pub fn record_notification(level: &'static str) {
    counter!(
        format!("{}_notifications_total", METRICS_PREFIX),
        "level" => level
    )
    .increment(1);
}

/// Record the number of reconciler requests in flight
pub fn record_in_flight(count: usize) {
    gauge!(format!("{}_requests_in_flight", METRICS_PREFIX)).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in REQUEST_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_helpers_without_recorder() {
        let metrics = RequestMetrics::start("backend", "/training-status");
        metrics.finish(true);
        record_poll("model", false);
        record_transition("completed");
        record_notification("success");
        record_in_flight(3);
        // Just verify it runs without panic
    }
}
