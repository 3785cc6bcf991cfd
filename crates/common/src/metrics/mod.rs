//! Metrics and observability utilities
//!
//! Prometheus-style metrics with standardized naming conventions.
//! Recording is a no-op until a recorder (the Prometheus exporter in the
//! gateway) is installed, so the import CLI can call these freely.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all AidBoard metrics
pub const METRICS_PREFIX: &str = "aidboard";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Import metrics
    describe_counter!(
        format!("{}_import_rows_total", METRICS_PREFIX),
        Unit::Count,
        "Imported rows by outcome (created, updated, skipped)"
    );

    describe_counter!(
        format!("{}_reference_entities_created_total", METRICS_PREFIX),
        Unit::Count,
        "Reference entities created lazily during writes"
    );

    describe_histogram!(
        format!("{}_import_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Wall time of a full import run"
    );

    // Aggregation metrics
    describe_histogram!(
        format!("{}_aggregation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Dashboard aggregation query latency in seconds"
    );

    // Summary metrics
    describe_counter!(
        format!("{}_summary_requests_total", METRICS_PREFIX),
        Unit::Count,
        "AI summary requests by outcome"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record the outcome of one imported row
pub fn record_import_row(outcome: &'static str) {
    counter!(
        format!("{}_import_rows_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a lazily created reference entity
pub fn record_reference_created(kind: &'static str) {
    counter!(
        format!("{}_reference_entities_created_total", METRICS_PREFIX),
        "kind" => kind
    )
    .increment(1);
}

/// Record a completed import run
pub fn record_import_run(duration_secs: f64) {
    histogram!(format!("{}_import_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record one aggregation query
pub fn record_aggregation(duration_secs: f64, query: &'static str) {
    histogram!(
        format!("{}_aggregation_duration_seconds", METRICS_PREFIX),
        "query" => query
    )
    .record(duration_secs);
}

/// Record an AI summary request
pub fn record_summary(outcome: &'static str) {
    counter!(
        format!("{}_summary_requests_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_recording_without_recorder() {
        let metrics = RequestMetrics::start("GET", "/api/dashboard/summary");
        metrics.finish(200);
        record_import_row("created");
        record_reference_created("country");
        record_aggregation(0.01, "count_by_country");
        // Just verify it runs without panic
    }
}
