//! Metrics and observability utilities
//!
//! Counters and histograms for fetch cycles, feed sources, metadata lookups
//! and exports, all under the `paperbot_` prefix.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all PaperBot metrics
pub const METRICS_PREFIX: &str = "paperbot";

/// Histogram buckets for HTTP request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, // 1ms
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
];

/// Buckets for upstream work: feed downloads and whole cycles
pub const FETCH_BUCKETS: &[f64] = &[
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
    60.00, // 1m
    120.0, // 2m
];

/// Full metric name under the shared prefix
pub fn metric_name(suffix: &str) -> String {
    format!("{}_{}", METRICS_PREFIX, suffix)
}

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(metric_name("requests_total"), Unit::Count, "Total number of HTTP requests");
    describe_histogram!(
        metric_name("request_duration_seconds"),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Fetch cycle metrics
    describe_counter!(metric_name("fetch_cycles_total"), Unit::Count, "Fetch cycles run");
    describe_counter!(metric_name("papers_new_total"), Unit::Count, "Papers inserted as new");
    describe_counter!(
        metric_name("papers_processed_total"),
        Unit::Count,
        "Candidate records upserted"
    );
    describe_counter!(
        metric_name("papers_archived_total"),
        Unit::Count,
        "Papers moved from new to archived"
    );
    describe_histogram!(
        metric_name("cycle_duration_seconds"),
        Unit::Seconds,
        "Fetch cycle duration in seconds"
    );
    describe_gauge!(
        metric_name("fetch_running"),
        Unit::Count,
        "1 while a fetch cycle is in progress"
    );

    // Source metrics
    describe_counter!(metric_name("source_fetch_total"), Unit::Count, "Feed source fetches");
    describe_histogram!(
        metric_name("source_fetch_duration_seconds"),
        Unit::Seconds,
        "Feed download and parse latency in seconds"
    );

    // Enrichment and export
    describe_counter!(
        metric_name("metadata_requests_total"),
        Unit::Count,
        "Metadata service lookups"
    );
    describe_counter!(metric_name("exports_total"), Unit::Count, "Export files written");

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
            metric_name("requests_total"),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            metric_name("request_duration_seconds"),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record a finished fetch cycle
pub fn record_cycle(duration_secs: f64, archived: u64, new: u64, processed: u64) {
    counter!(metric_name("fetch_cycles_total")).increment(1);
    counter!(metric_name("papers_archived_total")).increment(archived);
    counter!(metric_name("papers_new_total")).increment(new);
    counter!(metric_name("papers_processed_total")).increment(processed);
    histogram!(metric_name("cycle_duration_seconds")).record(duration_secs);
}

/// Flag a cycle as running or idle
pub fn set_fetch_running(running: bool) {
    gauge!(metric_name("fetch_running")).set(if running { 1.0 } else { 0.0 });
}

/// Record one source download
pub fn record_source_fetch(duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(metric_name("source_fetch_total"), "status" => status).increment(1);
    histogram!(metric_name("source_fetch_duration_seconds")).record(duration_secs);
}

/// Record one metadata lookup
pub fn record_metadata(success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(metric_name("metadata_requests_total"), "status" => status).increment(1);
}

/// Record one export file
pub fn record_export(format: &str) {
    counter!(metric_name("exports_total"), "format" => format.to_string()).increment(1);
}
