//! Metrics
//!
//! Session metrics collection interfaces and implementations.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Metric labels.
pub type MetricLabels = HashMap<String, String>;

/// Metric names recorded by the session layers.
pub struct SessionMetricNames;

impl SessionMetricNames {
    pub const REFRESHES_TOTAL: &'static str = "session_token_refreshes_total";
    pub const REQUESTS_QUEUED_TOTAL: &'static str = "session_requests_queued_total";
    pub const REQUESTS_REPLAYED_TOTAL: &'static str = "session_requests_replayed_total";
    pub const STORAGE_FAILURES_TOTAL: &'static str = "session_storage_failures_total";
    pub const REQUEST_DURATION_MS: &'static str = "session_request_duration_ms";
    pub const ERRORS_TOTAL: &'static str = "session_errors_total";
}

/// Session metrics interface.
pub trait SessionMetrics: Send + Sync {
    /// Record a settled token refresh.
    fn record_token_refresh(&self, success: bool);

    /// Record a request parked behind an in-flight refresh.
    fn record_request_queued(&self);

    /// Record a request replayed after a 401.
    fn record_request_replayed(&self);

    /// Record a swallowed storage failure.
    fn record_storage_failure(&self, operation: &str);

    /// Record request duration.
    fn record_request_duration(&self, endpoint: &str, duration_ms: f64);

    /// Record an error returned to a caller.
    fn record_error(&self, error_code: &str);
}

/// No-op metrics implementation.
pub struct NoOpMetrics;

impl SessionMetrics for NoOpMetrics {
    fn record_token_refresh(&self, _success: bool) {}
    fn record_request_queued(&self) {}
    fn record_request_replayed(&self) {}
    fn record_storage_failure(&self, _operation: &str) {}
    fn record_request_duration(&self, _endpoint: &str, _duration_ms: f64) {}
    fn record_error(&self, _error_code: &str) {}
}

/// No-op metrics singleton.
pub fn no_op_metrics() -> NoOpMetrics {
    NoOpMetrics
}

/// Metric entry for in-memory storage.
#[derive(Debug, Clone)]
pub struct MetricEntry {
    pub name: String,
    pub value: f64,
    pub labels: MetricLabels,
    pub timestamp: i64,
}

/// In-memory metrics for testing.
#[derive(Default)]
pub struct InMemoryMetrics {
    entries: Mutex<Vec<MetricEntry>>,
}

impl InMemoryMetrics {
    /// Create new in-memory metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded entries.
    pub fn get_entries(&self) -> Vec<MetricEntry> {
        self.entries.lock().clone()
    }

    /// Get entries by name.
    pub fn get_entries_by_name(&self, name: &str) -> Vec<MetricEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    /// Sum of values recorded under `name`.
    pub fn total(&self, name: &str) -> f64 {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.name == name)
            .map(|e| e.value)
            .sum()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn record(&self, name: &str, value: f64, labels: MetricLabels) {
        self.entries.lock().push(MetricEntry {
            name: name.to_string(),
            value,
            labels,
            timestamp: Utc::now().timestamp_millis(),
        });
    }
}

impl SessionMetrics for InMemoryMetrics {
    fn record_token_refresh(&self, success: bool) {
        let mut labels = MetricLabels::new();
        labels.insert("success".to_string(), success.to_string());
        self.record(SessionMetricNames::REFRESHES_TOTAL, 1.0, labels);
    }

    fn record_request_queued(&self) {
        self.record(SessionMetricNames::REQUESTS_QUEUED_TOTAL, 1.0, MetricLabels::new());
    }

    fn record_request_replayed(&self) {
        self.record(
            SessionMetricNames::REQUESTS_REPLAYED_TOTAL,
            1.0,
            MetricLabels::new(),
        );
    }

    fn record_storage_failure(&self, operation: &str) {
        let mut labels = MetricLabels::new();
        labels.insert("operation".to_string(), operation.to_string());
        self.record(SessionMetricNames::STORAGE_FAILURES_TOTAL, 1.0, labels);
    }

    fn record_request_duration(&self, endpoint: &str, duration_ms: f64) {
        let mut labels = MetricLabels::new();
        labels.insert("endpoint".to_string(), endpoint.to_string());
        self.record(SessionMetricNames::REQUEST_DURATION_MS, duration_ms, labels);
    }

    fn record_error(&self, error_code: &str) {
        let mut labels = MetricLabels::new();
        labels.insert("code".to_string(), error_code.to_string());
        self.record(SessionMetricNames::ERRORS_TOTAL, 1.0, labels);
    }
}

/// Create in-memory metrics for testing.
pub fn create_in_memory_metrics() -> InMemoryMetrics {
    InMemoryMetrics::new()
}
