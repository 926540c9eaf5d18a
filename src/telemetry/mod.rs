//! Telemetry
//!
//! Observability components for the session layers.
//!
//! - **Logging**: `tracing-subscriber` setup and request/response helpers
//! - **Metrics**: refresh, replay and storage-failure counters

pub mod logging;
pub mod metrics;

// Logging
pub use logging::{log_request, log_response, LogFormat, LogLevel, LoggingConfig};

// Metrics
pub use metrics::{
    create_in_memory_metrics, no_op_metrics, InMemoryMetrics, MetricEntry, MetricLabels,
    NoOpMetrics, SessionMetricNames, SessionMetrics,
};
