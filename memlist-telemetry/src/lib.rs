//! # memlist Telemetry
//!
//! Logging subscriber set-up and Prometheus metrics for the allocator.

pub mod logging;
pub mod metrics;

pub use logging::Logger;
pub use metrics::MetricsRecorder;
