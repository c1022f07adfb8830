//! Monitoring Module
//!
//! Per-backend latency and error tracking surfaced by the health report.

mod metrics;

pub use metrics::{HistogramBucket, MetricsSummary, PerformanceMetrics};
