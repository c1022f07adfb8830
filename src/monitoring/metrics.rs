//! Request metrics
//!
//! Rolling latency window and histogram under one lock, plain atomics for
//! the counters.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Serialize, Serializer};

/// Histogram bucket for latency distribution
#[derive(Debug, Clone, Serialize)]
pub struct HistogramBucket {
    /// Upper bound of this bucket (in milliseconds)
    #[serde(serialize_with = "serialize_bound")]
    pub le: f64,
    pub count: u64,
}

/// JSON has no infinity; the overflow bucket reports `"+Inf"`
fn serialize_bound<S: Serializer>(le: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if le.is_finite() {
        serializer.serialize_f64(*le)
    } else {
        serializer.serialize_str("+Inf")
    }
}

struct MetricsInner {
    latencies: VecDeque<f64>,
    latency_histogram: Vec<HistogramBucket>,
}

/// Latency and outcome tracking for one backend
pub struct PerformanceMetrics {
    window_size: usize,
    inner: RwLock<MetricsInner>,
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    start_time: Instant,
}

const BUCKET_BOUNDS_MS: [f64; 9] = [5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, f64::INFINITY];

impl PerformanceMetrics {
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            inner: RwLock::new(MetricsInner {
                latencies: VecDeque::with_capacity(window_size),
                latency_histogram: BUCKET_BOUNDS_MS
                    .iter()
                    .map(|&le| HistogramBucket { le, count: 0 })
                    .collect(),
            }),
            total_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a completed request
    pub fn record_latency(&self, latency_ms: f64) {
        {
            let mut inner = self.inner.write();
            inner.latencies.push_back(latency_ms);
            if inner.latencies.len() > self.window_size {
                inner.latencies.pop_front();
            }
            if let Some(bucket) = inner
                .latency_histogram
                .iter_mut()
                .find(|bucket| latency_ms <= bucket.le)
            {
                bucket.count += 1;
            }
        }
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed request
    pub fn record_error(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency(&self) -> f64 {
        let inner = self.inner.read();
        if inner.latencies.is_empty() {
            0.0
        } else {
            inner.latencies.iter().sum::<f64>() / inner.latencies.len() as f64
        }
    }

    pub fn max_latency(&self) -> f64 {
        self.inner.read().latencies.iter().copied().fold(0.0, f64::max)
    }

    /// Percentile over the rolling window, nearest-rank by quickselect
    pub fn percentile_latency(&self, percentile: f64) -> f64 {
        let mut data: Vec<f64> = self.inner.read().latencies.iter().copied().collect();
        if data.is_empty() {
            return 0.0;
        }
        let idx = ((percentile.clamp(0.0, 100.0) / 100.0) * (data.len() - 1) as f64) as usize;
        let idx = idx.min(data.len() - 1);
        data.select_nth_unstable_by(idx, |a, b| a.total_cmp(b));
        data[idx]
    }

    pub fn p50_latency(&self) -> f64 {
        self.percentile_latency(50.0)
    }

    pub fn p95_latency(&self) -> f64 {
        self.percentile_latency(95.0)
    }

    /// Failed requests over all requests
    pub fn error_rate(&self) -> f64 {
        let requests = self.total_requests();
        if requests > 0 {
            self.total_errors() as f64 / requests as f64
        } else {
            0.0
        }
    }

    pub fn histogram(&self) -> Vec<HistogramBucket> {
        self.inner.read().latency_histogram.clone()
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_requests: self.total_requests(),
            total_errors: self.total_errors(),
            error_rate: self.error_rate(),
            avg_latency_ms: self.avg_latency(),
            max_latency_ms: self.max_latency(),
            p50_latency_ms: self.p50_latency(),
            p95_latency_ms: self.p95_latency(),
            latency_histogram: self.histogram(),
            uptime_secs: self.uptime_secs(),
        }
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Point-in-time view reported by `/health`
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    /// Per-bucket request counts, not cumulative
    pub latency_histogram: Vec<HistogramBucket>,
    pub uptime_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_basic() {
        let metrics = PerformanceMetrics::new(100);

        metrics.record_latency(10.0);
        metrics.record_latency(20.0);
        metrics.record_latency(30.0);

        assert_eq!(metrics.total_requests(), 3);
        assert!((metrics.avg_latency() - 20.0).abs() < 0.01);
        assert_eq!(metrics.max_latency(), 30.0);
    }

    #[test]
    fn test_percentiles() {
        let metrics = PerformanceMetrics::new(100);
        for i in 1..=100 {
            metrics.record_latency(i as f64);
        }

        assert!((metrics.p50_latency() - 50.0).abs() < 1.0);
        assert!((metrics.p95_latency() - 95.0).abs() < 1.0);
    }

    #[test]
    fn test_window_is_bounded() {
        let metrics = PerformanceMetrics::new(3);
        for latency in [100.0, 1.0, 2.0, 3.0] {
            metrics.record_latency(latency);
        }
        assert_eq!(metrics.max_latency(), 3.0);
        assert_eq!(metrics.total_requests(), 4);
    }

    #[test]
    fn test_error_rate() {
        let metrics = PerformanceMetrics::new(100);
        for _ in 0..10 {
            metrics.record_latency(10.0);
        }
        metrics.record_error();

        assert!((metrics.error_rate() - 0.1).abs() < 0.01);
        assert_eq!(metrics.summary().total_errors, 1);
    }

    #[test]
    fn test_histogram() {
        let metrics = PerformanceMetrics::new(100);
        metrics.record_latency(3.0);
        metrics.record_latency(2000.0);

        let histogram = metrics.histogram();
        assert_eq!(histogram[0].count, 1);
        assert_eq!(histogram.last().unwrap().count, 1);
    }

    #[test]
    fn test_summary_carries_histogram() {
        let metrics = PerformanceMetrics::new(100);
        metrics.record_latency(7.0);
        metrics.record_latency(8.0);
        metrics.record_latency(5000.0);

        let summary = metrics.summary();
        assert_eq!(summary.latency_histogram.len(), BUCKET_BOUNDS_MS.len());
        assert_eq!(summary.latency_histogram[1].count, 2);
        assert_eq!(summary.latency_histogram.iter().map(|b| b.count).sum::<u64>(), 3);

        let json = serde_json::to_value(&summary).unwrap();
        let buckets = json["latency_histogram"].as_array().unwrap();
        assert_eq!(buckets[0]["le"], 5.0);
        assert_eq!(buckets[1]["count"], 2);
        assert_eq!(buckets.last().unwrap()["le"], "+Inf");
        assert_eq!(buckets.last().unwrap()["count"], 1);
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = PerformanceMetrics::default();
        assert_eq!(metrics.avg_latency(), 0.0);
        assert_eq!(metrics.p95_latency(), 0.0);
        assert_eq!(metrics.error_rate(), 0.0);
    }
}
