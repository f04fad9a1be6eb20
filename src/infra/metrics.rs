//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Prometheus-style exponential bucket boundaries for delivery latency (ms)
/// Buckets: ≤25, ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, >12800
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = [25, 50, 100, 200, 400, 800, 1600, 3200, 6400, 12800];
pub const METRICS_NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    METRICS_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Lock-free metrics collector for the monitor pipeline
pub struct Metrics {
    /// Position samples processed (monotonic)
    samples_total: AtomicU64,
    /// Samples since last report (reset on report)
    samples_since_report: AtomicU64,
    /// Samples dropped because the ingest channel was full (monotonic)
    samples_dropped: AtomicU64,
    /// Exit events fired (monotonic)
    exits_total: AtomicU64,
    /// SOS triggers processed (monotonic)
    sos_total: AtomicU64,
    /// Alerts delivered on first attempt or flush (monotonic)
    alerts_delivered: AtomicU64,
    /// Alerts written to the offline queue (monotonic)
    alerts_queued: AtomicU64,
    /// Storage errors surfaced from the monitor loop (monotonic)
    storage_errors: AtomicU64,
    /// Current offline queue depth (gauge, set after queue operations)
    queue_depth: AtomicU64,
    /// Delivery attempt latency histogram (ms, reset on report)
    delivery_latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    /// Sum of delivery latencies in ms (reset on report)
    delivery_latency_sum_ms: AtomicU64,
    /// Max delivery latency in ms (reset on report)
    delivery_latency_max_ms: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            samples_total: AtomicU64::new(0),
            samples_since_report: AtomicU64::new(0),
            samples_dropped: AtomicU64::new(0),
            exits_total: AtomicU64::new(0),
            sos_total: AtomicU64::new(0),
            alerts_delivered: AtomicU64::new(0),
            alerts_queued: AtomicU64::new(0),
            storage_errors: AtomicU64::new(0),
            queue_depth: AtomicU64::new(0),
            delivery_latency_buckets: Default::default(),
            delivery_latency_sum_ms: AtomicU64::new(0),
            delivery_latency_max_ms: AtomicU64::new(0),
        }
    }

    pub fn record_sample_processed(&self) {
        self.samples_total.fetch_add(1, Ordering::Relaxed);
        self.samples_since_report.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample_dropped(&self) {
        self.samples_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exit_fired(&self) {
        self.exits_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sos(&self) {
        self.sos_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_delivered(&self, latency_ms: u64) {
        self.alerts_delivered.fetch_add(1, Ordering::Relaxed);
        self.record_delivery_latency(latency_ms);
    }

    pub fn record_alert_queued(&self) {
        self.alerts_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_storage_error(&self) {
        self.storage_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth as u64, Ordering::Relaxed);
    }

    fn record_delivery_latency(&self, latency_ms: u64) {
        self.delivery_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        update_atomic_max(&self.delivery_latency_max_ms, latency_ms);
        self.delivery_latency_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters. Since-report counters reset atomically.
    pub fn report(&self) -> MetricsSummary {
        let delivered = self.alerts_delivered.load(Ordering::Relaxed);
        MetricsSummary {
            samples_total: self.samples_total.load(Ordering::Relaxed),
            samples_since_report: self.samples_since_report.swap(0, Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            exits_total: self.exits_total.load(Ordering::Relaxed),
            sos_total: self.sos_total.load(Ordering::Relaxed),
            alerts_delivered: delivered,
            alerts_queued: self.alerts_queued.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            delivery_latency_buckets: load_buckets(&self.delivery_latency_buckets),
            delivery_latency_avg_ms: if delivered > 0 {
                self.delivery_latency_sum_ms.load(Ordering::Relaxed) / delivered
            } else {
                0
            },
            delivery_latency_max_ms: self.delivery_latency_max_ms.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Consistent snapshot of the metrics counters
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub samples_total: u64,
    pub samples_since_report: u64,
    pub samples_dropped: u64,
    pub exits_total: u64,
    pub sos_total: u64,
    pub alerts_delivered: u64,
    pub alerts_queued: u64,
    pub storage_errors: u64,
    pub queue_depth: u64,
    pub delivery_latency_buckets: [u64; METRICS_NUM_BUCKETS],
    pub delivery_latency_avg_ms: u64,
    pub delivery_latency_max_ms: u64,
}

impl MetricsSummary {
    /// Log the summary as a structured event
    pub fn log(&self) {
        info!(
            samples_total = %self.samples_total,
            samples_since_report = %self.samples_since_report,
            samples_dropped = %self.samples_dropped,
            exits_total = %self.exits_total,
            sos_total = %self.sos_total,
            alerts_delivered = %self.alerts_delivered,
            alerts_queued = %self.alerts_queued,
            storage_errors = %self.storage_errors,
            queue_depth = %self.queue_depth,
            delivery_latency_avg_ms = %self.delivery_latency_avg_ms,
            delivery_latency_max_ms = %self.delivery_latency_max_ms,
            "metrics_report"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(25), 0);
        assert_eq!(bucket_index(26), 1);
        assert_eq!(bucket_index(12800), 9);
        assert_eq!(bucket_index(99999), 10);
    }

    #[test]
    fn test_counters_and_report_reset() {
        let metrics = Metrics::new();
        metrics.record_sample_processed();
        metrics.record_sample_processed();
        metrics.record_exit_fired();
        metrics.record_alert_delivered(40);
        metrics.record_alert_queued();
        metrics.set_queue_depth(3);

        let summary = metrics.report();
        assert_eq!(summary.samples_total, 2);
        assert_eq!(summary.samples_since_report, 2);
        assert_eq!(summary.exits_total, 1);
        assert_eq!(summary.alerts_delivered, 1);
        assert_eq!(summary.alerts_queued, 1);
        assert_eq!(summary.queue_depth, 3);
        assert_eq!(summary.delivery_latency_buckets[1], 1);

        // since-report counter resets, monotonic counters do not
        let summary = metrics.report();
        assert_eq!(summary.samples_since_report, 0);
        assert_eq!(summary.samples_total, 2);
    }

    #[test]
    fn test_delivery_latency_max() {
        let metrics = Metrics::new();
        metrics.record_alert_delivered(10);
        metrics.record_alert_delivered(500);
        metrics.record_alert_delivered(100);

        let summary = metrics.report();
        assert_eq!(summary.delivery_latency_max_ms, 500);
        assert_eq!(summary.delivery_latency_avg_ms, (10 + 500 + 100) / 3);
    }
}
