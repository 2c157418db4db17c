//! Recording metrics sink
//!
//! Keeps every increment and observation in memory so tests can assert on
//! exactly what the pipeline emitted.

use super::{MetricLabel, MetricsSink};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct InMemoryMetricsSink {
    received: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    processing_durations: Mutex<Vec<Duration>>,
    execution_durations: Mutex<Vec<Duration>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, label: MetricLabel) -> u64 {
        self.counter(label).load(Ordering::SeqCst)
    }

    pub fn processing_durations(&self) -> Vec<Duration> {
        self.processing_durations.lock().clone()
    }

    pub fn execution_durations(&self) -> Vec<Duration> {
        self.execution_durations.lock().clone()
    }

    fn counter(&self, label: MetricLabel) -> &AtomicU64 {
        match label {
            MetricLabel::Received => &self.received,
            MetricLabel::Success => &self.success,
            MetricLabel::Failed => &self.failed,
        }
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn increment(&self, label: MetricLabel) {
        self.counter(label).fetch_add(1, Ordering::SeqCst);
    }

    fn observe_processing_duration(&self, duration: Duration) {
        self.processing_durations.lock().push(duration);
    }

    fn observe_execution_duration(&self, duration: Duration) {
        self.execution_durations.lock().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_per_label() {
        let sink = InMemoryMetricsSink::new();
        sink.increment(MetricLabel::Received);
        sink.increment(MetricLabel::Received);
        sink.increment(MetricLabel::Failed);
        sink.observe_processing_duration(Duration::from_millis(3));

        assert_eq!(sink.count(MetricLabel::Received), 2);
        assert_eq!(sink.count(MetricLabel::Success), 0);
        assert_eq!(sink.count(MetricLabel::Failed), 1);
        assert_eq!(sink.processing_durations(), vec![Duration::from_millis(3)]);
        assert!(sink.execution_durations().is_empty());
    }
}
