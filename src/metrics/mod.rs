//! # Task Metrics
//!
//! Counters and duration observations emitted by the consumer pipeline.
//!
//! - `tasks_processed{status}` with status `received`, `success` or `failed`
//! - `task_processing_seconds`: duration of the unit of work
//! - `task_execution_seconds`: task creation to completion
//!
//! Cancelled and skipped tasks emit `received` only.

pub mod otel;
pub mod recording;

use std::fmt;
use std::time::Duration;

pub use otel::OtelMetricsSink;
pub use recording::InMemoryMetricsSink;

/// Status label of the `tasks_processed` counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricLabel {
    Received,
    Success,
    Failed,
}

impl MetricLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MetricLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for task processing metrics
///
/// Recording is synchronous and infallible; sinks must not block.
pub trait MetricsSink: Send + Sync {
    fn increment(&self, label: MetricLabel);

    fn observe_processing_duration(&self, duration: Duration);

    fn observe_execution_duration(&self, duration: Duration);
}
