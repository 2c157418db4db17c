//! OpenTelemetry metrics sink
//!
//! Instruments are created from the global meter provider. Without an
//! installed provider they are no-ops, which keeps the sink usable in tests
//! and in deployments that do not export metrics. Every data point carries a
//! `service` attribute so several relays can share one meter provider.

use super::{MetricLabel, MetricsSink};
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;
use std::time::Duration;

const METER_NAME: &str = "taskrelay";

#[derive(Debug, Clone)]
pub struct OtelMetricsSink {
    service: KeyValue,
    tasks_processed: Counter<u64>,
    processing_duration: Histogram<f64>,
    execution_duration: Histogram<f64>,
}

impl OtelMetricsSink {
    /// Build instruments on the global meter
    pub fn new(service_name: &str) -> Self {
        let meter = opentelemetry::global::meter(METER_NAME);
        Self::from_meter(&meter, service_name)
    }

    pub fn from_meter(meter: &Meter, service_name: &str) -> Self {
        Self {
            service: KeyValue::new("service", service_name.to_string()),
            tasks_processed: meter
                .u64_counter("tasks_processed")
                .with_description("Number of tasks processed, labelled by status")
                .build(),
            processing_duration: meter
                .f64_histogram("task_processing_seconds")
                .with_description("Duration of the unit of work for completed tasks")
                .with_unit("s")
                .build(),
            execution_duration: meter
                .f64_histogram("task_execution_seconds")
                .with_description("Time from task creation to completion")
                .with_unit("s")
                .build(),
        }
    }
}

impl MetricsSink for OtelMetricsSink {
    fn increment(&self, label: MetricLabel) {
        self.tasks_processed
            .add(1, &[self.service.clone(), KeyValue::new("status", label.as_str())]);
    }

    fn observe_processing_duration(&self, duration: Duration) {
        self.processing_duration.record(duration.as_secs_f64(), &[self.service.clone()]);
    }

    fn observe_execution_duration(&self, duration: Duration) {
        self.execution_duration.record(duration.as_secs_f64(), &[self.service.clone()]);
    }
}
