//! # Task Consumer
//!
//! The consumption loop: connect, consume, batch, orchestrate, settle.
//!
//! Batches are processed one at a time. When the delivery stream fails or
//! ends unexpectedly the connection is closed and re-established with the
//! client's bounded retry policy; exhausting it stops the consumer with an
//! error. A shutdown signal stops the loop once the in-flight batch has been
//! settled.

use super::batch_orchestrator::{settle_batch, TaskExecutionOrchestrator};
use crate::logging::log_batch_operation;
use crate::messaging::{batched, BatchConfig, Delivery, MessagingError, QueueClient};
use futures::StreamExt;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Running totals for one consumer
#[derive(Debug, Default)]
pub struct ConsumerStats {
    pub batches_processed: AtomicU64,
    pub messages_acknowledged: AtomicU64,
    pub messages_requeued: AtomicU64,
    pub messages_rejected: AtomicU64,
    pub settle_failures: AtomicU64,
    pub reconnects: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStatsSnapshot {
    pub batches_processed: u64,
    pub messages_acknowledged: u64,
    pub messages_requeued: u64,
    pub messages_rejected: u64,
    pub settle_failures: u64,
    pub reconnects: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            batches_processed: self.batches_processed.load(Ordering::Relaxed),
            messages_acknowledged: self.messages_acknowledged.load(Ordering::Relaxed),
            messages_requeued: self.messages_requeued.load(Ordering::Relaxed),
            messages_rejected: self.messages_rejected.load(Ordering::Relaxed),
            settle_failures: self.settle_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Why a delivery stream stopped being read
enum StreamEnd {
    Shutdown,
    Lost(String),
}

pub struct TaskConsumer {
    client: Arc<dyn QueueClient>,
    orchestrator: TaskExecutionOrchestrator,
    batch_config: BatchConfig,
    queue_name: String,
    stats: Arc<ConsumerStats>,
}

impl std::fmt::Debug for TaskConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskConsumer")
            .field("provider", &self.client.provider_name())
            .field("queue_name", &self.queue_name)
            .field("batch_config", &self.batch_config)
            .finish()
    }
}

impl TaskConsumer {
    pub fn new(
        client: Arc<dyn QueueClient>,
        orchestrator: TaskExecutionOrchestrator,
        batch_config: BatchConfig,
        queue_name: impl Into<String>,
    ) -> Result<Self, MessagingError> {
        batch_config
            .validate()
            .map_err(|reason| MessagingError::configuration("consumer", reason))?;

        Ok(Self {
            client,
            orchestrator,
            batch_config,
            queue_name: queue_name.into(),
            stats: Arc::new(ConsumerStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    /// Consume until `shutdown` turns true (or its sender is dropped)
    ///
    /// Returns an error only when the broker cannot be reached within the
    /// client's retry policy.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<ConsumerStatsSnapshot, MessagingError> {
        info!(
            provider = self.client.provider_name(),
            queue = %self.queue_name,
            batch_size = self.batch_config.max_size,
            batch_timeout_ms = self.batch_config.max_wait.as_millis() as u64,
            "Task consumer starting"
        );

        self.client.connect().await?;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let end = match self.client.consume(&self.queue_name).await {
                Ok(stream) => self.drain(stream, &mut shutdown).await,
                Err(e) => StreamEnd::Lost(e.to_string()),
            };

            match end {
                StreamEnd::Shutdown => break,
                StreamEnd::Lost(reason) => {
                    warn!(queue = %self.queue_name, reason = %reason, "Delivery stream lost, reconnecting");
                    self.reconnect(reason).await?;
                }
            }
        }

        if let Err(e) = self.client.close().await {
            warn!(error = %e, "Queue client close failed");
        }

        let snapshot = self.stats.snapshot();
        info!(
            batches = snapshot.batches_processed,
            acknowledged = snapshot.messages_acknowledged,
            requeued = snapshot.messages_requeued,
            reconnects = snapshot.reconnects,
            "Task consumer stopped"
        );
        Ok(snapshot)
    }

    async fn drain(
        &self,
        stream: crate::messaging::DeliveryStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> StreamEnd {
        let mut batches = batched(stream, self.batch_config).boxed();

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested");
                        return StreamEnd::Shutdown;
                    }
                }

                next = batches.next() => {
                    let Some(batch) = next else {
                        return StreamEnd::Lost("delivery stream ended".to_string());
                    };

                    let mut deliveries = Vec::with_capacity(batch.len());
                    let mut stream_error = None;
                    for item in batch {
                        match item {
                            Ok(delivery) => deliveries.push(delivery),
                            Err(e) => stream_error = Some(e),
                        }
                    }

                    if !deliveries.is_empty() {
                        self.handle_batch(&deliveries).await;
                    }
                    if let Some(e) = stream_error {
                        return StreamEnd::Lost(e.to_string());
                    }
                }
            }
        }
    }

    async fn handle_batch(&self, deliveries: &[Delivery]) {
        let started = Instant::now();
        debug!(batch_size = deliveries.len(), "Processing batch");

        let outcome = self.orchestrator.process_batch(deliveries).await;
        let summary = settle_batch(self.client.as_ref(), deliveries, &outcome).await;

        self.stats.batches_processed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .messages_acknowledged
            .fetch_add(summary.acknowledged as u64, Ordering::Relaxed);
        self.stats
            .messages_requeued
            .fetch_add(summary.requeued as u64, Ordering::Relaxed);
        self.stats
            .messages_rejected
            .fetch_add(summary.rejected as u64, Ordering::Relaxed);
        self.stats
            .settle_failures
            .fetch_add(summary.failures as u64, Ordering::Relaxed);

        log_batch_operation(
            deliveries.len(),
            summary.acknowledged,
            summary.requeued,
            summary.rejected,
            started.elapsed().as_millis() as u64,
        );
    }

    async fn reconnect(&self, reason: String) -> Result<(), MessagingError> {
        let state = self.client.connection_state();
        state.mark_disconnected(reason);

        if let Err(e) = self.client.close().await {
            debug!(error = %e, "Close before reconnect failed");
        }

        match self.client.connect().await {
            Ok(()) => {
                state.record_reconnect();
                self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
                info!(reconnects = state.reconnect_count(), "Reconnected to broker");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Reconnect failed, stopping consumer");
                Err(e)
            }
        }
    }
}
