//! # Task Execution Orchestrator
//!
//! Turns one batch of deliveries into one acknowledgment decision per
//! delivery.
//!
//! ## Per batch
//!
//! 1. Decode every body; undecodable bodies are poison messages.
//! 2. Fetch every referenced task in one store call (duplicates once).
//! 3. Ids the store does not know are poison messages.
//! 4. Run the per-task procedure for all fetched tasks concurrently. A
//!    failure or panic in one task does not affect its siblings.
//! 5. Write back every task whose status changed, in one store call. The
//!    call is retried under the write-back policy; once that is exhausted
//!    the tasks are written one at a time.
//! 6. Completed, cancelled and skipped tasks are acknowledged; failed tasks
//!    are requeued; poison messages follow the configured policy.
//!
//! A failure of the batch fetch or the write-back requeues every delivery of
//! the batch. Tasks left in `PROCESSING` by such a failure are resumed when
//! their messages come back as redeliveries.

use super::task_processor::{TaskOutcome, TaskProcessor};
use super::work::UnitOfWork;
use crate::cache::CancellationFlagStore;
use crate::config::PoisonMessagePolicy;
use crate::database::{StoreError, TaskStore};
use crate::messaging::{Delivery, QueueClient};
use crate::metrics::{MetricLabel, MetricsSink};
use crate::models::Task;
use crate::resilience::RetryPolicy;
use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// How a single delivery is settled with the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckDecision {
    Acknowledge,
    /// Negative-acknowledge with requeue
    Requeue,
    /// Negative-acknowledge without requeue
    Reject,
}

impl AckDecision {
    pub fn for_outcome(outcome: TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::Completed | TaskOutcome::Cancelled | TaskOutcome::Skipped => {
                Self::Acknowledge
            }
            TaskOutcome::Failed => Self::Requeue,
        }
    }

    pub fn for_poison(policy: PoisonMessagePolicy) -> Self {
        match policy {
            PoisonMessagePolicy::Reject => Self::Reject,
            PoisonMessagePolicy::Acknowledge => Self::Acknowledge,
            PoisonMessagePolicy::Requeue => Self::Requeue,
        }
    }
}

impl fmt::Display for AckDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Acknowledge => "acknowledge",
            Self::Requeue => "requeue",
            Self::Reject => "reject",
        };
        f.write_str(value)
    }
}

#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("Batch fetch failed: {0}")]
    BatchFetch(#[source] StoreError),

    #[error("Batch write-back failed: {0}")]
    BatchWriteBack(#[source] StoreError),
}

/// Decisions for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// One decision per delivery, in delivery order
    pub decisions: Vec<AckDecision>,
    /// Ids of tasks that reached `COMPLETED` in this batch, ascending
    pub completed_task_ids: Vec<i64>,
    /// Outcome of every task that was processed
    pub task_outcomes: BTreeMap<i64, TaskOutcome>,
    /// Set when the whole batch was requeued because of a batch-level failure
    pub batch_error: Option<String>,
}

impl BatchOutcome {
    pub fn requeue_all(batch_size: usize, reason: impl Into<String>) -> Self {
        Self {
            decisions: vec![AckDecision::Requeue; batch_size],
            completed_task_ids: Vec::new(),
            task_outcomes: BTreeMap::new(),
            batch_error: Some(reason.into()),
        }
    }

    pub fn count(&self, decision: AckDecision) -> usize {
        self.decisions.iter().filter(|d| **d == decision).count()
    }
}

/// Counts from applying a [`BatchOutcome`] to the broker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SettleSummary {
    pub acknowledged: usize,
    pub requeued: usize,
    pub rejected: usize,
    /// Ack or nack calls the broker refused
    pub failures: usize,
}

pub struct TaskExecutionOrchestrator {
    store: Arc<dyn TaskStore>,
    metrics: Arc<dyn MetricsSink>,
    processor: TaskProcessor,
    poison_policy: PoisonMessagePolicy,
    write_back_retry: RetryPolicy,
}

impl fmt::Debug for TaskExecutionOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskExecutionOrchestrator")
            .field("processor", &self.processor)
            .field("poison_policy", &self.poison_policy)
            .field("write_back_retry", &self.write_back_retry)
            .finish()
    }
}

impl TaskExecutionOrchestrator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        cancellations: Arc<dyn CancellationFlagStore>,
        metrics: Arc<dyn MetricsSink>,
        work: Arc<dyn UnitOfWork>,
        poison_policy: PoisonMessagePolicy,
    ) -> Self {
        let processor = TaskProcessor::new(
            Arc::clone(&store),
            cancellations,
            Arc::clone(&metrics),
            work,
        );
        Self {
            store,
            metrics,
            processor,
            poison_policy,
            write_back_retry: RetryPolicy::fixed(3, Duration::from_millis(200)),
        }
    }

    pub fn with_write_back_retry(mut self, policy: RetryPolicy) -> Self {
        self.write_back_retry = policy;
        self
    }

    /// Process a batch; batch-level failures requeue every delivery
    pub async fn process_batch(&self, deliveries: &[Delivery]) -> BatchOutcome {
        match self.try_process_batch(deliveries).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    batch_size = deliveries.len(),
                    error = %e,
                    "Batch failed, requeueing every delivery"
                );
                BatchOutcome::requeue_all(deliveries.len(), e.to_string())
            }
        }
    }

    pub async fn try_process_batch(
        &self,
        deliveries: &[Delivery],
    ) -> Result<BatchOutcome, OrchestrationError> {
        let mut redelivered = HashSet::new();
        let referenced: Vec<Option<i64>> = deliveries
            .iter()
            .map(|delivery| match delivery.task_message() {
                Ok(message) if delivery.redelivered => {
                    redelivered.insert(message.task_id);
                    Some(message.task_id)
                }
                Ok(message) => Some(message.task_id),
                Err(e) => {
                    warn!(
                        delivery_tag = delivery.delivery_tag,
                        policy = %self.poison_policy,
                        error = %e,
                        "Malformed task message"
                    );
                    None
                }
            })
            .collect();

        let mut seen = HashSet::new();
        let task_ids: Vec<i64> = referenced
            .iter()
            .flatten()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let fetched = if task_ids.is_empty() {
            Vec::new()
        } else {
            self.store
                .get_tasks_by_ids(&task_ids)
                .await
                .map_err(OrchestrationError::BatchFetch)?
        };
        let originals: HashMap<i64, Task> = fetched
            .into_iter()
            .filter_map(|task| task.id().map(|id| (id, task)))
            .collect();

        for task_id in task_ids.iter().filter(|id| !originals.contains_key(*id)) {
            warn!(task_id, policy = %self.poison_policy, "Task not found");
        }

        let runs = task_ids
            .iter()
            .filter_map(|id| originals.get(id))
            .map(|task| {
                let resumable = task.id().is_some_and(|id| redelivered.contains(&id));
                self.run_isolated(task.clone(), resumable)
            });
        let results = join_all(runs).await;

        let changed: Vec<Task> = results
            .iter()
            .filter(|(_, _, outcome)| *outcome != TaskOutcome::Failed)
            .filter_map(|(task_id, task, _)| {
                let task = task.as_ref()?;
                let original = originals.get(task_id)?;
                (task.status() != original.status()).then(|| task.clone())
            })
            .collect();

        if !changed.is_empty() {
            self.write_back(&changed).await?;
        }

        let task_outcomes: BTreeMap<i64, TaskOutcome> = results
            .iter()
            .map(|(task_id, _, outcome)| (*task_id, *outcome))
            .collect();

        let poison = AckDecision::for_poison(self.poison_policy);
        let decisions = referenced
            .iter()
            .map(|task_id| {
                task_id
                    .and_then(|id| task_outcomes.get(&id))
                    .map(|outcome| AckDecision::for_outcome(*outcome))
                    .unwrap_or(poison)
            })
            .collect();

        let completed_task_ids = task_outcomes
            .iter()
            .filter(|(_, outcome)| **outcome == TaskOutcome::Completed)
            .map(|(task_id, _)| *task_id)
            .collect();

        Ok(BatchOutcome {
            decisions,
            completed_task_ids,
            task_outcomes,
            batch_error: None,
        })
    }

    /// Persist final statuses: the batch call under retry, then record by record
    async fn write_back(&self, changed: &[Task]) -> Result<(), OrchestrationError> {
        let batch_error = match self
            .write_back_retry
            .retry("update_tasks", || self.store.update_tasks(changed))
            .await
        {
            Ok(written) => {
                debug!(changed = changed.len(), written, "Batch write-back complete");
                return Ok(());
            }
            Err(e) => e,
        };

        warn!(
            changed = changed.len(),
            error = %batch_error,
            "Batch write-back exhausted, writing tasks individually"
        );
        for task in changed {
            self.store
                .update_task(task)
                .await
                .map_err(OrchestrationError::BatchWriteBack)?;
        }
        info!(changed = changed.len(), "Individual write-back complete");
        Ok(())
    }

    /// Run one task, converting a panic into a counted failure
    async fn run_isolated(
        &self,
        mut task: Task,
        redelivered: bool,
    ) -> (i64, Option<Task>, TaskOutcome) {
        let task_id = task.id().unwrap_or_default();
        let processor = &self.processor;

        let result = AssertUnwindSafe(async move {
            let outcome = processor.process(&mut task, redelivered).await;
            (task, outcome)
        })
        .catch_unwind()
        .await;

        match result {
            Ok((task, outcome)) => (task_id, Some(task), outcome),
            Err(panic) => {
                self.metrics.increment(MetricLabel::Failed);
                error!(task_id, panic = %panic_message(&*panic), "Task processing panicked");
                (task_id, None, TaskOutcome::Failed)
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Apply `outcome` to `deliveries` one delivery at a time
///
/// Broker errors are logged and counted; settling never stops early.
pub async fn settle_batch(
    client: &dyn QueueClient,
    deliveries: &[Delivery],
    outcome: &BatchOutcome,
) -> SettleSummary {
    let mut summary = SettleSummary::default();

    for (index, delivery) in deliveries.iter().enumerate() {
        let decision = outcome
            .decisions
            .get(index)
            .copied()
            .unwrap_or(AckDecision::Requeue);

        let result = match decision {
            AckDecision::Acknowledge => client.acknowledge(delivery).await,
            AckDecision::Requeue => client.reject(delivery, true).await,
            AckDecision::Reject => client.reject(delivery, false).await,
        };

        match result {
            Ok(()) => match decision {
                AckDecision::Acknowledge => summary.acknowledged += 1,
                AckDecision::Requeue => summary.requeued += 1,
                AckDecision::Reject => summary.rejected += 1,
            },
            Err(e) => {
                summary.failures += 1;
                warn!(
                    delivery_tag = delivery.delivery_tag,
                    decision = %decision,
                    error = %e,
                    "Failed to settle delivery"
                );
            }
        }
    }

    info!(
        batch_size = deliveries.len(),
        acknowledged = summary.acknowledged,
        requeued = summary.requeued,
        rejected = summary.rejected,
        failures = summary.failures,
        "Batch settled"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_mapping() {
        assert_eq!(
            AckDecision::for_outcome(TaskOutcome::Completed),
            AckDecision::Acknowledge
        );
        assert_eq!(
            AckDecision::for_outcome(TaskOutcome::Skipped),
            AckDecision::Acknowledge
        );
        assert_eq!(
            AckDecision::for_outcome(TaskOutcome::Failed),
            AckDecision::Requeue
        );
        assert_eq!(
            AckDecision::for_poison(PoisonMessagePolicy::Reject),
            AckDecision::Reject
        );
        assert_eq!(
            AckDecision::for_poison(PoisonMessagePolicy::Acknowledge),
            AckDecision::Acknowledge
        );
    }

    #[test]
    fn test_requeue_all() {
        let outcome = BatchOutcome::requeue_all(3, "store down");
        assert_eq!(outcome.count(AckDecision::Requeue), 3);
        assert!(outcome.completed_task_ids.is_empty());
        assert_eq!(outcome.batch_error.as_deref(), Some("store down"));
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*boxed), "bang");
    }
}
