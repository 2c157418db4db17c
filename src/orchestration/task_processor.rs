//! # Task Processor
//!
//! The per-task procedure run by the consumer for every task in a batch:
//!
//! 1. count the task as `received`
//! 2. anything other than `PENDING` is skipped (redelivery of a settled task)
//! 3. a cancellation flag set before work starts cancels the task
//! 4. `PENDING -> PROCESSING`, persisted immediately
//! 5. perform the unit of work
//! 6. a cancellation flag set during work cancels the task
//! 7. `PROCESSING -> COMPLETED`, with duration metrics and a `success` count
//!
//! A task already in `PROCESSING` is resumed instead of skipped when its
//! message was redelivered: an earlier attempt persisted step 4 and then
//! failed before the final status was written, and the broker handed the
//! message back. Step 4 is not repeated.
//!
//! The final status is left on the in-memory copy for the batch write-back.
//! Errors never escape [`TaskProcessor::process`]; they are counted as
//! `failed` and reported as [`TaskOutcome::Failed`].

use super::work::{UnitOfWork, WorkError};
use crate::cache::{CacheError, CancellationFlagStore};
use crate::database::{StoreError, TaskStore};
use crate::metrics::{MetricLabel, MetricsSink};
use crate::models::Task;
use crate::state_machine::{StateMachineError, TaskStatus};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Result of running the per-task procedure once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed,
    Cancelled,
    /// Task was not `PENDING` (nor a redelivered `PROCESSING` task); nothing was done
    Skipped,
    Failed,
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        };
        f.write_str(value)
    }
}

#[derive(Error, Debug)]
pub enum TaskProcessingError {
    #[error(transparent)]
    IllegalTransition(#[from] StateMachineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Work(#[from] WorkError),
}

#[derive(Clone)]
pub struct TaskProcessor {
    store: Arc<dyn TaskStore>,
    cancellations: Arc<dyn CancellationFlagStore>,
    metrics: Arc<dyn MetricsSink>,
    work: Arc<dyn UnitOfWork>,
}

impl fmt::Debug for TaskProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskProcessor")
            .field("store", &self.store.provider_name())
            .field("cancellations", &self.cancellations.provider_name())
            .finish()
    }
}

impl TaskProcessor {
    pub fn new(
        store: Arc<dyn TaskStore>,
        cancellations: Arc<dyn CancellationFlagStore>,
        metrics: Arc<dyn MetricsSink>,
        work: Arc<dyn UnitOfWork>,
    ) -> Self {
        Self {
            store,
            cancellations,
            metrics,
            work,
        }
    }

    /// Run the procedure, turning any error into a counted failure
    ///
    /// `redelivered` allows a task left in `PROCESSING` by a failed earlier
    /// attempt to be resumed.
    pub async fn process(&self, task: &mut Task, redelivered: bool) -> TaskOutcome {
        match self.try_process(task, redelivered).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.metrics.increment(MetricLabel::Failed);
                error!(task_id = ?task.id(), status = %task.status(), error = %e, "Task processing failed");
                TaskOutcome::Failed
            }
        }
    }

    pub async fn try_process(
        &self,
        task: &mut Task,
        redelivered: bool,
    ) -> Result<TaskOutcome, TaskProcessingError> {
        self.metrics.increment(MetricLabel::Received);
        let task_id = task.id().ok_or(StoreError::MissingId)?;

        let resuming = match task.status() {
            TaskStatus::Pending => false,
            TaskStatus::Processing if redelivered => true,
            status => {
                debug!(task_id, %status, redelivered, "Skipping task that is not pending");
                return Ok(TaskOutcome::Skipped);
            }
        };

        if self.cancellations.is_cancelled(task_id).await? {
            task.cancel()?;
            info!(task_id, "Task cancelled before processing");
            return Ok(TaskOutcome::Cancelled);
        }

        if resuming {
            info!(task_id, "Resuming redelivered task left in PROCESSING");
        } else {
            task.mark_processing()?;
            self.store.update_task(task).await?;
        }

        let started = Instant::now();
        self.work.perform(task).await?;
        let processing_duration = started.elapsed();

        if self.cancellations.is_cancelled(task_id).await? {
            task.cancel()?;
            info!(task_id, "Task cancelled during processing");
            return Ok(TaskOutcome::Cancelled);
        }

        task.mark_completed()?;
        self.metrics.observe_processing_duration(processing_duration);
        self.metrics.observe_execution_duration(task.age());
        self.metrics.increment(MetricLabel::Success);

        debug!(
            task_id,
            processing_ms = processing_duration.as_millis() as u64,
            "Task completed"
        );
        Ok(TaskOutcome::Completed)
    }
}
