//! # Task Service
//!
//! Producer-side operations: create a task and enqueue it, cancel a task,
//! look up its status.
//!
//! Cancellation writes the task store first and the cancellation flag second.
//! The store is authoritative, so a failed flag write is logged and the
//! cancellation still succeeds; a consumer that already holds the task will
//! then finish it without noticing.
//!
//! ```rust
//! use std::sync::Arc;
//! use taskrelay_core::cache::InMemoryCancellationCache;
//! use taskrelay_core::database::InMemoryTaskStore;
//! use taskrelay_core::messaging::InMemoryQueueClient;
//! use taskrelay_core::services::TaskService;
//! use taskrelay_core::state_machine::TaskStatus;
//!
//! # tokio_test::block_on(async {
//! let service = TaskService::new(
//!     Arc::new(InMemoryTaskStore::new()),
//!     Arc::new(InMemoryCancellationCache::default()),
//!     Arc::new(InMemoryQueueClient::new("tasks", 10)),
//! );
//!
//! let task = service.create_task("resize image 42").await?;
//! let cancelled = service.cancel_task(task.id().unwrap_or_default()).await?;
//! assert_eq!(cancelled.status(), TaskStatus::Canceled);
//! # Ok::<(), taskrelay_core::TaskRelayError>(())
//! # }).unwrap();
//! ```

use crate::cache::CancellationFlagStore;
use crate::database::{StoreError, TaskStore};
use crate::error::Result;
use crate::logging::log_task_operation;
use crate::messaging::{TaskMessage, TaskPublisher};
use crate::models::Task;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    cancellations: Arc<dyn CancellationFlagStore>,
    publisher: Arc<dyn TaskPublisher>,
}

impl std::fmt::Debug for TaskService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskService")
            .field("store", &self.store.provider_name())
            .field("cancellations", &self.cancellations.provider_name())
            .finish()
    }
}

impl TaskService {
    pub fn new(
        store: Arc<dyn TaskStore>,
        cancellations: Arc<dyn CancellationFlagStore>,
        publisher: Arc<dyn TaskPublisher>,
    ) -> Self {
        Self {
            store,
            cancellations,
            publisher,
        }
    }

    /// Persist a new `PENDING` task and publish it for consumption
    ///
    /// If publishing fails after all retries the task stays `PENDING` in the
    /// store and the error is returned.
    pub async fn create_task(&self, payload: &str) -> Result<Task> {
        let task = Task::new(payload)?;
        let task = self.store.create_task(&task).await?;
        let task_id = task.id().ok_or(StoreError::MissingId)?;

        let message = TaskMessage::new(task_id, task.payload());
        self.publisher.publish(&message).await?;

        log_task_operation("create", Some(task_id), &task.status().to_string(), None);
        Ok(task)
    }

    pub async fn cancel_task(&self, task_id: i64) -> Result<Task> {
        let mut task = self.store.get_task(task_id).await?;
        task.cancel()?;
        self.store.update_task(&task).await?;

        if let Err(e) = self.cancellations.set_cancelled(task_id).await {
            warn!(task_id, error = %e, "Task cancelled in store but cancellation flag was not set");
        }

        info!(task_id, "Task cancelled");
        log_task_operation("cancel", Some(task_id), &task.status().to_string(), None);
        Ok(task)
    }

    pub async fn get_task(&self, task_id: i64) -> Result<Task> {
        Ok(self.store.get_task(task_id).await?)
    }
}
