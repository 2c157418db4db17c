use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use taskrelay_core::cache::{CancellationFlagStore, InMemoryCancellationCache};
use taskrelay_core::database::InMemoryTaskStore;
use taskrelay_core::models::Task;
use taskrelay_core::orchestration::{UnitOfWork, WorkError};

/// Unit of work with per-task scripted behaviour
#[derive(Default)]
pub struct ScriptedWork {
    pub delay: Duration,
    pub panic_on: HashSet<i64>,
    pub fail_on: HashSet<i64>,
    /// Fail the first attempt for these ids only
    pub fail_once: Mutex<HashSet<i64>>,
    /// Set the cancellation flag for these ids while their work runs
    pub cancel_during: HashSet<i64>,
    pub cache: Option<Arc<InMemoryCancellationCache>>,
}

impl ScriptedWork {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn panicking(mut self, task_id: i64) -> Self {
        self.panic_on.insert(task_id);
        self
    }

    pub fn failing(mut self, task_id: i64) -> Self {
        self.fail_on.insert(task_id);
        self
    }

    pub fn failing_once(self, task_id: i64) -> Self {
        self.fail_once.lock().insert(task_id);
        self
    }

    pub fn cancelling(mut self, task_id: i64, cache: Arc<InMemoryCancellationCache>) -> Self {
        self.cancel_during.insert(task_id);
        self.cache = Some(cache);
        self
    }
}

#[async_trait]
impl UnitOfWork for ScriptedWork {
    async fn perform(&self, task: &Task) -> Result<(), WorkError> {
        let task_id = task.id().unwrap_or_default();
        tokio::time::sleep(self.delay).await;

        if self.panic_on.contains(&task_id) {
            panic!("work for task {task_id} panicked");
        }
        if self.fail_on.contains(&task_id) || self.fail_once.lock().remove(&task_id) {
            return Err(WorkError::new(task_id, "scripted failure"));
        }
        if self.cancel_during.contains(&task_id) {
            if let Some(cache) = &self.cache {
                cache.set_cancelled(task_id).await.unwrap();
            }
        }
        Ok(())
    }
}

/// Unit of work during which every store write starts failing
pub struct StoreOutage {
    pub delay: Duration,
    pub store: Arc<InMemoryTaskStore>,
}

impl StoreOutage {
    pub fn new(delay: Duration, store: Arc<InMemoryTaskStore>) -> Self {
        Self { delay, store }
    }
}

#[async_trait]
impl UnitOfWork for StoreOutage {
    async fn perform(&self, _task: &Task) -> Result<(), WorkError> {
        tokio::time::sleep(self.delay).await;
        self.store.set_fail_batch_updates(true);
        self.store.set_fail_single_updates(true);
        Ok(())
    }
}
