//! In-memory task store
//!
//! Process-local `TaskStore` for tests and local runs. Every status write is
//! recorded so callers can inspect the sequence of statuses a task went
//! through, and reads or writes can be made to fail on demand.

use super::{StoreError, StoreResult, TaskStore};
use crate::models::Task;
use crate::state_machine::TaskStatus;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<i64, Task>,
    next_id: AtomicI64,
    status_writes: Mutex<Vec<(i64, TaskStatus)>>,
    batch_reads: AtomicU64,
    batch_writes: AtomicU64,
    fail_batch_reads: AtomicBool,
    fail_batch_updates: AtomicBool,
    fail_single_updates: AtomicBool,
    unhealthy: AtomicBool,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task with an explicit id, replacing any existing record
    pub fn insert(&self, task_id: i64, payload: &str, status: TaskStatus) -> Task {
        let task = Task::from_parts(task_id, payload.to_string(), status, chrono::Utc::now());
        self.tasks.insert(task_id, task.clone());
        self.next_id.fetch_max(task_id, Ordering::SeqCst);
        task
    }

    /// Current status of a stored task
    pub fn status_of(&self, task_id: i64) -> Option<TaskStatus> {
        self.tasks.get(&task_id).map(|task| task.status())
    }

    /// Every status written for `task_id`, in write order
    pub fn status_history(&self, task_id: i64) -> Vec<TaskStatus> {
        self.status_writes
            .lock()
            .iter()
            .filter(|(id, _)| *id == task_id)
            .map(|(_, status)| *status)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn batch_read_count(&self) -> u64 {
        self.batch_reads.load(Ordering::SeqCst)
    }

    pub fn batch_write_count(&self) -> u64 {
        self.batch_writes.load(Ordering::SeqCst)
    }

    pub fn set_fail_batch_reads(&self, fail: bool) {
        self.fail_batch_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_batch_updates(&self, fail: bool) {
        self.fail_batch_updates.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_single_updates(&self, fail: bool) {
        self.fail_single_updates.store(fail, Ordering::SeqCst);
    }

    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy.store(unhealthy, Ordering::SeqCst);
    }

    fn write_status(&self, task: &Task) -> StoreResult<()> {
        let task_id = task.id().ok_or(StoreError::MissingId)?;
        let mut stored = self
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| StoreError::not_found(task_id))?;
        *stored = task.clone();
        self.status_writes.lock().push((task_id, task.status()));
        Ok(())
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(&self, task: &Task) -> StoreResult<Task> {
        let task_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let created = task.clone().with_id(task_id);
        self.tasks.insert(task_id, created.clone());
        self.status_writes.lock().push((task_id, created.status()));
        Ok(created)
    }

    async fn get_task(&self, task_id: i64) -> StoreResult<Task> {
        self.tasks
            .get(&task_id)
            .map(|task| task.clone())
            .ok_or_else(|| StoreError::not_found(task_id))
    }

    async fn update_task(&self, task: &Task) -> StoreResult<()> {
        if self.fail_single_updates.load(Ordering::SeqCst) {
            return Err(StoreError::query("update_task", "injected failure"));
        }
        self.write_status(task)
    }

    async fn get_tasks_by_ids(&self, task_ids: &[i64]) -> StoreResult<Vec<Task>> {
        self.batch_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_batch_reads.load(Ordering::SeqCst) {
            return Err(StoreError::query("get_tasks_by_ids", "injected failure"));
        }

        let mut seen = std::collections::HashSet::new();
        Ok(task_ids
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| self.tasks.get(id).map(|task| task.clone()))
            .collect())
    }

    async fn update_tasks(&self, tasks: &[Task]) -> StoreResult<u64> {
        self.batch_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_batch_updates.load(Ordering::SeqCst) {
            return Err(StoreError::query("update_tasks", "injected failure"));
        }

        let mut updated = 0;
        for task in tasks {
            match self.write_status(task) {
                Ok(()) => updated += 1,
                Err(StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(updated)
    }

    async fn health_check(&self) -> StoreResult<()> {
        if self.unhealthy.load(Ordering::SeqCst) {
            return Err(StoreError::connection("store marked unhealthy"));
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let store = InMemoryTaskStore::new();
        let a = store.create_task(&Task::new("a").unwrap()).await.unwrap();
        let b = store.create_task(&Task::new("b").unwrap()).await.unwrap();
        assert_eq!(a.id(), Some(1));
        assert_eq!(b.id(), Some(2));
        assert_eq!(store.get_task(2).await.unwrap().payload(), "b");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = InMemoryTaskStore::new();
        let err = store.get_task(42).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { task_id: 42 }));
    }

    #[tokio::test]
    async fn test_batch_read_skips_unknown_and_duplicates() {
        let store = InMemoryTaskStore::new();
        store.insert(1, "a", TaskStatus::Pending);
        store.insert(2, "b", TaskStatus::Completed);

        let tasks = store.get_tasks_by_ids(&[1, 2, 2, 99]).await.unwrap();
        let ids: Vec<_> = tasks.iter().filter_map(Task::id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(store.batch_read_count(), 1);
    }

    #[tokio::test]
    async fn test_batch_update_records_history() {
        let store = InMemoryTaskStore::new();
        let mut task = store.insert(5, "a", TaskStatus::Pending);
        task.mark_processing().unwrap();
        store.update_task(&task).await.unwrap();
        task.mark_completed().unwrap();
        assert_eq!(store.update_tasks(&[task]).await.unwrap(), 1);

        assert_eq!(
            store.status_history(5),
            vec![TaskStatus::Processing, TaskStatus::Completed]
        );
        assert_eq!(store.status_of(5), Some(TaskStatus::Completed));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemoryTaskStore::new();
        let task = store.insert(1, "a", TaskStatus::Pending);

        store.set_fail_batch_updates(true);
        assert!(store.update_tasks(&[task.clone()]).await.is_err());
        store.set_fail_batch_reads(true);
        assert!(store.get_tasks_by_ids(&[1]).await.is_err());
        store.set_unhealthy(true);
        assert!(store.health_check().await.is_err());

        let unsaved = Task::new("x").unwrap();
        assert!(matches!(
            store.update_task(&unsaved).await,
            Err(StoreError::MissingId)
        ));
    }
}
