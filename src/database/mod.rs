//! # Task Store
//!
//! Durable storage of task records.
//!
//! ## Key Components
//!
//! - [`TaskStore`] - single-record and batch CRUD used by the consumer and the task service
//! - [`PgTaskStore`] - PostgreSQL implementation over a `sqlx` pool
//! - [`InMemoryTaskStore`] - process-local implementation with failure injection for tests
//!
//! Batch operations exist so a consumer touches the store a bounded number of
//! times per batch: one read for every referenced task and one write-back.

pub mod errors;
pub mod in_memory;
pub mod postgres;

use crate::models::Task;
use async_trait::async_trait;

pub use errors::{StoreError, StoreResult};
pub use in_memory::InMemoryTaskStore;
pub use postgres::PgTaskStore;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task, returning it with its assigned id
    async fn create_task(&self, task: &Task) -> StoreResult<Task>;

    /// Fetch one task, `StoreError::NotFound` when absent
    async fn get_task(&self, task_id: i64) -> StoreResult<Task>;

    /// Write back the status of one persisted task
    async fn update_task(&self, task: &Task) -> StoreResult<()>;

    /// Fetch every task whose id is in `task_ids`; unknown ids are omitted
    async fn get_tasks_by_ids(&self, task_ids: &[i64]) -> StoreResult<Vec<Task>>;

    /// Write back the status of several persisted tasks in one call
    async fn update_tasks(&self, tasks: &[Task]) -> StoreResult<u64>;

    async fn health_check(&self) -> StoreResult<()>;

    fn provider_name(&self) -> &'static str;
}
