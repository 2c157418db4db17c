//! # Cancellation Flag Store
//!
//! A time-limited "this task was cancelled" marker per task id. The task store
//! stays authoritative; the flag only lets an in-flight consumer notice a
//! cancellation without re-reading the task record.
//!
//! Absence of a flag means "not cancelled". Flags expire after a fixed TTL.

pub mod errors;
pub mod in_memory;
pub mod redis;

use async_trait::async_trait;

pub use errors::{CacheError, CacheResult};
pub use in_memory::InMemoryCancellationCache;
pub use self::redis::RedisCancellationCache;

/// Cache key for a task's cancellation flag
pub fn cancellation_key(task_id: i64) -> String {
    format!("task:{task_id}:cancel")
}

#[async_trait]
pub trait CancellationFlagStore: Send + Sync {
    /// Mark `task_id` as cancelled for the configured TTL
    async fn set_cancelled(&self, task_id: i64) -> CacheResult<()>;

    async fn is_cancelled(&self, task_id: i64) -> CacheResult<bool>;

    async fn health_check(&self) -> CacheResult<()>;

    fn provider_name(&self) -> &'static str;
}
