//! # Unit of Work
//!
//! The work a consumer performs for a task between `PROCESSING` and
//! `COMPLETED`. Payloads are opaque; the default implementation only waits.

use crate::models::Task;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unit of work failed for task {task_id}: {message}")]
pub struct WorkError {
    pub task_id: i64,
    pub message: String,
}

impl WorkError {
    pub fn new(task_id: i64, message: impl Into<String>) -> Self {
        Self {
            task_id,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn perform(&self, task: &Task) -> Result<(), WorkError>;
}

/// Stand-in work that sleeps for a fixed delay
#[derive(Debug, Clone)]
pub struct SimulatedWork {
    delay: Duration,
}

impl SimulatedWork {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for SimulatedWork {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl UnitOfWork for SimulatedWork {
    async fn perform(&self, task: &Task) -> Result<(), WorkError> {
        debug!(task_id = ?task.id(), delay_ms = self.delay.as_millis() as u64, "Simulating work");
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_simulated_work_waits_for_delay() {
        let work = SimulatedWork::new(Duration::from_secs(5));
        let task = Task::new("payload").unwrap();

        let started = tokio::time::Instant::now();
        work.perform(&task).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
