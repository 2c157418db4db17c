//! # Task Orchestration
//!
//! Batched consumption and execution of tasks.
//!
//! ## Core Components
//!
//! - **TaskConsumer**: connects to the broker, batches deliveries and settles them
//! - **TaskExecutionOrchestrator**: one batch in, one ack decision per delivery out
//! - **TaskProcessor**: the per-task lifecycle (cancellation checks, work, metrics)
//! - **UnitOfWork**: the pluggable work performed for a task
//!
//! ## Flow
//!
//! ```text
//! broker -> batcher -> batch fetch -> per-task (concurrent) -> write-back -> ack/nack
//! ```

pub mod batch_orchestrator;
pub mod consumer;
pub mod task_processor;
pub mod work;

pub use crate::config::PoisonMessagePolicy;
pub use batch_orchestrator::{
    settle_batch, AckDecision, BatchOutcome, OrchestrationError, SettleSummary,
    TaskExecutionOrchestrator,
};
pub use consumer::{ConsumerStats, ConsumerStatsSnapshot, TaskConsumer};
pub use task_processor::{TaskOutcome, TaskProcessingError, TaskProcessor};
pub use work::{SimulatedWork, UnitOfWork, WorkError};
