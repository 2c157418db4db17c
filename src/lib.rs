#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, RabbitMQ in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # TaskRelay Core
//!
//! Batched consumption and execution of queued tasks.
//!
//! ## Overview
//!
//! A producer persists a task and publishes its id to RabbitMQ. Consumers pull
//! messages, group them into size-or-timeout batches, fetch every referenced
//! task from PostgreSQL in one query, run the tasks of a batch concurrently,
//! write the results back in one query and acknowledge or requeue each message.
//! Cancellation is signalled to in-flight consumers through a Redis flag.
//!
//! ## Module Organization
//!
//! - [`models`] - the task record
//! - [`state_machine`] - the four-state task lifecycle
//! - [`database`] - task store (PostgreSQL and in-memory)
//! - [`cache`] - cancellation flags (Redis and in-memory)
//! - [`messaging`] - broker client, publisher, message codec and batcher
//! - [`orchestration`] - per-task procedure, batch orchestrator and consumer loop
//! - [`services`] - create / cancel / lookup for callers
//! - [`metrics`] - counters and duration histograms
//! - [`health`] - dependency health reports
//! - [`web`] - HTTP health endpoint for a running consumer
//! - [`config`] - layered configuration
//! - [`logging`] - structured logging setup
//! - [`resilience`] - bounded retry policies
//! - [`error`] - crate-level error type
//!
//! ## Testing
//!
//! Every external dependency has an in-memory implementation, so the
//! orchestration paths are tested without running services:
//!
//! ```bash
//! cargo test                       # unit and integration tests
//! cargo test -- --ignored          # live PostgreSQL / RabbitMQ / Redis tests
//! ```

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod orchestration;
pub mod resilience;
pub mod services;
pub mod state_machine;
pub mod web;

pub use config::{ConfigManager, PoisonMessagePolicy, RelayConfig};
pub use error::{Result, TaskRelayError};
pub use health::{HealthChecker, HealthReport, HealthStatus};
pub use models::Task;
pub use orchestration::{TaskConsumer, TaskExecutionOrchestrator};
pub use services::TaskService;
pub use state_machine::TaskStatus;
