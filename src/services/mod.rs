//! # Services
//!
//! Caller-facing operations built on the store, the cancellation cache and
//! the publisher.

pub mod task_service;

pub use task_service::TaskService;
