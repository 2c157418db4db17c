//! # Task Store Error Types

use thiserror::Error;

/// Errors raised by a [`TaskStore`](super::TaskStore) implementation
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database connection error: {message}")]
    Connection { message: String },

    #[error("Database query error: {operation}: {message}")]
    Query { operation: String, message: String },

    #[error("Task not found: {task_id}")]
    NotFound { task_id: i64 },

    #[error("Task has not been persisted and has no id")]
    MissingId,

    #[error("Failed to decode task row: {message}")]
    Decode { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },
}

impl StoreError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn query(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Query {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn not_found(task_id: i64) -> Self {
        Self::NotFound { task_id }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn migration(message: impl ToString) -> Self {
        Self::Migration {
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
