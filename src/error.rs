//! Error types for the task relay.
//!
//! Component errors (`StoreError`, `CacheError`, `MessagingError`, ...) stay
//! specific to their module; [`TaskRelayError`] is what the service layer and
//! the binaries see.

use crate::cache::CacheError;
use crate::config::ConfigurationError;
use crate::database::StoreError;
use crate::messaging::MessagingError;
use crate::models::InvalidPayload;
use crate::orchestration::OrchestrationError;
use crate::state_machine::StateMachineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskRelayError {
    #[error("Validation error: {0}")]
    Validation(#[from] InvalidPayload),

    #[error("Task {task_id} not found")]
    NotFound { task_id: i64 },

    #[error(transparent)]
    IllegalTransition(#[from] StateMachineError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),
}

impl From<StoreError> for TaskRelayError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { task_id } => Self::NotFound { task_id },
            other => Self::Store(other),
        }
    }
}

impl TaskRelayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for errors caused by the caller's input rather than infrastructure
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NotFound { .. } | Self::IllegalTransition(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TaskRelayError>;
