use super::{events::TaskEvent, states::TaskStatus};
use thiserror::Error;

/// Errors raised by the task lifecycle engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("Illegal transition: cannot {event} a task in status {from}")]
    IllegalTransition { event: TaskEvent, from: TaskStatus },
}

impl StateMachineError {
    pub fn illegal_transition(event: TaskEvent, from: TaskStatus) -> Self {
        Self::IllegalTransition { event, from }
    }

    /// Status the task was in when the transition was refused
    pub fn current_status(&self) -> TaskStatus {
        match self {
            Self::IllegalTransition { from, .. } => *from,
        }
    }
}

/// Result type alias for state machine operations
pub type StateMachineResult<T> = Result<T, StateMachineError>;
