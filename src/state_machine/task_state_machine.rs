use super::{
    errors::{StateMachineError, StateMachineResult},
    events::TaskEvent,
    states::TaskStatus,
};
use tracing::warn;

/// Stateless transition table for the task lifecycle
///
/// ```text
/// PENDING    --mark_processing--> PROCESSING
/// PROCESSING --mark_completed-->  COMPLETED
/// PENDING | PROCESSING --cancel--> CANCELED
/// ```
///
/// Both the consumer and the cancel API go through this table, so an illegal
/// transition is refused no matter which side attempts it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskStateMachine;

impl TaskStateMachine {
    /// Determine the target status for `event`, or refuse the transition
    pub fn determine_target_state(
        current: TaskStatus,
        event: TaskEvent,
    ) -> StateMachineResult<TaskStatus> {
        use TaskEvent::*;
        use TaskStatus::*;

        let target = match (current, event) {
            (Pending, MarkProcessing) => Processing,
            (Processing, MarkCompleted) => Completed,
            (Pending | Processing, Cancel) => Canceled,
            (from, event) => {
                warn!(
                    event = %event,
                    status = %from,
                    "Refusing illegal task transition"
                );
                return Err(StateMachineError::illegal_transition(event, from));
            }
        };

        Ok(target)
    }

    /// Check whether `event` is legal from `current` without logging
    pub fn can_transition(current: TaskStatus, event: TaskEvent) -> bool {
        matches!(
            (current, event),
            (TaskStatus::Pending, TaskEvent::MarkProcessing)
                | (TaskStatus::Processing, TaskEvent::MarkCompleted)
                | (TaskStatus::Pending | TaskStatus::Processing, TaskEvent::Cancel)
        )
    }
}
