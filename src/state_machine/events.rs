use serde::{Deserialize, Serialize};
use std::fmt;

/// Events that can trigger task status transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEvent {
    /// A consumer starts working on the task
    MarkProcessing,
    /// The consumer finished the task's work
    MarkCompleted,
    /// Cancel the task, from the API or via the cancellation flag
    Cancel,
}

impl TaskEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MarkProcessing => "mark_processing",
            Self::MarkCompleted => "mark_completed",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for TaskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}
