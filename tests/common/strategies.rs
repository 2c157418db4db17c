use proptest::prelude::*;
use taskrelay_core::state_machine::TaskEvent;

pub fn task_event_strategy() -> impl Strategy<Value = TaskEvent> {
    prop_oneof![
        Just(TaskEvent::MarkProcessing),
        Just(TaskEvent::MarkCompleted),
        Just(TaskEvent::Cancel),
    ]
}

pub fn event_sequence_strategy() -> impl Strategy<Value = Vec<TaskEvent>> {
    prop::collection::vec(task_event_strategy(), 0..12)
}

/// Payloads that pass validation
pub fn payload_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _-]{0,32}[a-zA-Z0-9]"
}

pub fn blank_payload_strategy() -> impl Strategy<Value = String> {
    "[ \t\n]{0,8}"
}
