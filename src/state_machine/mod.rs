// Task lifecycle engine
//
// A four-state, forward-only machine shared by the consumer pipeline and the
// create/cancel service. Transitions are pure; persistence is the caller's job.

pub mod errors;
pub mod events;
pub mod states;
pub mod task_state_machine;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::TaskEvent;
pub use states::TaskStatus;
pub use task_state_machine::TaskStateMachine;
