// State machine module for the workorder lifecycle.
//
// Instances move through a process definition's ordered steps under
// role-gated actions. Transitions are validated here, persisted atomically
// with their flow ledger entry, and emit exactly one flow event.

pub mod machine;
pub mod states;
pub mod transition;

// Re-export main types for convenient access
pub use machine::{ActionRequest, FlowEventSink, NullEventSink, SubmitRequest, WorkorderStateMachine};
pub use states::InstanceStatus;
pub use transition::{apply_action, replay, ReplayedState, TransitionOutcome};
