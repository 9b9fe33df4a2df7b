//! Pure transition logic shared by the live state machine and ledger replay.
//!
//! Keeping the per-action state computation side-effect free is what makes
//! the flow ledger replayable: folding `apply_action` over an instance's
//! entries must land on exactly the persisted (step, status, assignee).

use crate::error::{FlowError, FlowResult};
use crate::models::flow::{EventType, FlowEntry, InstanceAction};
use crate::models::process::ProcessDefinition;
use crate::state_machine::states::InstanceStatus;

/// Result of applying one action at one step
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub to_step: Option<String>,
    pub to_status: InstanceStatus,
    pub to_assignee: Option<String>,
    pub event_type: EventType,
}

/// Compute the target state for an action without touching storage.
///
/// Assignee policy: approving out of a step clears the assignee (the next
/// step is owned by its required role until someone transfers or acts);
/// reject/revoke/cancel freeze both the step and the assignee.
pub fn apply_action(
    definition: &ProcessDefinition,
    current_step: &str,
    status: InstanceStatus,
    assignee: Option<&str>,
    action: InstanceAction,
    target_user: Option<&str>,
) -> FlowResult<TransitionOutcome> {
    if status.is_terminal() {
        return Err(FlowError::InvalidState(format!(
            "instance is terminal ({status}); no further actions allowed"
        )));
    }

    let step = definition.step(current_step).ok_or_else(|| {
        FlowError::InvalidState(format!(
            "step {current_step} is not part of process {} v{}",
            definition.process_id, definition.version
        ))
    })?;

    let outcome = match action {
        InstanceAction::Submit => {
            return Err(FlowError::InvalidState(
                "submit is not a ticket action; use instance submission".to_string(),
            ))
        }
        InstanceAction::Approve => {
            if definition.is_final_step(&step.step_id) {
                TransitionOutcome {
                    to_step: Some(step.step_id.clone()),
                    to_status: InstanceStatus::Completed,
                    to_assignee: None,
                    event_type: EventType::Completed,
                }
            } else {
                // next_step_after cannot miss: the step was just looked up
                // and is not final
                let next = definition.next_step_after(&step.step_id).ok_or_else(|| {
                    FlowError::InvalidState(format!("no step after {}", step.step_id))
                })?;
                TransitionOutcome {
                    to_step: Some(next.step_id.clone()),
                    to_status: InstanceStatus::Processing,
                    to_assignee: None,
                    event_type: EventType::Approved,
                }
            }
        }
        InstanceAction::Reject => TransitionOutcome {
            to_step: Some(step.step_id.clone()),
            to_status: InstanceStatus::Rejected,
            to_assignee: assignee.map(str::to_string),
            event_type: EventType::Rejected,
        },
        InstanceAction::Transfer => {
            let target = target_user.ok_or_else(|| {
                FlowError::InvalidState("transfer requires a target user".to_string())
            })?;
            TransitionOutcome {
                to_step: Some(step.step_id.clone()),
                to_status: status,
                to_assignee: Some(target.to_string()),
                event_type: EventType::Transferred,
            }
        }
        InstanceAction::Revoke | InstanceAction::Cancel => TransitionOutcome {
            to_step: Some(step.step_id.clone()),
            to_status: InstanceStatus::Cancelled,
            to_assignee: assignee.map(str::to_string),
            event_type: EventType::Cancelled,
        },
    };

    Ok(outcome)
}

/// Instance state reconstructed from the flow ledger
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayedState {
    pub current_step_id: Option<String>,
    pub status: InstanceStatus,
    pub assignee: Option<String>,
}

/// Replay an instance's ordered flow entries from its initial submission.
///
/// The first entry must be the submission record; every later entry is
/// re-applied through the same pure transition function the live machine
/// uses.
pub fn replay(definition: &ProcessDefinition, entries: &[FlowEntry]) -> FlowResult<ReplayedState> {
    let first = entries.first().ok_or_else(|| {
        FlowError::InvalidState("cannot replay an empty flow ledger".to_string())
    })?;

    if first.action != InstanceAction::Submit {
        return Err(FlowError::InvalidState(format!(
            "ledger does not start with a submission (found {})",
            first.action
        )));
    }

    let first_step = definition
        .first_step()
        .ok_or_else(|| FlowError::InvalidDefinition("definition has no steps".to_string()))?;

    let mut state = ReplayedState {
        current_step_id: Some(first_step.step_id.clone()),
        status: InstanceStatus::Draft,
        assignee: None,
    };

    for entry in &entries[1..] {
        let current_step = state.current_step_id.as_deref().ok_or_else(|| {
            FlowError::InvalidState("ledger continues past an unset step".to_string())
        })?;

        let outcome = apply_action(
            definition,
            current_step,
            state.status,
            state.assignee.as_deref(),
            entry.action,
            entry.target_user.as_deref(),
        )?;

        state.current_step_id = outcome.to_step;
        state.status = outcome.to_status;
        state.assignee = outcome.to_assignee;
    }

    Ok(state)
}
