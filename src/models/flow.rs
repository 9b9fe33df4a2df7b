//! Flow ledger records and the events they emit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::models::instance::Priority;
use crate::state_machine::states::InstanceStatus;

/// Actions an operator can take on an instance.
///
/// `Submit` is recorded only by instance creation; `act` rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceAction {
    Submit,
    Approve,
    Reject,
    Transfer,
    Revoke,
    Cancel,
}

impl fmt::Display for InstanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submit => write!(f, "submit"),
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
            Self::Transfer => write!(f, "transfer"),
            Self::Revoke => write!(f, "revoke"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

impl std::str::FromStr for InstanceAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submit" => Ok(Self::Submit),
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "transfer" => Ok(Self::Transfer),
            "revoke" => Ok(Self::Revoke),
            "cancel" => Ok(Self::Cancel),
            _ => Err(format!("Invalid instance action: {s}")),
        }
    }
}

/// Notification-triggering event types derived from transitions.
///
/// `Manual` is reserved for direct sends that bypass flow events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Submitted,
    Approved,
    Completed,
    Rejected,
    Transferred,
    Cancelled,
    Manual,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitted => write!(f, "submitted"),
            Self::Approved => write!(f, "approved"),
            Self::Completed => write!(f, "completed"),
            Self::Rejected => write!(f, "rejected"),
            Self::Transferred => write!(f, "transferred"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// One immutable audit record of an instance transition.
///
/// The ordered sequence of entries for an instance is a complete, replayable
/// trail; replaying it reproduces the instance's current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEntry {
    pub entry_id: Uuid,
    pub instance_id: Uuid,
    /// Step the action was taken at
    pub step_id: String,
    pub action: InstanceAction,
    pub operator: String,
    /// Transfer target, when the action was a transfer
    pub target_user: Option<String>,
    pub comment: Option<String>,
    /// Form data as of this transition, patch already merged
    pub form_snapshot: Value,
    pub from_step: Option<String>,
    pub to_step: Option<String>,
    pub from_assignee: Option<String>,
    pub to_assignee: Option<String>,
    /// Time spent at the step before this transition
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// Notification-triggering signal derived from a flow entry.
///
/// Carries the instance's scope coordinates so the matcher never needs a
/// storage round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEvent {
    pub instance_id: Uuid,
    pub process_id: Uuid,
    pub process_version: i32,
    pub template_id: Option<String>,
    pub category: Option<String>,
    pub event_type: EventType,
    pub status: InstanceStatus,
    pub step_id: Option<String>,
    pub actor: String,
    pub priority: Priority,
    /// Template-rendering context: title, comment, form snapshot, etc.
    pub context: Value,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_string_round_trip() {
        assert_eq!(InstanceAction::Approve.to_string(), "approve");
        assert_eq!(
            "transfer".parse::<InstanceAction>().unwrap(),
            InstanceAction::Transfer
        );
        assert!("escalate".parse::<InstanceAction>().is_err());
    }

    #[test]
    fn test_event_type_serde() {
        let json = serde_json::to_string(&EventType::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
