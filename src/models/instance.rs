//! Workorder instances: single tickets created from a process definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::state_machine::states::InstanceStatus;

/// Base priority levels, ordered low to urgent
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

/// A single ticket moving through a process definition's steps.
///
/// Mutated only through the state machine's transition operation; never
/// physically deleted (soft-archived via `archived`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: Uuid,
    pub process_id: Uuid,
    /// Definition version pinned at creation; process edits never alter
    /// in-flight instances
    pub process_version: i32,
    pub title: String,
    pub status: InstanceStatus,
    /// Valid step of the pinned definition while processing; frozen at the
    /// point of rejection or cancellation once terminal
    pub current_step_id: Option<String>,
    pub priority: Priority,
    pub creator: String,
    pub assignee: Option<String>,
    /// Opaque to the state machine; merged shallowly by form-data patches
    pub form_data: Value,
    pub created_at: DateTime<Utc>,
    pub due_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub archived: bool,
}

impl Instance {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Shallow-merge a form-data patch into existing form data.
///
/// Top-level keys of `patch` overwrite keys of `base`; non-object values
/// replace the base wholesale.
pub fn merge_form_data(base: &Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in patch_map {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => patch.clone(),
    }
}
