//! Process definitions: the ordered step templates instances follow.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{FlowError, FlowResult};
use crate::models::flow::InstanceAction;

/// A single named step within a process definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub step_id: String,
    pub name: String,
    /// Role an operator must hold to approve or reject at this step
    pub required_role: String,
    pub allowed_actions: Vec<InstanceAction>,
}

impl StepDefinition {
    pub fn allows(&self, action: InstanceAction) -> bool {
        self.allowed_actions.contains(&action)
    }
}

/// An ordered list of steps, immutable once published.
///
/// Edits create a new version; in-flight instances keep the version they
/// were created against for their whole lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub process_id: Uuid,
    pub version: i32,
    pub name: String,
    pub category: Option<String>,
    pub template_id: Option<String>,
    pub steps: Vec<StepDefinition>,
}

impl ProcessDefinition {
    /// Validate structural invariants: at least one step, unique non-empty ids
    pub fn validate(&self) -> FlowResult<()> {
        if self.steps.is_empty() {
            return Err(FlowError::InvalidDefinition(format!(
                "process {} v{} has no steps",
                self.process_id, self.version
            )));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.step_id.is_empty() {
                return Err(FlowError::InvalidDefinition(format!(
                    "process {} v{} has a step with an empty id",
                    self.process_id, self.version
                )));
            }
            if !seen.insert(step.step_id.as_str()) {
                return Err(FlowError::InvalidDefinition(format!(
                    "process {} v{} has duplicate step id {}",
                    self.process_id, self.version, step.step_id
                )));
            }
        }

        Ok(())
    }

    pub fn step(&self, step_id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    pub fn first_step(&self) -> Option<&StepDefinition> {
        self.steps.first()
    }

    /// The step that follows `step_id`, or None if it is the final step
    pub fn next_step_after(&self, step_id: &str) -> Option<&StepDefinition> {
        let position = self.steps.iter().position(|s| s.step_id == step_id)?;
        self.steps.get(position + 1)
    }

    pub fn is_final_step(&self, step_id: &str) -> bool {
        self.steps
            .last()
            .map(|s| s.step_id == step_id)
            .unwrap_or(false)
    }
}
