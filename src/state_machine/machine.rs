//! # Workorder State Machine
//!
//! Owns the transition contract: every action is validated against the
//! instance's pinned process definition, gated by operator role, serialized
//! by an optimistic step token, persisted atomically with its flow ledger
//! entry, and followed by exactly one flow event handed to the notification
//! pipeline. Dispatch is strictly decoupled: nothing here waits on channel
//! I/O.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::clock::Clock;
use crate::directory::DirectoryService;
use crate::error::{FlowError, FlowResult};
use crate::models::flow::{EventType, FlowEntry, FlowEvent, InstanceAction};
use crate::models::instance::{merge_form_data, Instance, Priority};
use crate::models::process::ProcessDefinition;
use crate::state_machine::states::InstanceStatus;
use crate::state_machine::transition::apply_action;
use crate::storage::{DefinitionStore, FlowLedger, InstanceStore, TransitionToken};

/// Consumer of flow events emitted after each successful transition
#[async_trait]
pub trait FlowEventSink: Send + Sync {
    async fn handle_event(&self, event: FlowEvent);
}

/// Sink that drops events, for hosts that run without notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

#[async_trait]
impl FlowEventSink for NullEventSink {
    async fn handle_event(&self, _event: FlowEvent) {}
}

/// Request to create a Draft instance from a process definition
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub title: String,
    pub creator: String,
    pub priority: Priority,
    pub form_data: Value,
    pub due_at: Option<DateTime<Utc>>,
}

/// One operator action on an instance.
///
/// `expected_step_id` is the optimistic concurrency token: it must equal
/// the instance's current step or the action fails with `Conflict`.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub action: InstanceAction,
    pub operator: String,
    pub comment: Option<String>,
    pub target_user: Option<String>,
    pub form_data_patch: Option<Value>,
    pub expected_step_id: String,
}

/// Instance lifecycle engine
pub struct WorkorderStateMachine {
    definitions: Arc<dyn DefinitionStore>,
    instances: Arc<dyn InstanceStore>,
    ledger: Arc<dyn FlowLedger>,
    directory: Arc<dyn DirectoryService>,
    sink: Arc<dyn FlowEventSink>,
    clock: Arc<dyn Clock>,
}

impl WorkorderStateMachine {
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        instances: Arc<dyn InstanceStore>,
        ledger: Arc<dyn FlowLedger>,
        directory: Arc<dyn DirectoryService>,
        sink: Arc<dyn FlowEventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            definitions,
            instances,
            ledger,
            directory,
            sink,
            clock,
        }
    }

    /// Create a Draft instance at the first step of the latest published
    /// definition version
    #[instrument(skip(self, request), fields(process_id = %process_id, creator = %request.creator))]
    pub async fn submit(&self, process_id: Uuid, request: SubmitRequest) -> FlowResult<Instance> {
        let definition = self.definitions.latest(process_id).await?;
        definition.validate()?;

        let first_step = definition
            .first_step()
            .ok_or_else(|| FlowError::InvalidDefinition("definition has no steps".to_string()))?;

        let now = self.clock.now();
        let instance = Instance {
            instance_id: Uuid::new_v4(),
            process_id: definition.process_id,
            process_version: definition.version,
            title: request.title,
            status: InstanceStatus::Draft,
            current_step_id: Some(first_step.step_id.clone()),
            priority: request.priority,
            creator: request.creator.clone(),
            assignee: None,
            form_data: request.form_data.clone(),
            created_at: now,
            due_at: request.due_at,
            completed_at: None,
            archived: false,
        };

        let entry = FlowEntry {
            entry_id: Uuid::new_v4(),
            instance_id: instance.instance_id,
            step_id: first_step.step_id.clone(),
            action: InstanceAction::Submit,
            operator: request.creator.clone(),
            target_user: None,
            comment: None,
            form_snapshot: request.form_data,
            from_step: None,
            to_step: Some(first_step.step_id.clone()),
            from_assignee: None,
            to_assignee: None,
            duration_ms: 0,
            created_at: now,
        };

        self.instances.create(instance.clone(), entry).await?;

        info!(
            instance_id = %instance.instance_id,
            step = %first_step.step_id,
            "Instance submitted"
        );

        let event = self.flow_event(&definition, &instance, EventType::Submitted, &request.creator, None, now);
        self.sink.handle_event(event).await;

        Ok(instance)
    }

    /// Apply one role-gated action to an instance.
    ///
    /// Fails with `Conflict` on a stale `expected_step_id`, `Forbidden` on a
    /// role or assignee mismatch, and `InvalidState` for terminal instances
    /// or actions the current step does not allow. On success the instance
    /// mutation and the flow entry append land atomically, then one flow
    /// event is emitted.
    #[instrument(skip(self, request), fields(instance_id = %instance_id, action = %request.action, operator = %request.operator))]
    pub async fn act(&self, instance_id: Uuid, request: ActionRequest) -> FlowResult<Instance> {
        let instance = self.instances.get(instance_id).await?;

        if instance.is_terminal() {
            return Err(FlowError::InvalidState(format!(
                "instance {} is terminal ({})",
                instance_id, instance.status
            )));
        }

        let current_step_id =
            instance
                .current_step_id
                .clone()
                .ok_or_else(|| FlowError::InvalidState(format!(
                    "instance {instance_id} has no current step"
                )))?;

        if request.expected_step_id != current_step_id {
            return Err(FlowError::Conflict {
                expected: request.expected_step_id,
                actual: current_step_id,
            });
        }

        let definition = self
            .definitions
            .get(instance.process_id, instance.process_version)
            .await?;
        let step = definition.step(&current_step_id).ok_or_else(|| {
            FlowError::InvalidState(format!(
                "step {current_step_id} is not part of process {} v{}",
                instance.process_id, instance.process_version
            ))
        })?;

        if !step.allows(request.action) {
            return Err(FlowError::InvalidState(format!(
                "action {} is not allowed at step {}",
                request.action, step.step_id
            )));
        }

        self.check_permission(&instance, step.required_role.as_str(), &request)
            .await?;

        let outcome = apply_action(
            &definition,
            &current_step_id,
            instance.status,
            instance.assignee.as_deref(),
            request.action,
            request.target_user.as_deref(),
        )?;

        let now = self.clock.now();
        let merged_form = match &request.form_data_patch {
            Some(patch) => merge_form_data(&instance.form_data, patch),
            None => instance.form_data.clone(),
        };

        let mut updated = instance.clone();
        updated.status = outcome.to_status;
        updated.current_step_id = outcome.to_step.clone();
        updated.assignee = outcome.to_assignee.clone();
        updated.form_data = merged_form.clone();
        if outcome.to_status == InstanceStatus::Completed {
            updated.completed_at = Some(now);
        }

        let entry = FlowEntry {
            entry_id: Uuid::new_v4(),
            instance_id,
            step_id: current_step_id.clone(),
            action: request.action,
            operator: request.operator.clone(),
            target_user: request.target_user.clone(),
            comment: request.comment.clone(),
            form_snapshot: merged_form,
            from_step: Some(current_step_id.clone()),
            to_step: outcome.to_step.clone(),
            from_assignee: instance.assignee.clone(),
            to_assignee: outcome.to_assignee.clone(),
            duration_ms: self.step_duration_ms(instance_id, &instance, now).await,
            created_at: now,
        };

        let expected = TransitionToken {
            step_id: Some(current_step_id.clone()),
            status: instance.status,
            assignee: instance.assignee.clone(),
        };
        self.instances
            .apply_transition(expected, updated.clone(), entry)
            .await?;

        info!(
            instance_id = %instance_id,
            action = %request.action,
            from_step = %current_step_id,
            to_step = outcome.to_step.as_deref().unwrap_or("<none>"),
            status = %outcome.to_status,
            "Instance transitioned"
        );

        let event = self.flow_event(
            &definition,
            &updated,
            outcome.event_type,
            &request.operator,
            request.comment.as_deref(),
            now,
        );
        self.sink.handle_event(event).await;

        Ok(updated)
    }

    /// Soft-archive a terminal instance
    #[instrument(skip(self))]
    pub async fn archive(&self, instance_id: Uuid) -> FlowResult<()> {
        let instance = self.instances.get(instance_id).await?;
        if !instance.is_terminal() {
            return Err(FlowError::InvalidState(format!(
                "instance {} is still {}; only terminal instances archive",
                instance_id, instance.status
            )));
        }
        self.instances.archive(instance_id).await
    }

    async fn check_permission(
        &self,
        instance: &Instance,
        required_role: &str,
        request: &ActionRequest,
    ) -> FlowResult<()> {
        let operator = request.operator.as_str();
        match request.action {
            InstanceAction::Transfer => {
                // The current assignee hands the ticket off; an unassigned
                // step may be transferred by any holder of its required role
                match instance.assignee.as_deref() {
                    Some(assignee) if assignee == operator => Ok(()),
                    Some(_) => Err(FlowError::Forbidden {
                        operator: operator.to_string(),
                        action: request.action.to_string(),
                        reason: "only the current assignee may transfer".to_string(),
                    }),
                    None => {
                        if self.directory.user_in_role(operator, required_role).await? {
                            Ok(())
                        } else {
                            Err(FlowError::Forbidden {
                                operator: operator.to_string(),
                                action: request.action.to_string(),
                                reason: format!(
                                    "unassigned step transfers require role {required_role}"
                                ),
                            })
                        }
                    }
                }
            }
            InstanceAction::Revoke | InstanceAction::Cancel => {
                // Restricted to the creator or the designated approver
                let permitted = instance.creator == operator
                    || instance.assignee.as_deref() == Some(operator);
                if permitted {
                    Ok(())
                } else {
                    Err(FlowError::Forbidden {
                        operator: operator.to_string(),
                        action: request.action.to_string(),
                        reason: "only the creator or current assignee may cancel".to_string(),
                    })
                }
            }
            InstanceAction::Approve | InstanceAction::Reject => {
                if self.directory.user_in_role(operator, required_role).await? {
                    Ok(())
                } else {
                    Err(FlowError::Forbidden {
                        operator: operator.to_string(),
                        action: request.action.to_string(),
                        reason: format!("requires role {required_role}"),
                    })
                }
            }
            InstanceAction::Submit => Err(FlowError::InvalidState(
                "submit is not a ticket action; use instance submission".to_string(),
            )),
        }
    }

    /// Time spent at the current step: since the previous transition, or
    /// since creation for the first action
    async fn step_duration_ms(
        &self,
        instance_id: Uuid,
        instance: &Instance,
        now: DateTime<Utc>,
    ) -> i64 {
        let since = match self.ledger.entries_for(instance_id).await {
            Ok(entries) => entries
                .last()
                .map(|entry| entry.created_at)
                .unwrap_or(instance.created_at),
            Err(error) => {
                debug!(instance_id = %instance_id, %error, "Ledger read failed; using creation time for duration");
                instance.created_at
            }
        };
        (now - since).num_milliseconds()
    }

    fn flow_event(
        &self,
        definition: &ProcessDefinition,
        instance: &Instance,
        event_type: EventType,
        actor: &str,
        comment: Option<&str>,
        occurred_at: DateTime<Utc>,
    ) -> FlowEvent {
        let step_name = instance
            .current_step_id
            .as_deref()
            .and_then(|id| definition.step(id))
            .map(|step| step.name.clone());

        FlowEvent {
            instance_id: instance.instance_id,
            process_id: instance.process_id,
            process_version: instance.process_version,
            template_id: definition.template_id.clone(),
            category: definition.category.clone(),
            event_type,
            status: instance.status,
            step_id: instance.current_step_id.clone(),
            actor: actor.to_string(),
            priority: instance.priority,
            context: json!({
                "instance_id": instance.instance_id,
                "title": instance.title,
                "process": definition.name,
                "status": instance.status,
                "event_type": event_type,
                "step": instance.current_step_id,
                "step_name": step_name,
                "actor": actor,
                "creator": instance.creator,
                "assignee": instance.assignee,
                "comment": comment,
                "form": instance.form_data,
            }),
            occurred_at,
        }
    }
}
