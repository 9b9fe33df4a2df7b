//! In-memory storage engine.
//!
//! Backs the test suite and embedded single-process use. Instances and
//! their ledger entries share one lock so a transition's instance write and
//! entry append are a single atomic unit; the queue lock makes the claim
//! scan and the Pending->Sending flips one atomic step.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{FlowError, FlowResult};
use crate::models::delivery::DeliveryLogEntry;
use crate::models::flow::FlowEntry;
use crate::models::instance::Instance;
use crate::models::process::ProcessDefinition;
use crate::models::queue::{DedupKey, QueueTask, QueueTaskStatus};

use super::{
    DefinitionStore, DeliveryLogStore, FlowLedger, InstanceStore, QueueStore, TransitionToken,
};

#[derive(Default)]
struct InstanceTables {
    instances: HashMap<Uuid, Instance>,
    entries: HashMap<Uuid, Vec<FlowEntry>>,
}

/// Single-process storage engine implementing every collaborator trait
#[derive(Default)]
pub struct MemoryStore {
    definitions: Mutex<HashMap<(Uuid, i32), ProcessDefinition>>,
    instance_tables: Mutex<InstanceTables>,
    queue: Mutex<HashMap<Uuid, QueueTask>>,
    delivery_log: Mutex<Vec<DeliveryLogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DefinitionStore for MemoryStore {
    async fn put(&self, definition: ProcessDefinition) -> FlowResult<()> {
        definition.validate()?;
        let mut definitions = self.definitions.lock();
        definitions.insert((definition.process_id, definition.version), definition);
        Ok(())
    }

    async fn get(&self, process_id: Uuid, version: i32) -> FlowResult<ProcessDefinition> {
        self.definitions
            .lock()
            .get(&(process_id, version))
            .cloned()
            .ok_or(FlowError::NotFound {
                kind: "process definition",
                id: format!("{process_id} v{version}"),
            })
    }

    async fn latest(&self, process_id: Uuid) -> FlowResult<ProcessDefinition> {
        self.definitions
            .lock()
            .values()
            .filter(|d| d.process_id == process_id)
            .max_by_key(|d| d.version)
            .cloned()
            .ok_or(FlowError::NotFound {
                kind: "process definition",
                id: process_id.to_string(),
            })
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn create(&self, instance: Instance, entry: FlowEntry) -> FlowResult<()> {
        let mut tables = self.instance_tables.lock();
        if tables.instances.contains_key(&instance.instance_id) {
            return Err(FlowError::Storage(format!(
                "instance {} already exists",
                instance.instance_id
            )));
        }
        tables.entries.insert(instance.instance_id, vec![entry]);
        tables.instances.insert(instance.instance_id, instance);
        Ok(())
    }

    async fn get(&self, instance_id: Uuid) -> FlowResult<Instance> {
        self.instance_tables
            .lock()
            .instances
            .get(&instance_id)
            .cloned()
            .ok_or(FlowError::NotFound {
                kind: "instance",
                id: instance_id.to_string(),
            })
    }

    async fn apply_transition(
        &self,
        expected: TransitionToken,
        updated: Instance,
        entry: FlowEntry,
    ) -> FlowResult<()> {
        let mut tables = self.instance_tables.lock();
        let stored = tables
            .instances
            .get(&updated.instance_id)
            .ok_or(FlowError::NotFound {
                kind: "instance",
                id: updated.instance_id.to_string(),
            })?;

        let actual = TransitionToken {
            step_id: stored.current_step_id.clone(),
            status: stored.status,
            assignee: stored.assignee.clone(),
        };
        if actual != expected {
            return Err(FlowError::Conflict {
                expected: expected.step_id.unwrap_or_else(|| "<none>".to_string()),
                actual: actual.step_id.unwrap_or_else(|| "<none>".to_string()),
            });
        }

        tables
            .entries
            .entry(updated.instance_id)
            .or_default()
            .push(entry);
        tables.instances.insert(updated.instance_id, updated);
        Ok(())
    }

    async fn archive(&self, instance_id: Uuid) -> FlowResult<()> {
        let mut tables = self.instance_tables.lock();
        let instance = tables
            .instances
            .get_mut(&instance_id)
            .ok_or(FlowError::NotFound {
                kind: "instance",
                id: instance_id.to_string(),
            })?;
        instance.archived = true;
        Ok(())
    }
}

#[async_trait]
impl FlowLedger for MemoryStore {
    async fn entries_for(&self, instance_id: Uuid) -> FlowResult<Vec<FlowEntry>> {
        Ok(self
            .instance_tables
            .lock()
            .entries
            .get(&instance_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn insert(&self, task: QueueTask) -> FlowResult<()> {
        let mut queue = self.queue.lock();
        if queue.contains_key(&task.task_id) {
            return Err(FlowError::Storage(format!(
                "queue task {} already exists",
                task.task_id
            )));
        }
        queue.insert(task.task_id, task);
        Ok(())
    }

    async fn task(&self, task_id: Uuid) -> FlowResult<QueueTask> {
        self.queue
            .lock()
            .get(&task_id)
            .cloned()
            .ok_or(FlowError::NotFound {
                kind: "queue task",
                id: task_id.to_string(),
            })
    }

    async fn find_dedup_candidate(
        &self,
        key: &DedupKey,
        window_start: DateTime<Utc>,
    ) -> FlowResult<Option<QueueTask>> {
        let queue = self.queue.lock();
        Ok(queue
            .values()
            .find(|task| {
                !task.status.is_terminal()
                    && task.created_at >= window_start
                    && task.dedup_key() == *key
            })
            .cloned())
    }

    async fn claim_ready(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        batch_size: usize,
    ) -> FlowResult<Vec<QueueTask>> {
        let mut queue = self.queue.lock();

        let mut ready: Vec<Uuid> = queue
            .values()
            .filter(|task| task.status == QueueTaskStatus::Pending && task.scheduled_at <= now)
            .map(|task| task.task_id)
            .collect();

        // scheduled_at ascending, then priority descending, then id for
        // deterministic tie-breaks
        ready.sort_by(|a, b| {
            let ta = &queue[a];
            let tb = &queue[b];
            ta.scheduled_at
                .cmp(&tb.scheduled_at)
                .then(tb.priority.cmp(&ta.priority))
                .then(ta.task_id.cmp(&tb.task_id))
        });

        let mut claimed = Vec::new();
        for task_id in ready.into_iter().take(batch_size) {
            if let Some(task) = queue.get_mut(&task_id) {
                task.status = QueueTaskStatus::Sending;
                task.claimed_by = Some(worker_id.to_string());
                claimed.push(task.clone());
            }
        }

        Ok(claimed)
    }

    async fn transition_status(
        &self,
        task_id: Uuid,
        from: QueueTaskStatus,
        updated: QueueTask,
    ) -> FlowResult<()> {
        let mut queue = self.queue.lock();
        let stored = queue.get(&task_id).ok_or(FlowError::NotFound {
            kind: "queue task",
            id: task_id.to_string(),
        })?;

        if stored.status != from {
            return Err(FlowError::Conflict {
                expected: from.to_string(),
                actual: stored.status.to_string(),
            });
        }

        queue.insert(task_id, updated);
        Ok(())
    }

    async fn tasks_for_instance(&self, instance_id: Uuid) -> FlowResult<Vec<QueueTask>> {
        let queue = self.queue.lock();
        let mut tasks: Vec<QueueTask> = queue
            .values()
            .filter(|task| task.instance_id == Some(instance_id))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.task_id.cmp(&b.task_id))
        });
        Ok(tasks)
    }
}

#[async_trait]
impl DeliveryLogStore for MemoryStore {
    async fn append(&self, entry: DeliveryLogEntry) -> FlowResult<()> {
        self.delivery_log.lock().push(entry);
        Ok(())
    }

    async fn entries_for_instance(&self, instance_id: Uuid) -> FlowResult<Vec<DeliveryLogEntry>> {
        Ok(self
            .delivery_log
            .lock()
            .iter()
            .filter(|entry| entry.instance_id == Some(instance_id))
            .cloned()
            .collect())
    }

    async fn entries_for_task(&self, task_id: Uuid) -> FlowResult<Vec<DeliveryLogEntry>> {
        Ok(self
            .delivery_log
            .lock()
            .iter()
            .filter(|entry| entry.task_id == task_id)
            .cloned()
            .collect())
    }
}
