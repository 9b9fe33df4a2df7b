//! Storage collaborator interfaces.
//!
//! Persistence proper lives outside this core; these traits describe the
//! transactional and compare-and-swap primitives the state machine and the
//! dispatch queue require. The bundled in-memory engine backs the test
//! suite and embedded use.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::FlowResult;
use crate::models::delivery::DeliveryLogEntry;
use crate::models::flow::FlowEntry;
use crate::models::instance::Instance;
use crate::models::process::ProcessDefinition;
use crate::models::queue::{DedupKey, QueueTask, QueueTaskStatus};
use crate::state_machine::states::InstanceStatus;

pub use memory::MemoryStore;

/// Published process definitions, versioned and immutable
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn put(&self, definition: ProcessDefinition) -> FlowResult<()>;

    async fn get(&self, process_id: Uuid, version: i32) -> FlowResult<ProcessDefinition>;

    /// The highest published version of a process
    async fn latest(&self, process_id: Uuid) -> FlowResult<ProcessDefinition>;
}

/// Snapshot of the mutable instance fields a transition is conditioned on.
///
/// `apply_transition` only succeeds while the stored instance still matches
/// this token, which is what serializes concurrent operators acting on the
/// same ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionToken {
    pub step_id: Option<String>,
    pub status: InstanceStatus,
    pub assignee: Option<String>,
}

/// Instance records plus their atomically appended flow entries
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Persist a new instance together with its submission entry
    async fn create(&self, instance: Instance, entry: FlowEntry) -> FlowResult<()>;

    async fn get(&self, instance_id: Uuid) -> FlowResult<Instance>;

    /// Conditionally replace the instance and append the flow entry as one
    /// unit. Fails with `Conflict` when the stored state no longer matches
    /// `expected`.
    async fn apply_transition(
        &self,
        expected: TransitionToken,
        updated: Instance,
        entry: FlowEntry,
    ) -> FlowResult<()>;

    /// Soft-archive; instances are never physically deleted
    async fn archive(&self, instance_id: Uuid) -> FlowResult<()>;
}

/// Read side of the append-only flow ledger
#[async_trait]
pub trait FlowLedger: Send + Sync {
    /// Entries for an instance, in causal transition order
    async fn entries_for(&self, instance_id: Uuid) -> FlowResult<Vec<FlowEntry>>;
}

/// Durable dispatch queue with exclusive claim semantics
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn insert(&self, task: QueueTask) -> FlowResult<()>;

    async fn task(&self, task_id: Uuid) -> FlowResult<QueueTask>;

    /// A not-yet-terminal task with the same dedup key created at or after
    /// `window_start`, if any
    async fn find_dedup_candidate(
        &self,
        key: &DedupKey,
        window_start: DateTime<Utc>,
    ) -> FlowResult<Option<QueueTask>>;

    /// Atomically move up to `batch_size` ready Pending tasks to Sending on
    /// behalf of `worker_id` and return them. Two concurrent callers never
    /// receive the same task. Within equal `scheduled_at`, higher-priority
    /// tasks are claimed first.
    async fn claim_ready(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        batch_size: usize,
    ) -> FlowResult<Vec<QueueTask>>;

    /// Conditionally replace a task, guarded by its current status. Fails
    /// with `Conflict` when the stored status is not `from` — this is what
    /// prevents duplicate completion of a single claim.
    async fn transition_status(
        &self,
        task_id: Uuid,
        from: QueueTaskStatus,
        updated: QueueTask,
    ) -> FlowResult<()>;

    /// All tasks for an instance, for admin projections and statistics
    async fn tasks_for_instance(&self, instance_id: Uuid) -> FlowResult<Vec<QueueTask>>;
}

/// Append-only terminal delivery record
#[async_trait]
pub trait DeliveryLogStore: Send + Sync {
    async fn append(&self, entry: DeliveryLogEntry) -> FlowResult<()>;

    async fn entries_for_instance(&self, instance_id: Uuid) -> FlowResult<Vec<DeliveryLogEntry>>;

    async fn entries_for_task(&self, task_id: Uuid) -> FlowResult<Vec<DeliveryLogEntry>>;
}
