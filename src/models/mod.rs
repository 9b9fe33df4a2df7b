//! Domain models for the workorder lifecycle and notification pipeline.
//!
//! These are the persisted shapes; view-only projections live with their
//! read surfaces and never round-trip through storage.

pub mod delivery;
pub mod flow;
pub mod instance;
pub mod notification;
pub mod process;
pub mod queue;

pub use delivery::DeliveryLogEntry;
pub use flow::{EventType, FlowEntry, FlowEvent, InstanceAction};
pub use instance::{Instance, Priority};
pub use notification::{
    Channel, NotificationConfig, NotificationScope, RecipientType, RetryPolicy, TriggerCondition,
    TriggerType,
};
pub use process::{ProcessDefinition, StepDefinition};
pub use queue::{DedupKey, QueueTask, QueueTaskStatus};
