//! # Workorder Core
//!
//! Lifecycle engine for ticketing/ITSM workorders: a process-definition
//! driven instance state machine with an append-only flow ledger, plus the
//! notification matching, recipient resolution, and retryable dispatch
//! queue the transitions drive.
//!
//! ## Architecture
//!
//! ```text
//! action request -> WorkorderStateMachine::act
//!                     |- optimistic step token (Conflict on stale state)
//!                     |- role guards via DirectoryService
//!                     |- atomic instance update + FlowEntry append
//!                     `- FlowEvent -> NotificationPipeline
//!                                       |- match_event (config snapshot)
//!                                       |- RecipientResolver
//!                                       `- DispatchQueue::enqueue
//! DispatchWorker -> claim (exclusive CAS) -> ChannelTransport::send
//!                -> complete (backoff retry or terminal DeliveryLog entry)
//! ```
//!
//! Persistence, directory membership, and channel transports are injected
//! collaborators; the bundled [`storage::MemoryStore`] backs tests and
//! embedded use.

pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod logging;
pub mod models;
pub mod notification;
pub mod state_machine;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CoreConfig, WorkerConfig};
pub use directory::DirectoryService;
pub use error::{DeliveryError, FlowError, FlowResult};
pub use models::{
    Channel, DeliveryLogEntry, EventType, FlowEntry, FlowEvent, Instance, InstanceAction,
    NotificationConfig, NotificationScope, Priority, ProcessDefinition, QueueTask,
    QueueTaskStatus, RecipientType, RetryPolicy, StepDefinition, TriggerCondition, TriggerType,
};
pub use notification::{
    ChannelTransport, ConfigCache, DispatchQueue, DispatchWorker, NotificationPipeline,
    PlaceholderRenderer, RecipientResolver, ResolvedRecipient, SendReceipt, SendResult,
    TemplateRenderer,
};
pub use state_machine::{
    apply_action, replay, ActionRequest, FlowEventSink, InstanceStatus, NullEventSink,
    ReplayedState, SubmitRequest, TransitionOutcome, WorkorderStateMachine,
};
pub use storage::{
    DefinitionStore, DeliveryLogStore, FlowLedger, InstanceStore, MemoryStore, QueueStore,
    TransitionToken,
};
