//! Notification configurations: scope, triggers, recipients, and retry policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::models::flow::{EventType, FlowEvent};
use crate::models::instance::Priority;
use crate::state_machine::states::InstanceStatus;

/// Delivery channels. Concrete transports are injected collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Webhook,
    Chat,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Sms => write!(f, "sms"),
            Self::Webhook => write!(f, "webhook"),
            Self::Chat => write!(f, "chat"),
        }
    }
}

/// Who receives a matched notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientType {
    Creator,
    Assignee,
    Manager,
    Role,
    Department,
    Group,
    Custom,
}

/// Configuration scope; `Global` acts as the fallback default scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationScope {
    Global,
    Process(Uuid),
    Template(String),
    Category(String),
}

impl NotificationScope {
    /// Whether this scope covers the event's process/template/category
    pub fn matches(&self, event: &FlowEvent) -> bool {
        match self {
            Self::Global => true,
            Self::Process(process_id) => *process_id == event.process_id,
            Self::Template(template_id) => event.template_id.as_deref() == Some(template_id),
            Self::Category(category) => event.category.as_deref() == Some(category),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Immediate,
    Scheduled,
    Condition,
    Manual,
}

/// Structured predicate evaluated against a flow event's context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCondition {
    All(Vec<TriggerCondition>),
    Any(Vec<TriggerCondition>),
    Not(Box<TriggerCondition>),
    StatusIs(InstanceStatus),
    PriorityAtLeast(Priority),
    ActorIs(String),
    /// Dot-path lookup into the event context, compared for equality
    FieldEquals {
        field: String,
        value: Value,
    },
}

impl TriggerCondition {
    pub fn evaluate(&self, event: &FlowEvent) -> bool {
        match self {
            Self::All(conditions) => conditions.iter().all(|c| c.evaluate(event)),
            Self::Any(conditions) => conditions.iter().any(|c| c.evaluate(event)),
            Self::Not(condition) => !condition.evaluate(event),
            Self::StatusIs(status) => event.status == *status,
            Self::PriorityAtLeast(priority) => event.priority >= *priority,
            Self::ActorIs(actor) => event.actor == *actor,
            Self::FieldEquals { field, value } => {
                lookup_path(&event.context, field).map_or(false, |found| found == value)
            }
        }
    }
}

fn lookup_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Retry policy for dispatch tasks created from a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_interval_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_interval_secs: 300,
        }
    }
}

/// One notification rule: which events it matches, who gets told, and how
/// delivery retries.
///
/// At most one configuration per scope may carry `is_default`; that
/// uniqueness is enforced at write time outside this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub notification_id: Uuid,
    pub name: String,
    pub scope: NotificationScope,
    pub event_types: Vec<EventType>,
    pub trigger: TriggerType,
    pub condition: Option<TriggerCondition>,
    /// Fixed send time for scheduled triggers
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Offset from the event for scheduled triggers without a fixed time
    pub repeat_interval_secs: Option<u64>,
    pub channels: Vec<Channel>,
    pub recipient_types: Vec<RecipientType>,
    /// Literal user ids or addresses for the `Custom` recipient type
    pub custom_users: Vec<String>,
    pub roles: Vec<String>,
    pub departments: Vec<String>,
    pub groups: Vec<String>,
    pub subject_template: String,
    pub content_template: String,
    /// Delivery retry policy; falls back to the core defaults when absent
    pub retry: Option<RetryPolicy>,
    pub priority: i32,
    pub enabled: bool,
    pub is_default: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            notification_id: Uuid::new_v4(),
            name: String::new(),
            scope: NotificationScope::Global,
            event_types: Vec::new(),
            trigger: TriggerType::Immediate,
            condition: None,
            scheduled_at: None,
            repeat_interval_secs: None,
            channels: Vec::new(),
            recipient_types: Vec::new(),
            custom_users: Vec::new(),
            roles: Vec::new(),
            departments: Vec::new(),
            groups: Vec::new(),
            subject_template: String::new(),
            content_template: String::new(),
            retry: None,
            priority: 0,
            enabled: true,
            is_default: false,
        }
    }
}
