//! Dispatch queue tasks: one scheduled, retryable send per recipient/channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::models::flow::EventType;
use crate::models::notification::{Channel, RecipientType};

/// Queue task lifecycle: Pending -> Sending -> {Success, Failed}.
///
/// A failed task with retries left re-arms to Pending with an advanced
/// `next_retry_at`; exhausted or permanent failures are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueTaskStatus {
    #[default]
    Pending,
    Sending,
    Success,
    Failed,
    Cancelled,
}

impl QueueTaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for QueueTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Sending => write!(f, "sending"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for QueueTaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sending" => Ok(Self::Sending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid queue task status: {s}")),
        }
    }
}

/// Coalescing key: tasks sharing a key created within the dedup window
/// collapse into a single task at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub notification_id: Uuid,
    pub instance_id: Option<Uuid>,
    pub event_type: EventType,
    pub recipient: String,
    pub channel: Channel,
}

/// One unit of notification delivery to one recipient on one channel.
///
/// Subject and content are rendered at enqueue time so later template edits
/// cannot alter an already-queued message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTask {
    pub task_id: Uuid,
    pub notification_id: Uuid,
    /// None for manual sends that bypass flow events
    pub instance_id: Option<Uuid>,
    pub event_type: EventType,
    pub channel: Channel,
    pub recipient_type: RecipientType,
    /// Resolved user identity
    pub recipient: String,
    /// Resolved channel address
    pub address: String,
    pub subject: String,
    pub content: String,
    pub priority: i32,
    pub status: QueueTaskStatus,
    pub scheduled_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub retry_interval_secs: u64,
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Worker currently holding the exclusive Sending claim
    pub claimed_by: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QueueTask {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            notification_id: self.notification_id,
            instance_id: self.instance_id,
            event_type: self.event_type,
            recipient: self.recipient.clone(),
            channel: self.channel,
        }
    }
}
