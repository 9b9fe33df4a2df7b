//! Delivery log: terminal, queryable record of every completed send.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::flow::EventType;
use crate::models::notification::Channel;
use crate::models::queue::QueueTask;

/// Immutable snapshot of a queue task's terminal resolution.
///
/// Written exactly once per task, on success or on permanent failure.
/// Intermediate transient failures never appear here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLogEntry {
    pub log_id: Uuid,
    pub task_id: Uuid,
    pub notification_id: Uuid,
    pub instance_id: Option<Uuid>,
    pub event_type: EventType,
    pub channel: Channel,
    pub recipient: String,
    pub address: String,
    pub subject: String,
    pub success: bool,
    pub error: Option<String>,
    /// Retries consumed before the terminal outcome
    pub retry_count: u32,
    pub cost: Option<f64>,
    pub sent_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl DeliveryLogEntry {
    /// Build the terminal log entry for a completed task
    pub fn from_task(
        task: &QueueTask,
        success: bool,
        error: Option<String>,
        cost: Option<f64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            log_id: Uuid::new_v4(),
            task_id: task.task_id,
            notification_id: task.notification_id,
            instance_id: task.instance_id,
            event_type: task.event_type,
            channel: task.channel,
            recipient: task.recipient.clone(),
            address: task.address.clone(),
            subject: task.subject.clone(),
            success,
            error,
            retry_count: task.retry_count,
            cost,
            sent_at: now,
            delivered_at: if success { Some(now) } else { None },
            read_at: None,
        }
    }
}
