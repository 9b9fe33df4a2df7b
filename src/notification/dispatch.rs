//! # Dispatch Queue
//!
//! Durable, priority-ordered, time-scheduled queue of single
//! (recipient, channel) send tasks. Enqueue renders messages and coalesces
//! duplicates inside the dedup window; claim hands exclusive batches to
//! workers; complete drives the backoff/retry loop and writes the terminal
//! delivery log entry.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::error::{DeliveryError, FlowError, FlowResult};
use crate::models::delivery::DeliveryLogEntry;
use crate::models::flow::{EventType, FlowEvent};
use crate::models::notification::{NotificationConfig, RetryPolicy, TriggerType};
use crate::models::queue::{QueueTask, QueueTaskStatus};
use crate::notification::resolver::ResolvedRecipient;
use crate::notification::template::TemplateRenderer;
use crate::storage::{DeliveryLogStore, QueueStore};

/// Successful send metadata returned by a channel transport
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendReceipt {
    pub cost: Option<f64>,
}

pub type SendResult = Result<SendReceipt, DeliveryError>;

pub struct DispatchQueue {
    store: Arc<dyn QueueStore>,
    delivery_log: Arc<dyn DeliveryLogStore>,
    renderer: Arc<dyn TemplateRenderer>,
    clock: Arc<dyn Clock>,
    config: CoreConfig,
}

impl DispatchQueue {
    pub fn new(
        store: Arc<dyn QueueStore>,
        delivery_log: Arc<dyn DeliveryLogStore>,
        renderer: Arc<dyn TemplateRenderer>,
        clock: Arc<dyn Clock>,
        config: CoreConfig,
    ) -> Self {
        Self {
            store,
            delivery_log,
            renderer,
            clock,
            config,
        }
    }

    /// Create one task per resolved recipient for a flow event.
    ///
    /// Subject and content render now, against this event's context. Tasks
    /// sharing a dedup key with a live task created inside the dedup window
    /// are coalesced and produce no new task. Returns the created task ids.
    #[instrument(skip(self, config, event, recipients), fields(notification_id = %config.notification_id, event_type = %event.event_type))]
    pub async fn enqueue(
        &self,
        config: &NotificationConfig,
        event: &FlowEvent,
        recipients: &[ResolvedRecipient],
        scheduled_hint: Option<DateTime<Utc>>,
    ) -> FlowResult<Vec<Uuid>> {
        let now = self.clock.now();
        let scheduled_at = self.scheduled_at(config, now, scheduled_hint);
        let subject = self.renderer.render(&config.subject_template, &event.context);
        let content = self.renderer.render(&config.content_template, &event.context);

        let mut created = Vec::new();
        for recipient in recipients {
            let task = self.build_task(
                config,
                event.event_type,
                Some(event.instance_id),
                recipient,
                subject.clone(),
                content.clone(),
                scheduled_at,
                now,
            );

            let window_start = now - self.config.dedup_window();
            if let Some(existing) = self
                .store
                .find_dedup_candidate(&task.dedup_key(), window_start)
                .await?
            {
                debug!(
                    task_id = %existing.task_id,
                    recipient = %recipient.user_id,
                    channel = %recipient.channel,
                    "Coalesced duplicate notification task inside dedup window"
                );
                continue;
            }

            let task_id = task.task_id;
            self.store.insert(task).await?;
            created.push(task_id);
        }

        if !created.is_empty() {
            info!(
                created = created.len(),
                notification_id = %config.notification_id,
                "Enqueued notification tasks"
            );
        }

        Ok(created)
    }

    /// Direct send bypassing flow events; tasks carry no instance id
    #[instrument(skip(self, config, recipients, context), fields(notification_id = %config.notification_id))]
    pub async fn enqueue_manual(
        &self,
        config: &NotificationConfig,
        recipients: &[ResolvedRecipient],
        context: &serde_json::Value,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> FlowResult<Vec<Uuid>> {
        let now = self.clock.now();
        let scheduled_at = scheduled_at.unwrap_or(now);
        let subject = self.renderer.render(&config.subject_template, context);
        let content = self.renderer.render(&config.content_template, context);

        let mut created = Vec::new();
        for recipient in recipients {
            let task = self.build_task(
                config,
                EventType::Manual,
                None,
                recipient,
                subject.clone(),
                content.clone(),
                scheduled_at,
                now,
            );
            let task_id = task.task_id;
            self.store.insert(task).await?;
            created.push(task_id);
        }
        Ok(created)
    }

    /// Claim up to `batch_size` ready tasks exclusively for `worker_id`
    pub async fn claim(&self, worker_id: &str, batch_size: usize) -> FlowResult<Vec<QueueTask>> {
        self.store
            .claim_ready(worker_id, self.clock.now(), batch_size)
            .await
    }

    /// Record a send outcome for a claimed task.
    ///
    /// Success and exhausted or permanent failures are terminal and write
    /// one delivery log entry. Transient failures with retries left re-arm
    /// the task to Pending with exponential backoff.
    #[instrument(skip(self, result), fields(task_id = %task_id))]
    pub async fn complete(&self, task_id: Uuid, result: SendResult) -> FlowResult<QueueTask> {
        let task = self.store.task(task_id).await?;
        if task.status != QueueTaskStatus::Sending {
            return Err(FlowError::InvalidState(format!(
                "task {task_id} is {}; only claimed tasks complete",
                task.status
            )));
        }

        let now = self.clock.now();
        let mut updated = task.clone();
        updated.claimed_by = None;

        match result {
            Ok(receipt) => {
                updated.status = QueueTaskStatus::Success;
                updated.processed_at = Some(now);
                updated.last_error = None;
                self.store
                    .transition_status(task_id, QueueTaskStatus::Sending, updated.clone())
                    .await?;
                self.delivery_log
                    .append(DeliveryLogEntry::from_task(
                        &updated, true, None, receipt.cost, now,
                    ))
                    .await?;
                info!(recipient = %updated.recipient, channel = %updated.channel, "Notification delivered");
            }
            Err(error) => {
                let retryable = error.is_transient() && task.retry_count < task.max_retries;
                if retryable {
                    updated.retry_count = task.retry_count + 1;
                    let delay = backoff_delay(
                        task.retry_interval_secs,
                        updated.retry_count,
                        self.config.backoff_cap(),
                    );
                    updated.next_retry_at = Some(now + delay);
                    updated.scheduled_at = now + delay;
                    updated.status = QueueTaskStatus::Pending;
                    updated.last_error = Some(error.to_string());
                    self.store
                        .transition_status(task_id, QueueTaskStatus::Sending, updated.clone())
                        .await?;
                    warn!(
                        retry_count = updated.retry_count,
                        max_retries = updated.max_retries,
                        next_retry_at = %updated.next_retry_at.unwrap_or(now),
                        error = %error,
                        "Transient delivery failure; re-armed with backoff"
                    );
                } else {
                    updated.status = QueueTaskStatus::Failed;
                    updated.processed_at = Some(now);
                    updated.last_error = Some(error.to_string());
                    self.store
                        .transition_status(task_id, QueueTaskStatus::Sending, updated.clone())
                        .await?;
                    self.delivery_log
                        .append(DeliveryLogEntry::from_task(
                            &updated,
                            false,
                            Some(error.to_string()),
                            None,
                            now,
                        ))
                        .await?;
                    warn!(
                        retry_count = updated.retry_count,
                        error = %error,
                        "Delivery permanently failed"
                    );
                }
            }
        }

        Ok(updated)
    }

    fn scheduled_at(
        &self,
        config: &NotificationConfig,
        now: DateTime<Utc>,
        hint: Option<DateTime<Utc>>,
    ) -> DateTime<Utc> {
        match config.trigger {
            TriggerType::Immediate => now,
            TriggerType::Scheduled => config.scheduled_at.unwrap_or_else(|| {
                let offset = config
                    .repeat_interval_secs
                    .map(|secs| Duration::seconds(secs as i64))
                    .unwrap_or_else(Duration::zero);
                now + offset
            }),
            TriggerType::Condition | TriggerType::Manual => hint.unwrap_or(now),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_task(
        &self,
        config: &NotificationConfig,
        event_type: EventType,
        instance_id: Option<Uuid>,
        recipient: &ResolvedRecipient,
        subject: String,
        content: String,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> QueueTask {
        let retry = config.retry.unwrap_or(RetryPolicy {
            max_retries: self.config.default_max_retries,
            retry_interval_secs: self.config.default_retry_interval_secs,
        });
        QueueTask {
            task_id: Uuid::new_v4(),
            notification_id: config.notification_id,
            instance_id,
            event_type,
            channel: recipient.channel,
            recipient_type: recipient.recipient_type,
            recipient: recipient.user_id.clone(),
            address: recipient.address.clone(),
            subject,
            content,
            priority: config.priority,
            status: QueueTaskStatus::Pending,
            scheduled_at,
            processed_at: None,
            retry_count: 0,
            max_retries: retry.max_retries,
            retry_interval_secs: retry.retry_interval_secs,
            next_retry_at: None,
            claimed_by: None,
            last_error: None,
            created_at: now,
        }
    }
}

/// Exponential backoff: `retry_interval * 2^retry_count`, capped
fn backoff_delay(interval_secs: u64, retry_count: u32, cap: Duration) -> Duration {
    let exponent = retry_count.min(16);
    let delay_secs = interval_secs.saturating_mul(1u64 << exponent);
    let delay = Duration::seconds(delay_secs.min(i64::MAX as u64) as i64);
    delay.min(cap)
}
