//! # Dispatch Worker
//!
//! Claims batches of ready tasks, sends them through the per-channel
//! transport collaborators, and records outcomes. Multiple workers run
//! concurrently; exclusivity comes from the queue's claim semantics, not
//! from any lock here. A send timeout counts as a transient failure and
//! feeds the retry path.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::config::WorkerConfig;
use crate::error::DeliveryError;
use crate::models::notification::Channel;
use crate::models::queue::QueueTask;
use crate::notification::dispatch::{DispatchQueue, SendResult};

/// Channel transport collaborator: the actual provider call lives outside
/// this core and may fail independently per channel
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn send(&self, address: &str, subject: &str, content: &str) -> SendResult;
}

pub struct DispatchWorker {
    worker_id: String,
    queue: Arc<DispatchQueue>,
    transports: HashMap<Channel, Arc<dyn ChannelTransport>>,
    config: WorkerConfig,
}

impl DispatchWorker {
    pub fn new(
        worker_id: impl Into<String>,
        queue: Arc<DispatchQueue>,
        transports: HashMap<Channel, Arc<dyn ChannelTransport>>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            queue,
            transports,
            config,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run until the shutdown signal flips true or its sender is dropped.
    /// Polls with an idle interval when no tasks are ready.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id = %self.worker_id, "Dispatch worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let processed = self.run_once().await;
            if processed == 0 {
                tokio::select! {
                    changed = shutdown.changed() => {
                        // A dropped sender means the host is gone; stop
                        // instead of spinning on a closed channel
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(self.config.poll_interval()) => {}
                }
            }
        }
        info!(worker_id = %self.worker_id, "Dispatch worker stopped");
    }

    /// Claim and process one batch; returns the number of claimed tasks.
    /// Exposed separately so tests can drive the loop deterministically.
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn run_once(&self) -> usize {
        let batch = match self.queue.claim(&self.worker_id, self.config.batch_size).await {
            Ok(batch) => batch,
            Err(error) => {
                error!(%error, "Failed to claim tasks");
                return 0;
            }
        };

        let claimed = batch.len();
        if claimed > 0 {
            debug!(claimed, "Claimed notification tasks");
        }

        for task in batch {
            self.process(task).await;
        }
        claimed
    }

    async fn process(&self, task: QueueTask) {
        let result = self.send(&task).await;

        if let Err(error) = &result {
            if error.is_transient() {
                warn!(
                    task_id = %task.task_id,
                    channel = %task.channel,
                    retry_count = task.retry_count,
                    %error,
                    "Send attempt failed"
                );
            } else {
                error!(task_id = %task.task_id, channel = %task.channel, %error, "Send failed permanently");
            }
        }

        if let Err(error) = self.queue.complete(task.task_id, result).await {
            error!(task_id = %task.task_id, %error, "Failed to record task outcome");
        }
    }

    async fn send(&self, task: &QueueTask) -> SendResult {
        let transport = self.transports.get(&task.channel).ok_or_else(|| {
            DeliveryError::Permanent(format!("no transport registered for channel {}", task.channel))
        })?;

        match tokio::time::timeout(
            self.config.send_timeout(),
            transport.send(&task.address, &task.subject, &task.content),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Transient(format!(
                "send timed out after {}s",
                self.config.send_timeout_secs
            ))),
        }
    }
}
