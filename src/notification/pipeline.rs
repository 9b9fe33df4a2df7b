//! Event fan-out: wire the matcher, resolver, and dispatch queue behind the
//! state machine's event sink.
//!
//! Dispatch failures are logged and swallowed here so a ticket action never
//! appears to fail because a notification could not be queued.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::models::flow::FlowEvent;
use crate::notification::dispatch::DispatchQueue;
use crate::notification::matcher::{match_event, ConfigCache};
use crate::notification::resolver::RecipientResolver;
use crate::state_machine::machine::FlowEventSink;
use crate::storage::InstanceStore;

pub struct NotificationPipeline {
    configs: Arc<ConfigCache>,
    resolver: RecipientResolver,
    queue: Arc<DispatchQueue>,
    instances: Arc<dyn InstanceStore>,
}

impl NotificationPipeline {
    pub fn new(
        configs: Arc<ConfigCache>,
        resolver: RecipientResolver,
        queue: Arc<DispatchQueue>,
        instances: Arc<dyn InstanceStore>,
    ) -> Self {
        Self {
            configs,
            resolver,
            queue,
            instances,
        }
    }
}

#[async_trait]
impl FlowEventSink for NotificationPipeline {
    async fn handle_event(&self, event: FlowEvent) {
        let snapshot = self.configs.snapshot();
        let matched = match_event(&snapshot, &event);
        if matched.is_empty() {
            return;
        }

        let instance = match self.instances.get(event.instance_id).await {
            Ok(instance) => Some(instance),
            Err(error) => {
                debug!(instance_id = %event.instance_id, %error, "Instance unavailable for resolution");
                None
            }
        };

        for config in matched {
            let recipients = self
                .resolver
                .resolve(config, &event, instance.as_ref())
                .await;
            if recipients.is_empty() {
                debug!(
                    notification_id = %config.notification_id,
                    event_type = %event.event_type,
                    "No resolvable recipients; skipping"
                );
                continue;
            }

            if let Err(error) = self.queue.enqueue(config, &event, &recipients, None).await {
                // Never propagate: ticket actions must not fail on dispatch
                error!(
                    notification_id = %config.notification_id,
                    instance_id = %event.instance_id,
                    %error,
                    "Failed to enqueue notification tasks"
                );
            }
        }
    }
}
