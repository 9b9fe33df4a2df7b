//! # Notification Matcher
//!
//! Selects the enabled configurations a flow event should fan out to.
//! Matching is a pure function over an explicit configuration snapshot;
//! the snapshot is reloaded through `ConfigCache` on explicit invalidation
//! rather than hiding behind a process-wide singleton.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use crate::models::flow::FlowEvent;
use crate::models::notification::{NotificationConfig, TriggerType};

/// Immutable view of the configuration set at one point in time
#[derive(Clone)]
pub struct ConfigSnapshot {
    configs: Arc<Vec<NotificationConfig>>,
    pub loaded_at: DateTime<Utc>,
}

impl ConfigSnapshot {
    pub fn new(configs: Vec<NotificationConfig>, loaded_at: DateTime<Utc>) -> Self {
        Self {
            configs: Arc::new(configs),
            loaded_at,
        }
    }

    pub fn configs(&self) -> &[NotificationConfig] {
        &self.configs
    }
}

/// Reloadable holder for the current configuration snapshot.
///
/// Disabling a configuration takes effect on the next reload: future
/// matches stop immediately, in-flight tasks complete.
pub struct ConfigCache {
    current: RwLock<ConfigSnapshot>,
}

impl ConfigCache {
    pub fn new(configs: Vec<NotificationConfig>, now: DateTime<Utc>) -> Self {
        Self {
            current: RwLock::new(ConfigSnapshot::new(configs, now)),
        }
    }

    pub fn reload(&self, configs: Vec<NotificationConfig>, now: DateTime<Utc>) {
        let mut current = self.current.write();
        *current = ConfigSnapshot::new(configs, now);
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        self.current.read().clone()
    }
}

/// Select matching configurations for a flow event.
///
/// A configuration matches when it is enabled, lists the event type, its
/// scope covers the event's process/template/category, and its trigger
/// condition (for condition triggers) evaluates true. Results are ordered
/// by priority descending, tie-broken by notification id so test runs are
/// reproducible.
pub fn match_event<'a>(
    snapshot: &'a ConfigSnapshot,
    event: &FlowEvent,
) -> Vec<&'a NotificationConfig> {
    let mut matched: Vec<&NotificationConfig> = snapshot
        .configs()
        .iter()
        .filter(|config| {
            config.enabled
                && config.event_types.contains(&event.event_type)
                && config.scope.matches(event)
                && condition_holds(config, event)
        })
        .collect();

    matched.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.notification_id.cmp(&b.notification_id))
    });

    debug!(
        event_type = %event.event_type,
        instance_id = %event.instance_id,
        matched = matched.len(),
        "Matched notification configurations"
    );

    matched
}

fn condition_holds(config: &NotificationConfig, event: &FlowEvent) -> bool {
    if config.trigger != TriggerType::Condition {
        return true;
    }
    match &config.condition {
        Some(condition) => condition.evaluate(event),
        // A condition trigger without a predicate never fires
        None => false,
    }
}
