//! # Recipient Resolver
//!
//! Expands a matched configuration's recipient-type set into concrete
//! (recipient, channel, address) tuples through the directory collaborator.
//! Resolution fails softly: an unresolvable recipient type logs a warning
//! and is dropped, never aborting the rest of the expansion.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::directory::DirectoryService;
use crate::models::flow::FlowEvent;
use crate::models::instance::Instance;
use crate::models::notification::{Channel, NotificationConfig, RecipientType};

/// One deliverable (recipient, channel) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecipient {
    pub recipient_type: RecipientType,
    pub user_id: String,
    pub channel: Channel,
    pub address: String,
}

pub struct RecipientResolver {
    directory: Arc<dyn DirectoryService>,
}

impl RecipientResolver {
    pub fn new(directory: Arc<dyn DirectoryService>) -> Self {
        Self { directory }
    }

    /// Expand the configuration's recipient types across its channels.
    ///
    /// The same resolved user on the same channel contributes exactly one
    /// tuple even when reachable through multiple recipient types.
    pub async fn resolve(
        &self,
        config: &NotificationConfig,
        event: &FlowEvent,
        instance: Option<&Instance>,
    ) -> Vec<ResolvedRecipient> {
        let mut resolved = Vec::new();
        let mut seen: HashSet<(String, Channel)> = HashSet::new();

        for recipient_type in &config.recipient_types {
            let users = self.users_for(*recipient_type, config, event, instance).await;
            for user_id in users {
                for channel in &config.channels {
                    if seen.contains(&(user_id.clone(), *channel)) {
                        continue;
                    }
                    // Mark the pair only once an address resolves: a later
                    // recipient type (e.g. a Custom literal) may still be
                    // able to reach a user this one could not
                    match self.address_for(&user_id, *channel, *recipient_type).await {
                        Some(address) => {
                            seen.insert((user_id.clone(), *channel));
                            resolved.push(ResolvedRecipient {
                                recipient_type: *recipient_type,
                                user_id: user_id.clone(),
                                channel: *channel,
                                address,
                            });
                        }
                        None => {
                            warn!(
                                user_id = %user_id,
                                channel = %channel,
                                notification_id = %config.notification_id,
                                "No address for recipient on channel; dropping"
                            );
                        }
                    }
                }
            }
        }

        resolved
    }

    async fn users_for(
        &self,
        recipient_type: RecipientType,
        config: &NotificationConfig,
        event: &FlowEvent,
        instance: Option<&Instance>,
    ) -> Vec<String> {
        match recipient_type {
            RecipientType::Creator => match instance {
                Some(instance) => vec![instance.creator.clone()],
                None => {
                    warn!(instance_id = %event.instance_id, "Creator recipient without instance; dropping");
                    Vec::new()
                }
            },
            RecipientType::Assignee => match instance.and_then(|i| i.assignee.clone()) {
                Some(assignee) => vec![assignee],
                None => {
                    warn!(instance_id = %event.instance_id, "No assignee to notify; dropping");
                    Vec::new()
                }
            },
            RecipientType::Manager => {
                let Some(instance) = instance else {
                    warn!(instance_id = %event.instance_id, "Manager recipient without instance; dropping");
                    return Vec::new();
                };
                match self.directory.manager_of(&instance.creator).await {
                    Ok(Some(manager)) => vec![manager],
                    Ok(None) => {
                        warn!(creator = %instance.creator, "Creator has no manager on record; dropping");
                        Vec::new()
                    }
                    Err(error) => {
                        warn!(creator = %instance.creator, %error, "Manager lookup failed; dropping");
                        Vec::new()
                    }
                }
            }
            RecipientType::Role => {
                let mut users = Vec::new();
                for role in &config.roles {
                    match self.directory.role_members(role).await {
                        Ok(members) => users.extend(members),
                        Err(error) => {
                            warn!(role = %role, %error, "Role expansion failed; dropping");
                        }
                    }
                }
                users
            }
            RecipientType::Department => {
                let mut users = Vec::new();
                for department in &config.departments {
                    match self.directory.department_members(department).await {
                        Ok(members) => users.extend(members),
                        Err(error) => {
                            warn!(department = %department, %error, "Department expansion failed; dropping");
                        }
                    }
                }
                users
            }
            RecipientType::Group => {
                let mut users = Vec::new();
                for group in &config.groups {
                    match self.directory.group_members(group).await {
                        Ok(members) => users.extend(members),
                        Err(error) => {
                            warn!(group = %group, %error, "Group expansion failed; dropping");
                        }
                    }
                }
                users
            }
            RecipientType::Custom => config.custom_users.clone(),
        }
    }

    /// Address lookup; custom recipients fall back to the literal entry so
    /// configurations can list raw addresses directly
    async fn address_for(
        &self,
        user_id: &str,
        channel: Channel,
        recipient_type: RecipientType,
    ) -> Option<String> {
        match self.directory.address_for(user_id, channel).await {
            Ok(Some(address)) => Some(address),
            Ok(None) if recipient_type == RecipientType::Custom => Some(user_id.to_string()),
            Ok(None) => None,
            Err(error) => {
                warn!(user_id = %user_id, channel = %channel, %error, "Address lookup failed");
                None
            }
        }
    }
}
