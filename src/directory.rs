//! External directory collaborator.
//!
//! Role, department, and group membership live outside this core. The
//! resolver and the state machine treat the directory as an opaque
//! capability instead of traversing relational fan-out themselves.

use async_trait::async_trait;

use crate::error::FlowResult;
use crate::models::notification::Channel;

#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Whether the user currently holds the named role
    async fn user_in_role(&self, user_id: &str, role: &str) -> FlowResult<bool>;

    /// Expand a role into its member user ids
    async fn role_members(&self, role: &str) -> FlowResult<Vec<String>>;

    /// Expand a department into its member user ids
    async fn department_members(&self, department: &str) -> FlowResult<Vec<String>>;

    /// Expand a group into its member user ids
    async fn group_members(&self, group: &str) -> FlowResult<Vec<String>>;

    /// The user's direct manager, if one is on record
    async fn manager_of(&self, user_id: &str) -> FlowResult<Option<String>>;

    /// The user's deliverable address on the given channel, if provisioned
    async fn address_for(&self, user_id: &str, channel: Channel) -> FlowResult<Option<String>>;
}
