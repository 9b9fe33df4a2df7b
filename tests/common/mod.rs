//! Shared fixtures and test doubles for the integration suite.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use workorder_core::{
    ActionRequest, Channel, ChannelTransport, Clock, ConfigCache, CoreConfig, DefinitionStore,
    DeliveryError, DirectoryService, DispatchQueue, DispatchWorker, FlowResult, Instance,
    InstanceAction, ManualClock, MemoryStore, NotificationConfig, NotificationPipeline,
    PlaceholderRenderer, Priority, ProcessDefinition, RecipientResolver, SendReceipt, SendResult,
    StepDefinition, SubmitRequest, WorkorderStateMachine,
};

/// Static directory double with role/department/group membership, managers,
/// and per-channel addresses
#[derive(Default)]
pub struct MockDirectory {
    roles: HashMap<String, Vec<String>>,
    departments: HashMap<String, Vec<String>>,
    groups: HashMap<String, Vec<String>>,
    managers: HashMap<String, String>,
    addresses: HashMap<(String, Channel), String>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: &str, members: &[&str]) -> Self {
        self.roles
            .insert(role.to_string(), members.iter().map(|m| m.to_string()).collect());
        self
    }

    pub fn with_department(mut self, department: &str, members: &[&str]) -> Self {
        self.departments.insert(
            department.to_string(),
            members.iter().map(|m| m.to_string()).collect(),
        );
        self
    }

    pub fn with_group(mut self, group: &str, members: &[&str]) -> Self {
        self.groups
            .insert(group.to_string(), members.iter().map(|m| m.to_string()).collect());
        self
    }

    pub fn with_manager(mut self, user: &str, manager: &str) -> Self {
        self.managers.insert(user.to_string(), manager.to_string());
        self
    }

    pub fn with_address(mut self, user: &str, channel: Channel, address: &str) -> Self {
        self.addresses
            .insert((user.to_string(), channel), address.to_string());
        self
    }
}

#[async_trait]
impl DirectoryService for MockDirectory {
    async fn user_in_role(&self, user_id: &str, role: &str) -> FlowResult<bool> {
        Ok(self
            .roles
            .get(role)
            .map(|members| members.iter().any(|m| m == user_id))
            .unwrap_or(false))
    }

    async fn role_members(&self, role: &str) -> FlowResult<Vec<String>> {
        Ok(self.roles.get(role).cloned().unwrap_or_default())
    }

    async fn department_members(&self, department: &str) -> FlowResult<Vec<String>> {
        Ok(self.departments.get(department).cloned().unwrap_or_default())
    }

    async fn group_members(&self, group: &str) -> FlowResult<Vec<String>> {
        Ok(self.groups.get(group).cloned().unwrap_or_default())
    }

    async fn manager_of(&self, user_id: &str) -> FlowResult<Option<String>> {
        Ok(self.managers.get(user_id).cloned())
    }

    async fn address_for(&self, user_id: &str, channel: Channel) -> FlowResult<Option<String>> {
        Ok(self.addresses.get(&(user_id.to_string(), channel)).cloned())
    }
}

/// Transport double that replays a scripted outcome sequence and records
/// every attempted send. An exhausted script succeeds.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<SendResult>>,
    sent: Mutex<Vec<(String, String, String)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: SendResult) {
        self.script.lock().push_back(result);
    }

    pub fn fail_transient_times(&self, times: usize, message: &str) {
        let mut script = self.script.lock();
        for _ in 0..times {
            script.push_back(Err(DeliveryError::Transient(message.to_string())));
        }
    }

    pub fn sends(&self) -> Vec<(String, String, String)> {
        self.sent.lock().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl ChannelTransport for ScriptedTransport {
    async fn send(&self, address: &str, subject: &str, content: &str) -> SendResult {
        self.sent.lock().push((
            address.to_string(),
            subject.to_string(),
            content.to_string(),
        ));
        self.script
            .lock()
            .pop_front()
            .unwrap_or(Ok(SendReceipt::default()))
    }
}

/// Two-step review/approve definition used across the suite
pub fn review_process() -> ProcessDefinition {
    let actions = vec![
        InstanceAction::Approve,
        InstanceAction::Reject,
        InstanceAction::Transfer,
        InstanceAction::Revoke,
        InstanceAction::Cancel,
    ];
    ProcessDefinition {
        process_id: Uuid::new_v4(),
        version: 1,
        name: "Access request".to_string(),
        category: Some("it".to_string()),
        template_id: Some("tmpl-access".to_string()),
        steps: vec![
            StepDefinition {
                step_id: "review".to_string(),
                name: "Review".to_string(),
                required_role: "reviewer".to_string(),
                allowed_actions: actions.clone(),
            },
            StepDefinition {
                step_id: "approve".to_string(),
                name: "Approve".to_string(),
                required_role: "manager".to_string(),
                allowed_actions: actions,
            },
        ],
    }
}

/// Directory covering the review_process roles plus email addresses
pub fn standard_directory() -> MockDirectory {
    MockDirectory::new()
        .with_role("reviewer", &["rita"])
        .with_role("manager", &["mark"])
        .with_manager("alice", "mark")
        .with_address("alice", Channel::Email, "alice@example.com")
        .with_address("rita", Channel::Email, "rita@example.com")
        .with_address("mark", Channel::Email, "mark@example.com")
}

/// Fully wired machine + pipeline + queue over one in-memory store
pub struct TestEnv {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub configs: Arc<ConfigCache>,
    pub queue: Arc<DispatchQueue>,
    pub machine: WorkorderStateMachine,
    pub transport: Arc<ScriptedTransport>,
    pub worker: DispatchWorker,
    pub definition: ProcessDefinition,
}

impl TestEnv {
    pub async fn new(configs: Vec<NotificationConfig>, directory: MockDirectory) -> Self {
        Self::with_core_config(configs, directory, CoreConfig::default()).await
    }

    pub async fn with_core_config(
        configs: Vec<NotificationConfig>,
        directory: MockDirectory,
        core_config: CoreConfig,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        let directory: Arc<dyn DirectoryService> = Arc::new(directory);

        let queue = Arc::new(DispatchQueue::new(
            store.clone(),
            store.clone(),
            Arc::new(PlaceholderRenderer),
            clock.clone(),
            core_config.clone(),
        ));

        let config_cache = Arc::new(ConfigCache::new(configs, clock.now()));
        let pipeline = Arc::new(NotificationPipeline::new(
            config_cache.clone(),
            RecipientResolver::new(directory.clone()),
            queue.clone(),
            store.clone(),
        ));

        let machine = WorkorderStateMachine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            directory,
            pipeline,
            clock.clone(),
        );

        let transport = Arc::new(ScriptedTransport::new());
        let mut transports: HashMap<Channel, Arc<dyn ChannelTransport>> = HashMap::new();
        transports.insert(Channel::Email, transport.clone());
        let worker = DispatchWorker::new("worker-1", queue.clone(), transports, core_config.worker);

        let definition = review_process();
        store
            .put(definition.clone())
            .await
            .expect("definition insert");

        Self {
            store,
            clock,
            configs: config_cache,
            queue,
            machine,
            transport,
            worker,
            definition,
        }
    }

    pub async fn submit(&self, creator: &str) -> Instance {
        self.machine
            .submit(
                self.definition.process_id,
                SubmitRequest {
                    title: "VPN access".to_string(),
                    creator: creator.to_string(),
                    priority: Priority::Normal,
                    form_data: serde_json::json!({"reason": "remote work"}),
                    due_at: None,
                },
            )
            .await
            .expect("submit")
    }

    pub fn action(
        &self,
        action: InstanceAction,
        operator: &str,
        expected_step_id: &str,
    ) -> ActionRequest {
        ActionRequest {
            action,
            operator: operator.to_string(),
            comment: None,
            target_user: None,
            form_data_patch: None,
            expected_step_id: expected_step_id.to_string(),
        }
    }
}
