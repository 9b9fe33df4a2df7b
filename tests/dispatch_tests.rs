//! Notification pipeline and dispatch queue integration tests: matching,
//! dedup coalescing, exclusive claims, retry backoff, and delivery logging.

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::{standard_directory, TestEnv};
use serde_json::json;
use workorder_core::{
    Channel, Clock, CoreConfig, DeliveryError, DeliveryLogStore, EventType, FlowLedger,
    InstanceAction, NotificationConfig, QueueStore, QueueTaskStatus, RecipientType,
    ResolvedRecipient, RetryPolicy, SendReceipt,
};

fn creator_email_config(event_types: Vec<EventType>) -> NotificationConfig {
    NotificationConfig {
        name: "ticket completed".to_string(),
        event_types,
        channels: vec![Channel::Email],
        recipient_types: vec![RecipientType::Creator],
        subject_template: "Ticket {{title}} {{event_type}}".to_string(),
        content_template: "{{title}} is now {{status}}".to_string(),
        ..Default::default()
    }
}

async fn complete_instance(env: &TestEnv) -> uuid::Uuid {
    let instance = env.submit("alice").await;
    env.clock.advance(Duration::seconds(1));
    env.machine
        .act(
            instance.instance_id,
            env.action(InstanceAction::Approve, "rita", "review"),
        )
        .await
        .unwrap();
    env.clock.advance(Duration::seconds(1));
    env.machine
        .act(
            instance.instance_id,
            env.action(InstanceAction::Approve, "mark", "approve"),
        )
        .await
        .unwrap();
    instance.instance_id
}

#[tokio::test]
async fn test_completed_event_enqueues_one_creator_email() {
    let config = creator_email_config(vec![EventType::Completed]);
    let env = TestEnv::new(vec![config], standard_directory()).await;

    let instance_id = complete_instance(&env).await;

    // Submitted and Approved events must not match; only the completion does
    let tasks = env.store.tasks_for_instance(instance_id).await.unwrap();
    assert_eq!(tasks.len(), 1);

    let task = &tasks[0];
    assert_eq!(task.event_type, EventType::Completed);
    assert_eq!(task.channel, Channel::Email);
    assert_eq!(task.recipient, "alice");
    assert_eq!(task.address, "alice@example.com");
    assert_eq!(task.status, QueueTaskStatus::Pending);
    assert_eq!(task.subject, "Ticket VPN access completed");
    assert_eq!(task.content, "VPN access is now completed");
}

#[tokio::test]
async fn test_disabled_config_stops_matching() {
    let mut config = creator_email_config(vec![EventType::Completed]);
    config.enabled = false;
    let env = TestEnv::new(vec![config], standard_directory()).await;

    let instance_id = complete_instance(&env).await;
    let tasks = env.store.tasks_for_instance(instance_id).await.unwrap();
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn test_every_transition_event_reaches_matching_config() {
    // Subscribing to all lifecycle event types produces one task per transition
    let config = creator_email_config(vec![
        EventType::Submitted,
        EventType::Approved,
        EventType::Completed,
    ]);
    let env = TestEnv::new(vec![config], standard_directory()).await;

    let instance_id = complete_instance(&env).await;
    let tasks = env.store.tasks_for_instance(instance_id).await.unwrap();
    let event_types: Vec<EventType> = tasks.iter().map(|t| t.event_type).collect();
    assert_eq!(
        event_types,
        vec![EventType::Submitted, EventType::Approved, EventType::Completed]
    );
}

#[tokio::test]
async fn test_dedup_window_collapses_duplicate_tasks() {
    let config = creator_email_config(vec![EventType::Completed]);
    let env = TestEnv::new(vec![], standard_directory()).await;
    let instance = env.submit("alice").await;

    let event = workorder_core::FlowEvent {
        instance_id: instance.instance_id,
        process_id: instance.process_id,
        process_version: instance.process_version,
        template_id: None,
        category: None,
        event_type: EventType::Completed,
        status: workorder_core::InstanceStatus::Completed,
        step_id: Some("approve".to_string()),
        actor: "mark".to_string(),
        priority: instance.priority,
        context: json!({"title": "VPN access"}),
        occurred_at: env.clock.now(),
    };
    let recipients = vec![ResolvedRecipient {
        recipient_type: RecipientType::Creator,
        user_id: "alice".to_string(),
        channel: Channel::Email,
        address: "alice@example.com".to_string(),
    }];

    let first = env.queue.enqueue(&config, &event, &recipients, None).await.unwrap();
    assert_eq!(first.len(), 1);

    // Identical trigger 30s later, still inside the 60s window
    env.clock.advance(Duration::seconds(30));
    let second = env.queue.enqueue(&config, &event, &recipients, None).await.unwrap();
    assert!(second.is_empty(), "duplicate inside dedup window must coalesce");

    // Past the window a fresh task is created
    env.clock.advance(Duration::seconds(61));
    let third = env.queue.enqueue(&config, &event, &recipients, None).await.unwrap();
    assert_eq!(third.len(), 1);

    let tasks = env.store.tasks_for_instance(instance.instance_id).await.unwrap();
    assert_eq!(tasks.len(), 2);
}

#[tokio::test]
async fn test_concurrent_claims_never_overlap() {
    let config = creator_email_config(vec![EventType::Completed]);
    let env = TestEnv::new(vec![config], standard_directory()).await;

    for _ in 0..6 {
        let instance_id = complete_instance(&env).await;
        // Separate instances so dedup never coalesces
        assert_eq!(env.store.tasks_for_instance(instance_id).await.unwrap().len(), 1);
    }

    let (a, b) = tokio::join!(env.queue.claim("worker-a", 4), env.queue.claim("worker-b", 4));
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(a.len() + b.len(), 6);
    for task_a in &a {
        assert!(b.iter().all(|task_b| task_b.task_id != task_a.task_id));
    }
}

#[tokio::test]
async fn test_retry_cycles_then_terminal_failure() {
    let mut config = creator_email_config(vec![EventType::Completed]);
    config.retry = Some(RetryPolicy {
        max_retries: 3,
        retry_interval_secs: 300,
    });
    let env = TestEnv::new(vec![config], standard_directory()).await;
    env.transport.fail_transient_times(8, "smtp unavailable");

    let instance_id = complete_instance(&env).await;
    let task_id = env.store.tasks_for_instance(instance_id).await.unwrap()[0].task_id;

    let mut retry_times = Vec::new();
    // Initial attempt plus three retry cycles
    for expected_retry_count in 1..=3u32 {
        assert_eq!(env.worker.run_once().await, 1);
        let task = env.store.task(task_id).await.unwrap();
        assert_eq!(task.status, QueueTaskStatus::Pending);
        assert_eq!(task.retry_count, expected_retry_count);
        let next_retry_at = task.next_retry_at.unwrap();
        retry_times.push(next_retry_at);
        env.clock.set(next_retry_at);
    }
    assert!(
        retry_times.windows(2).all(|pair| pair[0] < pair[1]),
        "next_retry_at must strictly increase across cycles"
    );

    // Fourth attempt exhausts the budget
    assert_eq!(env.worker.run_once().await, 1);
    let task = env.store.task(task_id).await.unwrap();
    assert_eq!(task.status, QueueTaskStatus::Failed);
    assert_eq!(task.retry_count, 3);
    assert_eq!(env.transport.send_count(), 4);

    // Exactly one terminal delivery log entry, carrying the last error
    let log = env.store.entries_for_task(task_id).await.unwrap();
    assert_eq!(log.len(), 1);
    assert!(!log[0].success);
    assert!(log[0].error.as_deref().unwrap().contains("smtp unavailable"));
}

#[tokio::test]
async fn test_fail_twice_then_success_logs_only_terminal_outcome() {
    let mut config = creator_email_config(vec![EventType::Completed]);
    config.retry = Some(RetryPolicy {
        max_retries: 5,
        retry_interval_secs: 300,
    });
    let env = TestEnv::new(vec![config], standard_directory()).await;
    env.transport.fail_transient_times(2, "connection reset");
    env.transport.push(Ok(SendReceipt { cost: Some(0.02) }));

    let instance_id = complete_instance(&env).await;
    let task_id = env.store.tasks_for_instance(instance_id).await.unwrap()[0].task_id;

    for _ in 0..2 {
        assert_eq!(env.worker.run_once().await, 1);
        let task = env.store.task(task_id).await.unwrap();
        env.clock.set(task.next_retry_at.unwrap());
    }
    assert_eq!(env.worker.run_once().await, 1);

    let task = env.store.task(task_id).await.unwrap();
    assert_eq!(task.status, QueueTaskStatus::Success);
    assert_eq!(task.retry_count, 2);

    // Transient failures never reach the delivery log
    let log = env.store.entries_for_task(task_id).await.unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].success);
    assert_eq!(log[0].cost, Some(0.02));
    assert_eq!(log[0].retry_count, 2);
}

#[tokio::test]
async fn test_permanent_failure_skips_retries() {
    let config = creator_email_config(vec![EventType::Completed]);
    let env = TestEnv::new(vec![config], standard_directory()).await;
    env.transport
        .push(Err(DeliveryError::Permanent("mailbox does not exist".to_string())));

    let instance_id = complete_instance(&env).await;
    let task_id = env.store.tasks_for_instance(instance_id).await.unwrap()[0].task_id;

    assert_eq!(env.worker.run_once().await, 1);
    let task = env.store.task(task_id).await.unwrap();
    assert_eq!(task.status, QueueTaskStatus::Failed);
    assert_eq!(task.retry_count, 0);
    assert_eq!(env.transport.send_count(), 1);
}

#[tokio::test]
async fn test_manual_enqueue_bypasses_flow_events() {
    let env = TestEnv::new(vec![], standard_directory()).await;
    let config = creator_email_config(vec![]);
    let recipients = vec![ResolvedRecipient {
        recipient_type: RecipientType::Custom,
        user_id: "ops".to_string(),
        channel: Channel::Email,
        address: "ops@example.com".to_string(),
    }];

    let created = env
        .queue
        .enqueue_manual(
            &config,
            &recipients,
            &json!({"title": "Maintenance window", "status": "planned"}),
            None,
        )
        .await
        .unwrap();
    assert_eq!(created.len(), 1);

    let task = env.store.task(created[0]).await.unwrap();
    assert_eq!(task.event_type, EventType::Manual);
    assert!(task.instance_id.is_none());
    assert_eq!(task.content, "Maintenance window is now planned");

    assert_eq!(env.worker.run_once().await, 1);
    let task = env.store.task(created[0]).await.unwrap();
    assert_eq!(task.status, QueueTaskStatus::Success);
    assert_eq!(env.transport.sends()[0].0, "ops@example.com");
}

#[tokio::test]
async fn test_terminal_transition_leaves_queued_tasks_deliverable() {
    // Reminder-style tasks queued before a cancellation still deliver
    let config = creator_email_config(vec![EventType::Submitted]);
    let env = TestEnv::new(vec![config], standard_directory()).await;

    let instance = env.submit("alice").await;
    env.machine
        .act(
            instance.instance_id,
            env.action(InstanceAction::Cancel, "alice", "review"),
        )
        .await
        .unwrap();

    assert_eq!(env.worker.run_once().await, 1);
    let tasks = env.store.tasks_for_instance(instance.instance_id).await.unwrap();
    assert_eq!(tasks[0].status, QueueTaskStatus::Success);
}

#[tokio::test]
async fn test_missing_assignee_resolves_softly() {
    // Assignee recipient on an unassigned instance drops with a warning
    // while the creator tuple still resolves
    let mut config = creator_email_config(vec![EventType::Submitted]);
    config.recipient_types = vec![RecipientType::Assignee, RecipientType::Creator];
    let env = TestEnv::new(vec![config], standard_directory()).await;

    let instance = env.submit("alice").await;
    let tasks = env.store.tasks_for_instance(instance.instance_id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].recipient, "alice");
}

#[tokio::test]
async fn test_worker_run_stops_on_shutdown() {
    let env = TestEnv::new(vec![], standard_directory()).await;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let worker = env.worker;
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("worker must stop after shutdown signal")
        .unwrap();
}

#[tokio::test]
async fn test_worker_stops_when_shutdown_sender_drops() {
    // A host that drops the sender without signalling must still stop the
    // worker instead of leaving it polling a closed channel
    let env = TestEnv::new(vec![], standard_directory()).await;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let worker = env.worker;
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    drop(shutdown_tx);
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("worker must stop when the shutdown sender is dropped")
        .unwrap();
}

#[tokio::test]
async fn test_missing_retry_policy_uses_core_defaults() {
    let core = CoreConfig {
        default_max_retries: 5,
        default_retry_interval_secs: 60,
        ..CoreConfig::default()
    };
    // creator_email_config carries no retry policy of its own
    let config = creator_email_config(vec![EventType::Completed]);
    let env = TestEnv::with_core_config(vec![config], standard_directory(), core).await;

    let instance_id = complete_instance(&env).await;
    let tasks = env.store.tasks_for_instance(instance_id).await.unwrap();
    assert_eq!(tasks[0].max_retries, 5);
    assert_eq!(tasks[0].retry_interval_secs, 60);
}

#[tokio::test]
async fn test_flow_ledger_survives_notification_failures() {
    // No email transport address for the creator: resolution drops the
    // recipient, yet the transition itself succeeds and is recorded
    let config = creator_email_config(vec![EventType::Submitted]);
    let directory = common::MockDirectory::new()
        .with_role("reviewer", &["rita"])
        .with_role("manager", &["mark"]);
    let env = TestEnv::new(vec![config], directory).await;

    let instance = env.submit("alice").await;
    let entries = env.store.entries_for(instance.instance_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(env.store.tasks_for_instance(instance.instance_id).await.unwrap().is_empty());
}
