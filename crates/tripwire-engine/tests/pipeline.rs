//! Two-stage pipeline test: an accepted event flows through the evaluator
//! into an alert, and through the alerter into a recorded delivery.
//!
//! Uses the in-memory store and a `wiremock` Slack endpoint; each worker
//! runs via `execute_once`, exactly what the tick loop drives.

use std::sync::Arc;

use tripwire_core::notify::{ChannelKind, NotifierRegistry};
use tripwire_core::source::{github, SourceKind, SourceRegistry};
use tripwire_core::store::{EventStore, QueueState};
use tripwire_core::{
    AlertLevel, ChannelId, DeliveryStatus, EvaluationType, Event, NotificationChannel, Rule,
    RuleId, TenantId, Webhook,
};
use tripwire_engine::{Alerter, Evaluator, WorkerConfig};
use tripwire_store::MemoryEventStore;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn seed_rule() -> Rule {
    Rule {
        id: RuleId::new(),
        tenant_id: TenantId::default_tenant(),
        name: "unreviewed merge".to_string(),
        description: Some("PR merged with nobody looking".to_string()),
        source: SourceKind::Github,
        event_type: "pull_request".to_string(),
        sql: github::UNREVIEWED_MERGE_RULE_SQL.to_string(),
        evaluation_type: EvaluationType::LiveTrigger,
        alert_level: AlertLevel::High,
        active: true,
        created_at: chrono::Utc::now(),
    }
}

fn merged_pr_event(webhook: &Webhook) -> Event {
    Event::new(
        webhook,
        "pull_request".to_string(),
        Some("closed".to_string()),
        serde_json::json!({
            "action": "closed",
            "pull_request": {
                "merged": true,
                "assignees": [],
                "requested_reviewers": [],
                "comments": 0,
                "html_url": "https://github.com/acme/app/pull/42"
            }
        }),
        None,
    )
}

/// The canonical scenario: a merged PR with no reviewers produces one
/// event, one alert, and one delivered row on the attached channel.
#[tokio::test]
async fn merged_pr_without_reviewers_reaches_slack() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryEventStore::new());
    let tenant = TenantId::default_tenant();

    // Operator setup: webhook, seeded rule, Slack channel, destination.
    let webhook = Webhook::new(
        tenant,
        "gh".to_string(),
        SourceKind::Github,
        vec!["pull_request".to_string()],
    );
    store.create_webhook(&webhook).await.unwrap();

    let rule = seed_rule();
    store.create_rule(&rule).await.unwrap();

    let channel = NotificationChannel {
        id: ChannelId::new(),
        tenant_id: tenant,
        name: "ops".to_string(),
        kind: ChannelKind::Slack,
        config: serde_json::json!({"webhook_url": format!("{}/hook", server.uri())}),
        created_at: chrono::Utc::now(),
    };
    store.create_channel(&channel).await.unwrap();
    store
        .add_rule_destination(tenant, rule.id, channel.id)
        .await
        .unwrap();

    // Ingest stage outcome: the event and its pending queue entry.
    let event = merged_pr_event(&webhook);
    store.insert_event_with_queue(&event).await.unwrap();

    // Evaluation stage: one tick.
    let evaluator = Evaluator::new(store.clone(), WorkerConfig::evaluator());
    assert!(evaluator.execute_once().await.unwrap());

    let alerts = store.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].rule_id, rule.id);
    assert_eq!(alerts[0].event_id, event.id);

    // Notification stage: one tick.
    let alerter = Alerter::new(
        store.clone(),
        Arc::new(NotifierRegistry::with_builtin_channels().unwrap()),
        Arc::new(SourceRegistry::with_builtin_sources()),
        WorkerConfig::alerter(),
    );
    assert!(alerter.execute_once().await.unwrap());

    let deliveries = store.deliveries_for(alerts[0].id);
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].status, DeliveryStatus::Delivered);
    assert_eq!(deliveries[0].channel_id, channel.id);

    assert_eq!(
        store.event_queue_entry(event.id).unwrap().state,
        QueueState::Done
    );
    assert_eq!(
        store.alert_queue_entry(alerts[0].id).unwrap().state,
        QueueState::Done
    );
    assert!(store.get_alert(alerts[0].id).await.unwrap().notified);

    // The Slack payload carries the rendered rule context.
    let requests = server.received_requests().await.unwrap();
    let text = serde_json::from_slice::<serde_json::Value>(&requests[0].body).unwrap()["text"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(text.contains("unreviewed merge"));
    assert!(text.contains("https://github.com/acme/app/pull/42"));
}

/// Events drain in arrival order across consecutive ticks.
#[tokio::test]
async fn events_drain_in_received_order() {
    let store = Arc::new(MemoryEventStore::new());
    let webhook = Webhook::new(
        TenantId::default_tenant(),
        "gh".to_string(),
        SourceKind::Github,
        vec![],
    );
    store.create_webhook(&webhook).await.unwrap();

    let mut first = merged_pr_event(&webhook);
    first.received_at = chrono::Utc::now() - chrono::Duration::seconds(5);
    let second = merged_pr_event(&webhook);

    store.insert_event_with_queue(&second).await.unwrap();
    store.insert_event_with_queue(&first).await.unwrap();

    let evaluator = Evaluator::new(store.clone(), WorkerConfig::evaluator());
    assert!(evaluator.execute_once().await.unwrap());

    // After one tick only the older event is done.
    assert_eq!(
        store.event_queue_entry(first.id).unwrap().state,
        QueueState::Done
    );
    assert_eq!(
        store.event_queue_entry(second.id).unwrap().state,
        QueueState::Pending
    );

    assert!(evaluator.execute_once().await.unwrap());
    assert_eq!(
        store.event_queue_entry(second.id).unwrap().state,
        QueueState::Done
    );

    // Third tick: queue drained.
    assert!(!evaluator.execute_once().await.unwrap());
}
