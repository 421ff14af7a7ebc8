//! Tests for the evaluation worker.
//!
//! Run against the in-memory store with the real sandbox engine, covering
//! the full lease → evaluate → alert → ack path.

use super::*;
use std::time::Duration;
use tripwire_core::source::{github, SourceKind};
use tripwire_core::store::QueueState;
use tripwire_core::{AlertLevel, EvaluationType, RuleId, TenantId, Webhook};
use tripwire_store::MemoryEventStore;

// ============================================================================
// Helpers
// ============================================================================

fn unreviewed_merge_payload() -> serde_json::Value {
    serde_json::json!({
        "action": "closed",
        "pull_request": {
            "merged": true,
            "assignees": [],
            "requested_reviewers": [],
            "comments": 0,
            "html_url": "https://github.com/acme/app/pull/42"
        }
    })
}

fn pull_request_event(payload: serde_json::Value) -> Event {
    let webhook = Webhook::new(
        TenantId::default_tenant(),
        "gh".to_string(),
        SourceKind::Github,
        vec![],
    );
    Event::new(
        &webhook,
        "pull_request".to_string(),
        payload
            .get("action")
            .and_then(|a| a.as_str())
            .map(String::from),
        payload,
        None,
    )
}

fn rule_with_sql(sql: &str, active: bool) -> Rule {
    Rule {
        id: RuleId::new(),
        tenant_id: TenantId::default_tenant(),
        name: "unreviewed merge".to_string(),
        description: None,
        source: SourceKind::Github,
        event_type: "pull_request".to_string(),
        sql: sql.to_string(),
        evaluation_type: EvaluationType::LiveTrigger,
        alert_level: AlertLevel::High,
        active,
        created_at: Utc::now(),
    }
}

fn evaluator(store: &Arc<MemoryEventStore>) -> Evaluator {
    Evaluator::new(store.clone(), WorkerConfig::evaluator())
}

// ============================================================================
// Pass behaviour
// ============================================================================

/// An empty queue is idle, not an error.
#[tokio::test]
async fn test_empty_queue_is_idle() {
    let store = Arc::new(MemoryEventStore::new());
    let worked = evaluator(&store).execute_once().await.unwrap();
    assert!(!worked);
}

/// The seeded GitHub rule matching its canonical payload raises one alert
/// and completes the event.
#[tokio::test]
async fn test_matching_rule_raises_alert() {
    let store = Arc::new(MemoryEventStore::new());
    let rule = rule_with_sql(github::UNREVIEWED_MERGE_RULE_SQL, true);
    let event = pull_request_event(unreviewed_merge_payload());

    store.create_rule(&rule).await.unwrap();
    store.insert_event_with_queue(&event).await.unwrap();

    let worked = evaluator(&store).execute_once().await.unwrap();
    assert!(worked);

    let alerts = store.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].rule_id, rule.id);
    assert_eq!(alerts[0].event_id, event.id);
    assert!(!alerts[0].notified);

    // The alert queue entry exists and the event is done.
    assert_eq!(
        store.alert_queue_entry(alerts[0].id).unwrap().state,
        QueueState::Pending
    );
    assert_eq!(
        store.event_queue_entry(event.id).unwrap().state,
        QueueState::Done
    );
}

/// A non-matching payload completes the event without raising anything.
#[tokio::test]
async fn test_non_matching_payload_raises_nothing() {
    let store = Arc::new(MemoryEventStore::new());
    let rule = rule_with_sql(github::UNREVIEWED_MERGE_RULE_SQL, true);
    let mut payload = unreviewed_merge_payload();
    payload["pull_request"]["comments"] = serde_json::json!(3);

    store.create_rule(&rule).await.unwrap();
    let event = pull_request_event(payload);
    store.insert_event_with_queue(&event).await.unwrap();

    evaluator(&store).execute_once().await.unwrap();

    assert!(store.alerts().is_empty());
    assert_eq!(
        store.event_queue_entry(event.id).unwrap().state,
        QueueState::Done
    );
}

/// An inactive rule does not participate in evaluation.
#[tokio::test]
async fn test_inactive_rule_is_skipped() {
    let store = Arc::new(MemoryEventStore::new());
    let rule = rule_with_sql(github::UNREVIEWED_MERGE_RULE_SQL, false);
    let event = pull_request_event(unreviewed_merge_payload());

    store.create_rule(&rule).await.unwrap();
    store.insert_event_with_queue(&event).await.unwrap();

    evaluator(&store).execute_once().await.unwrap();

    assert!(store.alerts().is_empty());
    assert_eq!(
        store.event_queue_entry(event.id).unwrap().state,
        QueueState::Done
    );
}

// ============================================================================
// Failure semantics
// ============================================================================

/// A rule with broken SQL is logged and skipped; later rules still run and
/// the event still completes.
#[tokio::test]
async fn test_bad_rule_does_not_stop_the_pass() {
    let store = Arc::new(MemoryEventStore::new());

    let mut broken = rule_with_sql("SELECT * FROM missing_table", true);
    broken.created_at = Utc::now() - chrono::Duration::seconds(10);
    let good = rule_with_sql(github::UNREVIEWED_MERGE_RULE_SQL, true);

    store.create_rule(&broken).await.unwrap();
    store.create_rule(&good).await.unwrap();

    let event = pull_request_event(unreviewed_merge_payload());
    store.insert_event_with_queue(&event).await.unwrap();

    evaluator(&store).execute_once().await.unwrap();

    let alerts = store.alerts();
    assert_eq!(alerts.len(), 1, "the good rule must still raise its alert");
    assert_eq!(alerts[0].rule_id, good.id);
    assert_eq!(
        store.event_queue_entry(event.id).unwrap().state,
        QueueState::Done
    );
}

/// Blank rule SQL behaves like any other per-rule failure.
#[tokio::test]
async fn test_empty_rule_sql_is_skipped() {
    let store = Arc::new(MemoryEventStore::new());
    let empty = rule_with_sql("  ", true);
    let event = pull_request_event(unreviewed_merge_payload());

    store.create_rule(&empty).await.unwrap();
    store.insert_event_with_queue(&event).await.unwrap();

    evaluator(&store).execute_once().await.unwrap();

    assert!(store.alerts().is_empty());
    assert_eq!(
        store.event_queue_entry(event.id).unwrap().state,
        QueueState::Done
    );
}

// ============================================================================
// Crash recovery
// ============================================================================

/// An event leased by a worker that died is re-leased after expiry and
/// processed to completion, without duplicating its alert.
#[tokio::test]
async fn test_expired_lease_reprocesses_without_duplicates() {
    let store = Arc::new(MemoryEventStore::new());
    let rule = rule_with_sql(github::UNREVIEWED_MERGE_RULE_SQL, true);
    let event = pull_request_event(unreviewed_merge_payload());

    store.create_rule(&rule).await.unwrap();
    store.insert_event_with_queue(&event).await.unwrap();

    // A worker leases the event, raises the alert, then dies before
    // marking the event done.
    let leased = store.lease_next_event("crashed-worker").await.unwrap();
    assert_eq!(leased, event.id);
    store
        .insert_alert_with_queue(&Alert::new(&rule, &event))
        .await
        .unwrap();
    store.backdate_event_lease(event.id, Duration::from_secs(120));

    // The healthy evaluator picks the event up again.
    let worked = evaluator(&store).execute_once().await.unwrap();
    assert!(worked);

    assert_eq!(store.alerts().len(), 1, "re-processing must not duplicate");
    assert_eq!(
        store.event_queue_entry(event.id).unwrap().state,
        QueueState::Done
    );
}
