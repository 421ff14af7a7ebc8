//! Tests for the per-event SQL sandbox.
//!
//! These run against the real embedded engine; every sandbox is opened,
//! used once, and dropped, exactly as the evaluator does.

use super::*;
use crate::source::{github, SourceKind};
use crate::{AlertLevel, EvaluationType, RuleId, TenantId, Webhook};
use chrono::Utc;

// ============================================================================
// Helpers
// ============================================================================

fn event_with_payload(payload: serde_json::Value) -> Event {
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

fn rule_with_sql(sql: &str) -> Rule {
    Rule {
        id: RuleId::new(),
        tenant_id: TenantId::default_tenant(),
        name: "test rule".to_string(),
        description: None,
        source: SourceKind::Github,
        event_type: "pull_request".to_string(),
        sql: sql.to_string(),
        evaluation_type: EvaluationType::LiveTrigger,
        alert_level: AlertLevel::Medium,
        active: true,
        created_at: Utc::now(),
    }
}

/// The payload of the canonical "merged with nobody looking" scenario.
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

// ============================================================================
// Lifecycle tests
// ============================================================================

mod lifecycle_tests {
    use super::*;

    #[test]
    fn test_open_add_execute_close() {
        let sandbox = Sandbox::open().unwrap();
        sandbox
            .add_event(&event_with_payload(serde_json::json!({"k": "v"})))
            .unwrap();
        let count = sandbox
            .execute_rule(&rule_with_sql("SELECT * FROM events"))
            .unwrap();
        assert_eq!(count, 1);
        sandbox.close().unwrap();
    }

    /// The `events` table holds exactly the inserted row.
    #[test]
    fn test_single_row_relation() {
        let sandbox = Sandbox::open().unwrap();
        let event = event_with_payload(serde_json::json!({}));
        sandbox.add_event(&event).unwrap();

        let count = sandbox
            .execute_rule(&rule_with_sql(&format!(
                "SELECT id FROM events WHERE id = '{}'",
                event.id
            )))
            .unwrap();
        assert_eq!(count, 1);
    }
}

// ============================================================================
// Match semantics tests
// ============================================================================

mod match_semantics_tests {
    use super::*;

    /// JSON path extraction over the raw payload drives matching.
    #[test]
    fn test_json_extraction_matches() {
        let sandbox = Sandbox::open().unwrap();
        sandbox
            .add_event(&event_with_payload(serde_json::json!({
                "action": "closed",
                "pull_request": {"merged": true}
            })))
            .unwrap();

        let matched = sandbox
            .execute_rule(&rule_with_sql(
                "SELECT id FROM events \
                 WHERE json_extract(raw_payload, '$.action') = 'closed' \
                   AND json_extract(raw_payload, '$.pull_request.merged') = 1",
            ))
            .unwrap();
        assert_eq!(matched, 1);
    }

    /// A predicate that does not hold returns zero rows.
    #[test]
    fn test_non_matching_predicate_returns_zero() {
        let sandbox = Sandbox::open().unwrap();
        sandbox
            .add_event(&event_with_payload(serde_json::json!({"action": "opened"})))
            .unwrap();

        let matched = sandbox
            .execute_rule(&rule_with_sql(
                "SELECT id FROM events WHERE json_extract(raw_payload, '$.action') = 'closed'",
            ))
            .unwrap();
        assert_eq!(matched, 0);
    }

    /// The seeded GitHub rule matches its canonical payload.
    #[test]
    fn test_seeded_rule_matches_unreviewed_merge() {
        let sandbox = Sandbox::open().unwrap();
        sandbox
            .add_event(&event_with_payload(unreviewed_merge_payload()))
            .unwrap();

        let matched = sandbox
            .execute_rule(&rule_with_sql(github::UNREVIEWED_MERGE_RULE_SQL))
            .unwrap();
        assert_eq!(matched, 1);
    }

    /// One comment on the PR is enough to not match the seeded rule.
    #[test]
    fn test_seeded_rule_skips_commented_merge() {
        let mut payload = unreviewed_merge_payload();
        payload["pull_request"]["comments"] = serde_json::json!(2);

        let sandbox = Sandbox::open().unwrap();
        sandbox.add_event(&event_with_payload(payload)).unwrap();

        let matched = sandbox
            .execute_rule(&rule_with_sql(github::UNREVIEWED_MERGE_RULE_SQL))
            .unwrap();
        assert_eq!(matched, 0);
    }

    /// Executing the same rule twice yields the same count: the sandbox is
    /// a pure function of (rule SQL, event payload).
    #[test]
    fn test_execution_is_deterministic() {
        let sandbox = Sandbox::open().unwrap();
        sandbox
            .add_event(&event_with_payload(unreviewed_merge_payload()))
            .unwrap();

        let rule = rule_with_sql(github::UNREVIEWED_MERGE_RULE_SQL);
        let first = sandbox.execute_rule(&rule).unwrap();
        let second = sandbox.execute_rule(&rule).unwrap();
        assert_eq!(first, second);
    }
}

// ============================================================================
// Error tests
// ============================================================================

mod error_tests {
    use super::*;

    #[test]
    fn test_empty_sql_rejected() {
        let sandbox = Sandbox::open().unwrap();
        sandbox
            .add_event(&event_with_payload(serde_json::json!({})))
            .unwrap();

        let err = sandbox.execute_rule(&rule_with_sql("   ")).unwrap_err();
        assert!(matches!(err, SandboxError::EmptySql));
    }

    /// Engine errors preserve the engine's message.
    #[test]
    fn test_execution_error_preserves_engine_message() {
        let sandbox = Sandbox::open().unwrap();
        let err = sandbox
            .execute_rule(&rule_with_sql("SELECT * FROM no_such_table"))
            .unwrap_err();

        match err {
            SandboxError::Execution { message } => {
                assert!(
                    message.contains("no_such_table"),
                    "engine message should name the missing table, got: {message}"
                );
            }
            other => panic!("expected Execution error, got {other:?}"),
        }
    }

    /// A failed execution leaves the sandbox usable for the next rule.
    #[test]
    fn test_sandbox_survives_rule_error() {
        let sandbox = Sandbox::open().unwrap();
        sandbox
            .add_event(&event_with_payload(serde_json::json!({})))
            .unwrap();

        assert!(sandbox
            .execute_rule(&rule_with_sql("SELECT bogus FROM nowhere"))
            .is_err());
        let count = sandbox
            .execute_rule(&rule_with_sql("SELECT id FROM events"))
            .unwrap();
        assert_eq!(count, 1);
    }
}
