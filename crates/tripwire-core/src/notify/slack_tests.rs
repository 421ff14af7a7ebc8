//! Tests for the Slack notifier.
//!
//! Transport behaviour is exercised against a local `wiremock` server
//! standing in for the Slack incoming-webhook endpoint.

use super::*;
use crate::notify::{channel_config_from_json, Message};
use crate::{AlertLevel, EvaluationType, RuleId};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helpers
// ============================================================================

fn sample_message() -> Message {
    Message {
        title: "[HIGH] unreviewed merge".to_string(),
        body: "PR merged with nobody looking".to_string(),
        resource_link: Some(url::Url::parse("https://github.com/acme/app/pull/42").unwrap()),
        event_source: "github".to_string(),
        event_type: "pull_request".to_string(),
        rule_id: RuleId::new(),
        rule_name: "unreviewed merge".to_string(),
        rule_description: Some("PR merged with nobody looking".to_string()),
        rule_evaluation_type: EvaluationType::LiveTrigger,
        rule_alert_level: AlertLevel::High,
        rule_sql: "SELECT 1".to_string(),
    }
}

fn config_for(server: &MockServer) -> ChannelConfig {
    channel_config_from_json(&serde_json::json!({
        "webhook_url": format!("{}/services/T0/B0", server.uri())
    }))
    .unwrap()
}

// ============================================================================
// send tests
// ============================================================================

mod send_tests {
    use super::*;

    /// A 200 from the webhook counts as delivered.
    #[tokio::test]
    async fn test_send_succeeds_on_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/T0/B0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = SlackNotifier::new().unwrap();
        let result = notifier.send(&config_for(&server), &sample_message()).await;
        assert!(result.is_ok(), "2xx must count as delivered: {result:?}");
    }

    /// Any non-2xx status is a delivery failure carrying the status.
    #[tokio::test]
    async fn test_send_fails_on_5xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = SlackNotifier::new().unwrap();
        let err = notifier
            .send(&config_for(&server), &sample_message())
            .await
            .unwrap_err();
        assert!(
            matches!(&err, NotifyError::Delivery { message } if message.contains("500")),
            "unexpected error: {err:?}"
        );
    }

    /// A config without webhook_url never reaches the network.
    #[tokio::test]
    async fn test_send_requires_webhook_url() {
        let notifier = SlackNotifier::new().unwrap();
        let err = notifier
            .send(&ChannelConfig::new(), &sample_message())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NotifyError::MissingConfig { key } if key == "webhook_url"
        ));
    }

    /// The wire format is `{"text": <markdown>}` with the title bolded.
    #[tokio::test]
    async fn test_send_posts_text_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = SlackNotifier::new().unwrap();
        notifier
            .send(&config_for(&server), &sample_message())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let text = body["text"].as_str().unwrap();
        assert!(text.starts_with("*[HIGH] unreviewed merge*"));
        assert!(text.contains("SELECT 1"));
        assert!(text.contains("https://github.com/acme/app/pull/42"));
    }
}

// ============================================================================
// test-message tests
// ============================================================================

mod test_message_tests {
    use super::*;

    #[tokio::test]
    async fn test_test_sends_fixed_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = SlackNotifier::new().unwrap();
        notifier.test(&config_for(&server)).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body["text"]
            .as_str()
            .unwrap()
            .contains("Tripwire test notification"));
    }

    #[tokio::test]
    async fn test_test_requires_webhook_url() {
        let notifier = SlackNotifier::new().unwrap();
        let err = notifier.test(&ChannelConfig::new()).await.unwrap_err();
        assert!(matches!(err, NotifyError::MissingConfig { .. }));
    }
}

// ============================================================================
// Rendering tests
// ============================================================================

mod rendering_tests {
    use super::*;

    /// Rendering includes every fact the message carries.
    #[test]
    fn test_render_markdown_is_complete() {
        let message = sample_message();
        let text = render_markdown(&message);

        assert!(text.contains("*[HIGH] unreviewed merge*"));
        assert!(text.contains("PR merged with nobody looking"));
        assert!(text.contains("`github` / `pull_request`"));
        assert!(text.contains("HIGH"));
        assert!(text.contains("LIVE_TRIGGER"));
        assert!(text.contains("```SELECT 1```"));
        assert!(text.contains("<https://github.com/acme/app/pull/42>"));
    }

    /// Optional parts are simply omitted.
    #[test]
    fn test_render_markdown_without_optionals() {
        let mut message = sample_message();
        message.resource_link = None;
        message.rule_description = None;
        let text = render_markdown(&message);

        assert!(!text.contains('<'));
        assert!(text.contains("```SELECT 1```"));
    }
}
