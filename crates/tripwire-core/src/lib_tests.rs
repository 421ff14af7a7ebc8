//! Tests for core identifiers, enumerations, and entities.

use super::*;
use crate::source::SourceKind;

// ============================================================================
// Identifier tests
// ============================================================================

mod identifier_tests {
    use super::*;

    /// Identifiers round-trip through their string representation.
    #[test]
    fn test_event_id_roundtrip() {
        let id = EventId::new();
        let parsed: EventId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    /// Non-UUID input is rejected with a parse error.
    #[test]
    fn test_event_id_rejects_garbage() {
        let result = "not-a-uuid".parse::<EventId>();
        assert!(matches!(result, Err(ParseError::InvalidFormat { .. })));
    }

    /// Two generated identifiers are distinct.
    #[test]
    fn test_ids_are_unique() {
        assert_ne!(WebhookId::new(), WebhookId::new());
        assert_ne!(RuleId::new(), RuleId::new());
        assert_ne!(AlertId::new(), AlertId::new());
    }

    /// The hard-coded tenant is the zero UUID.
    #[test]
    fn test_default_tenant_is_nil_uuid() {
        let tenant = TenantId::default_tenant();
        assert!(tenant.as_uuid().is_nil());
        assert_eq!(
            tenant.to_string(),
            "00000000-0000-0000-0000-000000000000"
        );
    }
}

// ============================================================================
// Enumeration tests
// ============================================================================

mod enumeration_tests {
    use super::*;

    #[test]
    fn test_alert_level_parse_and_display() {
        assert_eq!("LOW".parse::<AlertLevel>().unwrap(), AlertLevel::Low);
        assert_eq!("medium".parse::<AlertLevel>().unwrap(), AlertLevel::Medium);
        assert_eq!(AlertLevel::High.to_string(), "HIGH");
        assert!("CRITICAL".parse::<AlertLevel>().is_err());
    }

    #[test]
    fn test_alert_level_ordering() {
        assert!(AlertLevel::Low < AlertLevel::Medium);
        assert!(AlertLevel::Medium < AlertLevel::High);
    }

    #[test]
    fn test_evaluation_type_parse_and_display() {
        assert_eq!(
            "LIVE_TRIGGER".parse::<EvaluationType>().unwrap(),
            EvaluationType::LiveTrigger
        );
        assert_eq!(EvaluationType::LiveTrigger.to_string(), "LIVE_TRIGGER");
        assert!("BATCH".parse::<EvaluationType>().is_err());
    }

    #[test]
    fn test_delivery_status_parse_is_strict() {
        assert_eq!(
            "delivered".parse::<DeliveryStatus>().unwrap(),
            DeliveryStatus::Delivered
        );
        assert_eq!(
            "failed".parse::<DeliveryStatus>().unwrap(),
            DeliveryStatus::Failed
        );
        assert!("DELIVERED".parse::<DeliveryStatus>().is_err());
    }

    /// Alert levels serialize uppercase for the API surface.
    #[test]
    fn test_alert_level_serde_uppercase() {
        let json = serde_json::to_string(&AlertLevel::Medium).unwrap();
        assert_eq!(json, "\"MEDIUM\"");
        let parsed: AlertLevel = serde_json::from_str("\"HIGH\"").unwrap();
        assert_eq!(parsed, AlertLevel::High);
    }
}

// ============================================================================
// Entity tests
// ============================================================================

mod entity_tests {
    use super::*;

    /// Generated secrets are 32 random bytes, hex-encoded.
    #[test]
    fn test_generated_secret_is_hex_of_32_bytes() {
        let secret = Webhook::generate_secret();
        assert_eq!(secret.len(), 64);
        assert!(hex::decode(&secret).is_ok(), "secret must be valid hex");
        assert_ne!(secret, Webhook::generate_secret(), "secrets must differ");
    }

    #[test]
    fn test_webhook_new_populates_identity_and_secret() {
        let webhook = Webhook::new(
            TenantId::default_tenant(),
            "gh".to_string(),
            SourceKind::Github,
            vec!["pull_request".to_string()],
        );

        assert_eq!(webhook.tenant_id, TenantId::default_tenant());
        assert_eq!(webhook.source, SourceKind::Github);
        assert_eq!(webhook.secret.len(), 64);
        assert_eq!(webhook.events, vec!["pull_request".to_string()]);
    }

    /// Events inherit tenant, webhook, and source from their endpoint.
    #[test]
    fn test_event_new_inherits_webhook_identity() {
        let webhook = Webhook::new(
            TenantId::default_tenant(),
            "gh".to_string(),
            SourceKind::Github,
            vec![],
        );
        let event = Event::new(
            &webhook,
            "pull_request".to_string(),
            Some("closed".to_string()),
            serde_json::json!({"action": "closed"}),
            None,
        );

        assert_eq!(event.tenant_id, webhook.tenant_id);
        assert_eq!(event.webhook_id, webhook.id);
        assert_eq!(event.source, webhook.source);
        assert_eq!(event.action.as_deref(), Some("closed"));
        assert!(event.dedup_hash.is_none());
    }

    /// Alerts link the rule and event and start un-notified.
    #[test]
    fn test_alert_new_links_rule_and_event() {
        let webhook = Webhook::new(
            TenantId::default_tenant(),
            "gh".to_string(),
            SourceKind::Github,
            vec![],
        );
        let event = Event::new(
            &webhook,
            "pull_request".to_string(),
            None,
            serde_json::json!({}),
            None,
        );
        let rule = Rule {
            id: RuleId::new(),
            tenant_id: TenantId::default_tenant(),
            name: "test".to_string(),
            description: None,
            source: SourceKind::Github,
            event_type: "pull_request".to_string(),
            sql: "SELECT 1".to_string(),
            evaluation_type: EvaluationType::LiveTrigger,
            alert_level: AlertLevel::Low,
            active: true,
            created_at: Utc::now(),
        };

        let alert = Alert::new(&rule, &event);
        assert_eq!(alert.rule_id, rule.id);
        assert_eq!(alert.event_id, event.id);
        assert_eq!(alert.tenant_id, event.tenant_id);
        assert!(!alert.notified);
    }
}
