//! Response body types for endpoints whose shape differs from the stored
//! entities. Entity reads serialize the domain types directly.

use serde::Serialize;

use tripwire_core::{AlertLevel, ChannelId, EventId, RuleId};

/// Acknowledgement for `POST /api/events/{webhook_id}`
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// `accepted` for a fresh event, `duplicate` for a deduplicated one
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
}

/// Result of a rule dry-run against a posted payload
#[derive(Debug, Serialize)]
pub struct RuleTestResponse {
    #[serde(rename = "match")]
    pub matched: bool,
    pub alert_level: AlertLevel,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Acknowledgement for a destination attachment
#[derive(Debug, Serialize)]
pub struct DestinationResponse {
    pub rule_id: RuleId,
    pub channel_id: ChannelId,
}

/// Acknowledgement for a synchronous channel test
#[derive(Debug, Serialize)]
pub struct ChannelTestResponse {
    pub status: &'static str,
}
