//! # Tripwire Core
//!
//! Core business logic for the Tripwire security-alerting service.
//!
//! Tripwire ingests webhook events from SaaS providers (GitHub being the
//! built-in source), evaluates operator-defined SQL rules against each event
//! in an ephemeral sandbox, and delivers matching alerts to notification
//! channels such as Slack webhooks.
//!
//! ## Architecture
//!
//! The core follows the same shape throughout:
//! - Business logic depends only on trait abstractions ([`store::EventStore`],
//!   [`source::Validator`], [`source::Parser`], [`notify::Notifier`])
//! - Infrastructure implementations are injected at startup
//! - Registries are built once and shared read-only behind `Arc`
//!
//! ## Usage
//!
//! ```rust
//! use tripwire_core::{EventId, TenantId};
//!
//! let event_id = EventId::new();
//! let tenant = TenantId::default_tenant();
//! assert!(tenant.as_uuid().is_nil());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Re-export commonly used types
pub use uuid::Uuid;

use crate::notify::ChannelKind;
use crate::source::SourceKind;

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Error type for string parsing failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },
}

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Get the underlying UUID
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let id = s.parse::<Uuid>().map_err(|_| ParseError::InvalidFormat {
                    expected: "UUID format".to_string(),
                    actual: s.to_string(),
                })?;
                Ok(Self(id))
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for an inbound webhook endpoint
    WebhookId
}

uuid_id! {
    /// Unique identifier for an accepted webhook delivery
    EventId
}

uuid_id! {
    /// Unique identifier for a detection rule
    RuleId
}

uuid_id! {
    /// Unique identifier for a notification channel
    ChannelId
}

uuid_id! {
    /// Unique identifier for a triggered alert
    AlertId
}

/// Tenant identifier scoping every persisted row.
///
/// Multi-tenant identity is out of scope for now; every caller uses
/// [`TenantId::default_tenant`], the zero UUID. All store operations still
/// take the tenant explicitly so that an auth layer can thread real tenant
/// identity through later without changing contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    /// The hard-coded single tenant (zero UUID)
    pub const fn default_tenant() -> Self {
        Self(Uuid::nil())
    }

    /// Wrap an existing UUID
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::default_tenant()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.parse::<Uuid>().map_err(|_| ParseError::InvalidFormat {
            expected: "UUID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(id))
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Severity attached to a rule and carried on the alerts it raises
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Low,
    Medium,
    High,
}

impl AlertLevel {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertLevel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            _ => Err(ParseError::InvalidFormat {
                expected: "LOW, MEDIUM, or HIGH".to_string(),
                actual: s.to_string(),
            }),
        }
    }
}

/// How a rule is evaluated.
///
/// Only live-trigger evaluation exists: the rule runs once against each
/// inbound event matching its `(tenant, source, event_type)` scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluationType {
    #[serde(rename = "LIVE_TRIGGER")]
    LiveTrigger,
}

impl EvaluationType {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LiveTrigger => "LIVE_TRIGGER",
        }
    }
}

impl fmt::Display for EvaluationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvaluationType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LIVE_TRIGGER" => Ok(Self::LiveTrigger),
            _ => Err(ParseError::InvalidFormat {
                expected: "LIVE_TRIGGER".to_string(),
                actual: s.to_string(),
            }),
        }
    }
}

/// Outcome of one (alert, channel) dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Delivered,
    Failed,
}

impl DeliveryStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseError::InvalidFormat {
                expected: "delivered or failed".to_string(),
                actual: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// An operator-configured inbound endpoint with a secret and a source type.
///
/// Created through the admin API and immutable thereafter. The secret keys
/// the source-specific signature validation of every delivery addressed to
/// this webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: WebhookId,
    pub tenant_id: TenantId,
    pub name: String,
    pub source: SourceKind,
    pub secret: String,
    /// Event types the operator declared interest in (informational)
    pub events: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    /// Create a new webhook with a freshly generated secret
    pub fn new(tenant_id: TenantId, name: String, source: SourceKind, events: Vec<String>) -> Self {
        Self {
            id: WebhookId::new(),
            tenant_id,
            name,
            source,
            secret: Self::generate_secret(),
            events,
            created_at: Utc::now(),
        }
    }

    /// Generate a webhook signing secret: 32 random bytes, hex-encoded
    pub fn generate_secret() -> String {
        use rand::RngCore;

        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

/// A single accepted webhook delivery, persisted verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub tenant_id: TenantId,
    pub webhook_id: WebhookId,
    pub source: SourceKind,
    pub event_type: String,
    /// Optional nested discriminator (e.g. GitHub's top-level `action` key)
    pub action: Option<String>,
    pub raw_payload: serde_json::Value,
    /// Stable hash of `(source, event_type, provider delivery id)` when the
    /// source supplies a delivery id; `(tenant_id, dedup_hash)` is unique.
    pub dedup_hash: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl Event {
    /// Create an event accepted through `webhook` at the current instant
    pub fn new(
        webhook: &Webhook,
        event_type: String,
        action: Option<String>,
        raw_payload: serde_json::Value,
        dedup_hash: Option<String>,
    ) -> Self {
        Self {
            id: EventId::new(),
            tenant_id: webhook.tenant_id,
            webhook_id: webhook.id,
            source: webhook.source,
            event_type,
            action,
            raw_payload,
            dedup_hash,
            received_at: Utc::now(),
        }
    }
}

/// A SQL SELECT predicate over a single-row `events` relation, scoped to
/// `(tenant, source, event_type)`.
///
/// Only rules with `active = true` participate in evaluation. The SQL body
/// is treated as an opaque predicate by the sandbox; rule authors are
/// trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub tenant_id: TenantId,
    pub name: String,
    pub description: Option<String>,
    pub source: SourceKind,
    pub event_type: String,
    pub sql: String,
    pub evaluation_type: EvaluationType,
    pub alert_level: AlertLevel,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A configured outbound sink with a type and an opaque config blob.
///
/// The config schema is determined by `kind` (e.g. Slack channels carry a
/// `webhook_url` key) and is only interpreted by the matching notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: ChannelId,
    pub tenant_id: TenantId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A matched-rule record linking event and rule, pending notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub tenant_id: TenantId,
    pub rule_id: RuleId,
    pub event_id: EventId,
    pub triggered_at: DateTime<Utc>,
    pub notified: bool,
}

impl Alert {
    /// Create the alert raised by `rule` matching `event`
    pub fn new(rule: &Rule, event: &Event) -> Self {
        Self {
            id: AlertId::new(),
            tenant_id: event.tenant_id,
            rule_id: rule.id,
            event_id: event.id,
            triggered_at: Utc::now(),
            notified: false,
        }
    }
}

/// One row per (alert, channel) dispatch attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertDelivery {
    pub alert_id: AlertId,
    pub channel_id: ChannelId,
    pub status: DeliveryStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AlertDelivery {
    /// Record a dispatch outcome at the current instant
    pub fn new(
        alert_id: AlertId,
        channel_id: ChannelId,
        status: DeliveryStatus,
        error: Option<String>,
    ) -> Self {
        Self {
            alert_id,
            channel_id,
            status,
            error,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// Module declarations
// ============================================================================

/// Per-source request validation and payload parsing
pub mod source;

/// Notification channel abstractions and built-in notifiers
pub mod notify;

/// Per-event ephemeral SQL sandbox
pub mod sandbox;

/// The `EventStore` contract shared by all persistence backends
pub mod store;

// Re-export key types for convenience
pub use notify::{Message, Notifier, NotifierRegistry, NotifyError};
pub use sandbox::{Sandbox, SandboxError};
pub use source::{InboundRequest, Parser, SourceError, SourceRegistry, Validator};
pub use store::{AlertOutcome, EventStore, IngestOutcome, QueueEntry, QueueState, StoreError};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
