//! # Event Store Contract
//!
//! The persistence interface every other component consumes.
//!
//! The store owns all persisted rows: webhooks, events, rules, channels,
//! rule destinations, alerts, deliveries, and the two work queues. Workers
//! hold transient row-level leases through `locked_by`/`locked_at` plus a
//! freshness window; the contracts below matter more than the storage
//! technology behind them.
//!
//! Two invariants every implementation must hold:
//! - an event row and its queue entry are created in one transaction, and
//!   likewise for alerts — neither ever exists without the other;
//! - no two workers of the same class can lease the same queue entry
//!   (skip-locked reads or an equivalent compare-and-set).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::source::SourceKind;
use crate::{
    Alert, AlertDelivery, AlertId, ChannelId, Event, EventId, NotificationChannel, ParseError,
    Rule, RuleId, TenantId, Webhook, WebhookId,
};

// ============================================================================
// Queue Types
// ============================================================================

/// State of a work-queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    Pending,
    Leased,
    Done,
    Failed,
}

impl QueueState {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Leased => "leased",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "leased" => Ok(Self::Leased),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseError::InvalidFormat {
                expected: "pending, leased, done, or failed".to_string(),
                actual: s.to_string(),
            }),
        }
    }
}

/// A work-queue entry (shared shape for the event and alert queues).
///
/// Lifecycle: inserted `pending` alongside its entity, then
/// `pending → leased → done` on success, `leased → failed` on terminal
/// error, or `leased → pending` again once the lease freshness window
/// expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub state: QueueState,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl QueueEntry {
    /// A freshly enqueued entry
    pub fn pending() -> Self {
        Self {
            state: QueueState::Pending,
            locked_by: None,
            locked_at: None,
            attempts: 0,
            last_error: None,
        }
    }
}

// ============================================================================
// Operation Outcomes
// ============================================================================

/// Outcome of [`EventStore::insert_event_with_queue`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The event and its pending queue entry were inserted
    Inserted,
    /// An event with the same `(tenant_id, dedup_hash)` already exists;
    /// nothing was inserted
    Deduplicated,
}

/// Outcome of [`EventStore::insert_alert_with_queue`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
    /// The alert and its pending queue entry were inserted
    Created,
    /// An alert for the same `(rule_id, event_id)` already exists; nothing
    /// was inserted (idempotent re-processing)
    Duplicate,
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Both lease operations report an empty queue this way; it is not an
    /// error at the protocol level — the worker sleeps until the next tick.
    #[error("no work available")]
    NoWork,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("constraint violated: {message}")]
    Constraint { message: String },

    #[error("storage unavailable: {message}")]
    Unavailable { message: String },

    /// A persisted row no longer decodes into its domain type (e.g. an
    /// unknown source tag written by a newer deployment).
    #[error("stored row could not be decoded: {message}")]
    Corrupt { message: String },
}

impl StoreError {
    /// Check if the error is transient and the operation worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

// ============================================================================
// EventStore Trait
// ============================================================================

/// Persistence operations consumed by the ingest handler, both workers, and
/// the admin API.
#[async_trait]
pub trait EventStore: Send + Sync {
    // ------------------------------------------------------------------
    // Webhooks
    // ------------------------------------------------------------------

    /// Persist a new webhook endpoint
    async fn create_webhook(&self, webhook: &Webhook) -> Result<(), StoreError>;

    /// Fetch a webhook by id
    async fn get_webhook(&self, id: WebhookId) -> Result<Webhook, StoreError>;

    // ------------------------------------------------------------------
    // Events and the evaluation queue
    // ------------------------------------------------------------------

    /// Atomically insert the event and its `pending` queue entry.
    ///
    /// When the event carries a `dedup_hash` that already exists for the
    /// tenant, nothing is inserted and [`IngestOutcome::Deduplicated`] is
    /// returned.
    async fn insert_event_with_queue(&self, event: &Event) -> Result<IngestOutcome, StoreError>;

    /// Atomically claim the oldest `pending` (or lease-expired) event queue
    /// entry for `worker_id`, in `received_at` order.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoWork`] when nothing is leasable.
    async fn lease_next_event(&self, worker_id: &str) -> Result<EventId, StoreError>;

    /// Fetch an event by id
    async fn get_event(&self, id: EventId) -> Result<Event, StoreError>;

    /// Move a leased event queue entry to `done`
    async fn mark_event_done(&self, id: EventId) -> Result<(), StoreError>;

    /// Move an event queue entry to `failed`, recording the error
    async fn mark_event_failed(&self, id: EventId, error: &str) -> Result<(), StoreError>;

    // ------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------

    /// Persist a new rule
    async fn create_rule(&self, rule: &Rule) -> Result<(), StoreError>;

    /// Fetch a rule by id within a tenant
    async fn get_rule(&self, tenant_id: TenantId, id: RuleId) -> Result<Rule, StoreError>;

    /// List all rules for a tenant
    async fn list_rules(&self, tenant_id: TenantId) -> Result<Vec<Rule>, StoreError>;

    /// All `active` rules matching `(tenant, source, event_type)`
    async fn get_rules_for(
        &self,
        tenant_id: TenantId,
        source: SourceKind,
        event_type: &str,
    ) -> Result<Vec<Rule>, StoreError>;

    /// Toggle a rule's `active` flag, returning the updated rule
    async fn set_rule_active(
        &self,
        tenant_id: TenantId,
        id: RuleId,
        active: bool,
    ) -> Result<Rule, StoreError>;

    /// Delete a rule (and its destinations)
    async fn delete_rule(&self, tenant_id: TenantId, id: RuleId) -> Result<(), StoreError>;

    // ------------------------------------------------------------------
    // Notification channels and rule destinations
    // ------------------------------------------------------------------

    /// Persist a new notification channel
    async fn create_channel(&self, channel: &NotificationChannel) -> Result<(), StoreError>;

    /// Fetch a channel by id within a tenant
    async fn get_channel(
        &self,
        tenant_id: TenantId,
        id: ChannelId,
    ) -> Result<NotificationChannel, StoreError>;

    /// List all channels for a tenant
    async fn list_channels(&self, tenant_id: TenantId)
        -> Result<Vec<NotificationChannel>, StoreError>;

    /// Attach a channel to a rule.
    ///
    /// Both sides must exist and belong to `tenant_id`; attaching twice is a
    /// no-op.
    async fn add_rule_destination(
        &self,
        tenant_id: TenantId,
        rule_id: RuleId,
        channel_id: ChannelId,
    ) -> Result<(), StoreError>;

    /// Detach a channel from a rule
    async fn remove_rule_destination(
        &self,
        tenant_id: TenantId,
        rule_id: RuleId,
        channel_id: ChannelId,
    ) -> Result<(), StoreError>;

    /// Channels attached to a rule, joined through its destinations
    async fn list_channels_for_rule(
        &self,
        rule_id: RuleId,
    ) -> Result<Vec<NotificationChannel>, StoreError>;

    // ------------------------------------------------------------------
    // Alerts and the delivery queue
    // ------------------------------------------------------------------

    /// Atomically insert the alert and its `pending` queue entry.
    ///
    /// Idempotent on `(rule_id, event_id)`: a duplicate inserts nothing and
    /// returns [`AlertOutcome::Duplicate`].
    async fn insert_alert_with_queue(&self, alert: &Alert) -> Result<AlertOutcome, StoreError>;

    /// Atomically claim the oldest `pending` (or lease-expired) alert queue
    /// entry for `worker_id`, in `triggered_at` order.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoWork`] when nothing is leasable.
    async fn lease_next_alert(&self, worker_id: &str) -> Result<AlertId, StoreError>;

    /// Fetch an alert by id
    async fn get_alert(&self, id: AlertId) -> Result<Alert, StoreError>;

    /// Append a delivery outcome row
    async fn record_delivery(&self, delivery: &AlertDelivery) -> Result<(), StoreError>;

    /// Move a leased alert queue entry to `done`
    async fn mark_alert_delivered(&self, id: AlertId) -> Result<(), StoreError>;

    /// Move an alert queue entry to `failed`, recording the error
    async fn mark_alert_failed(&self, id: AlertId, error: &str) -> Result<(), StoreError>;

    /// Set the alert's `notified` flag
    async fn mark_alert_notified(&self, id: AlertId) -> Result<(), StoreError>;
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
