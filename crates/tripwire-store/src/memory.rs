//! In-memory event store for testing and development.
//!
//! A fully functional [`EventStore`] that mirrors the PostgreSQL backend's
//! observable behaviour: transactional event/alert + queue coupling,
//! deduplication, `(rule_id, event_id)` alert idempotence, lease claiming
//! with expiry, and `received_at`/`triggered_at` ordering. Lease claiming is
//! a compare-and-set under one mutex, which is the memory-model equivalent
//! of skip-locked reads.
//!
//! The inspection helpers at the bottom exist so tests can assert on queue
//! entries and delivery rows without widening the trait.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tripwire_core::source::SourceKind;
use tripwire_core::store::{
    AlertOutcome, EventStore, IngestOutcome, QueueEntry, QueueState, StoreError,
};
use tripwire_core::{
    Alert, AlertDelivery, AlertId, ChannelId, Event, EventId, NotificationChannel, Rule, RuleId,
    TenantId, Webhook, WebhookId,
};

use crate::postgres::DEFAULT_LEASE_TIMEOUT;

// ============================================================================
// Internal Storage
// ============================================================================

#[derive(Default)]
struct Inner {
    webhooks: HashMap<WebhookId, Webhook>,
    events: HashMap<EventId, Event>,
    event_queue: HashMap<EventId, QueueEntry>,
    rules: HashMap<RuleId, Rule>,
    channels: HashMap<ChannelId, NotificationChannel>,
    destinations: Vec<(RuleId, ChannelId)>,
    alerts: HashMap<AlertId, Alert>,
    alert_queue: HashMap<AlertId, QueueEntry>,
    deliveries: Vec<AlertDelivery>,
}

/// In-process [`EventStore`] backend
pub struct MemoryEventStore {
    inner: Mutex<Inner>,
    lease_timeout: Duration,
}

impl MemoryEventStore {
    /// Create an empty store with the default lease timeout
    pub fn new() -> Self {
        Self::with_lease_timeout(DEFAULT_LEASE_TIMEOUT)
    }

    /// Create an empty store with a custom lease timeout
    pub fn with_lease_timeout(lease_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            lease_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned mutex only means another test thread panicked while
        // holding it; the data itself is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lease(entry: &mut QueueEntry, worker_id: &str, lease_timeout: Duration) -> bool {
        let expired = matches!(entry.state, QueueState::Leased)
            && entry.locked_at.is_some_and(|at| {
                Utc::now() - at
                    >= chrono::Duration::from_std(lease_timeout).unwrap_or_default()
            });

        if !matches!(entry.state, QueueState::Pending) && !expired {
            return false;
        }

        entry.state = QueueState::Leased;
        entry.locked_by = Some(worker_id.to_string());
        entry.locked_at = Some(Utc::now());
        entry.attempts += 1;
        true
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    // ------------------------------------------------------------------
    // Webhooks
    // ------------------------------------------------------------------

    async fn create_webhook(&self, webhook: &Webhook) -> Result<(), StoreError> {
        self.lock().webhooks.insert(webhook.id, webhook.clone());
        Ok(())
    }

    async fn get_webhook(&self, id: WebhookId) -> Result<Webhook, StoreError> {
        self.lock()
            .webhooks
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "webhook",
                id: id.to_string(),
            })
    }

    // ------------------------------------------------------------------
    // Events and the evaluation queue
    // ------------------------------------------------------------------

    async fn insert_event_with_queue(&self, event: &Event) -> Result<IngestOutcome, StoreError> {
        let mut inner = self.lock();

        if let Some(hash) = &event.dedup_hash {
            let duplicate = inner.events.values().any(|existing| {
                existing.tenant_id == event.tenant_id
                    && existing.dedup_hash.as_deref() == Some(hash.as_str())
            });
            if duplicate {
                return Ok(IngestOutcome::Deduplicated);
            }
        }

        inner.events.insert(event.id, event.clone());
        inner.event_queue.insert(event.id, QueueEntry::pending());
        Ok(IngestOutcome::Inserted)
    }

    async fn lease_next_event(&self, worker_id: &str) -> Result<EventId, StoreError> {
        let mut inner = self.lock();
        let Inner {
            events,
            event_queue,
            ..
        } = &mut *inner;

        let mut candidates: Vec<EventId> = event_queue.keys().copied().collect();
        candidates.sort_by_key(|id| events.get(id).map(|e| e.received_at));

        for id in candidates {
            if let Some(entry) = event_queue.get_mut(&id) {
                if Self::lease(entry, worker_id, self.lease_timeout) {
                    return Ok(id);
                }
            }
        }
        Err(StoreError::NoWork)
    }

    async fn get_event(&self, id: EventId) -> Result<Event, StoreError> {
        self.lock()
            .events
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "event",
                id: id.to_string(),
            })
    }

    async fn mark_event_done(&self, id: EventId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let entry = inner
            .event_queue
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "event queue entry",
                id: id.to_string(),
            })?;
        entry.state = QueueState::Done;
        entry.locked_by = None;
        entry.locked_at = None;
        Ok(())
    }

    async fn mark_event_failed(&self, id: EventId, error: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let entry = inner
            .event_queue
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "event queue entry",
                id: id.to_string(),
            })?;
        entry.state = QueueState::Failed;
        entry.locked_by = None;
        entry.locked_at = None;
        entry.last_error = Some(error.to_string());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------

    async fn create_rule(&self, rule: &Rule) -> Result<(), StoreError> {
        self.lock().rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn get_rule(&self, tenant_id: TenantId, id: RuleId) -> Result<Rule, StoreError> {
        self.lock()
            .rules
            .get(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "rule",
                id: id.to_string(),
            })
    }

    async fn list_rules(&self, tenant_id: TenantId) -> Result<Vec<Rule>, StoreError> {
        let mut rules: Vec<Rule> = self
            .lock()
            .rules
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.created_at);
        Ok(rules)
    }

    async fn get_rules_for(
        &self,
        tenant_id: TenantId,
        source: SourceKind,
        event_type: &str,
    ) -> Result<Vec<Rule>, StoreError> {
        let mut rules: Vec<Rule> = self
            .lock()
            .rules
            .values()
            .filter(|r| {
                r.active
                    && r.tenant_id == tenant_id
                    && r.source == source
                    && r.event_type == event_type
            })
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.created_at);
        Ok(rules)
    }

    async fn set_rule_active(
        &self,
        tenant_id: TenantId,
        id: RuleId,
        active: bool,
    ) -> Result<Rule, StoreError> {
        let mut inner = self.lock();
        let rule = inner
            .rules
            .get_mut(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "rule",
                id: id.to_string(),
            })?;
        rule.active = active;
        Ok(rule.clone())
    }

    async fn delete_rule(&self, tenant_id: TenantId, id: RuleId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        match inner.rules.get(&id) {
            Some(rule) if rule.tenant_id == tenant_id => {
                inner.rules.remove(&id);
                inner.destinations.retain(|(rule_id, _)| *rule_id != id);
                Ok(())
            }
            _ => Err(StoreError::NotFound {
                entity: "rule",
                id: id.to_string(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Notification channels and rule destinations
    // ------------------------------------------------------------------

    async fn create_channel(&self, channel: &NotificationChannel) -> Result<(), StoreError> {
        self.lock().channels.insert(channel.id, channel.clone());
        Ok(())
    }

    async fn get_channel(
        &self,
        tenant_id: TenantId,
        id: ChannelId,
    ) -> Result<NotificationChannel, StoreError> {
        self.lock()
            .channels
            .get(&id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "notification channel",
                id: id.to_string(),
            })
    }

    async fn list_channels(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<NotificationChannel>, StoreError> {
        let mut channels: Vec<NotificationChannel> = self
            .lock()
            .channels
            .values()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect();
        channels.sort_by_key(|c| c.created_at);
        Ok(channels)
    }

    async fn add_rule_destination(
        &self,
        tenant_id: TenantId,
        rule_id: RuleId,
        channel_id: ChannelId,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();

        if !inner
            .rules
            .get(&rule_id)
            .is_some_and(|r| r.tenant_id == tenant_id)
        {
            return Err(StoreError::NotFound {
                entity: "rule",
                id: rule_id.to_string(),
            });
        }
        if !inner
            .channels
            .get(&channel_id)
            .is_some_and(|c| c.tenant_id == tenant_id)
        {
            return Err(StoreError::NotFound {
                entity: "notification channel",
                id: channel_id.to_string(),
            });
        }

        if !inner.destinations.contains(&(rule_id, channel_id)) {
            inner.destinations.push((rule_id, channel_id));
        }
        Ok(())
    }

    async fn remove_rule_destination(
        &self,
        tenant_id: TenantId,
        rule_id: RuleId,
        channel_id: ChannelId,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();

        let in_tenant = inner
            .rules
            .get(&rule_id)
            .is_some_and(|r| r.tenant_id == tenant_id);
        let existed = inner.destinations.contains(&(rule_id, channel_id));
        if !in_tenant || !existed {
            return Err(StoreError::NotFound {
                entity: "rule destination",
                id: format!("{rule_id}/{channel_id}"),
            });
        }

        inner
            .destinations
            .retain(|pair| *pair != (rule_id, channel_id));
        Ok(())
    }

    async fn list_channels_for_rule(
        &self,
        rule_id: RuleId,
    ) -> Result<Vec<NotificationChannel>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .destinations
            .iter()
            .filter(|(r, _)| *r == rule_id)
            .filter_map(|(_, c)| inner.channels.get(c).cloned())
            .collect())
    }

    // ------------------------------------------------------------------
    // Alerts and the delivery queue
    // ------------------------------------------------------------------

    async fn insert_alert_with_queue(&self, alert: &Alert) -> Result<AlertOutcome, StoreError> {
        let mut inner = self.lock();

        let duplicate = inner
            .alerts
            .values()
            .any(|a| a.rule_id == alert.rule_id && a.event_id == alert.event_id);
        if duplicate {
            return Ok(AlertOutcome::Duplicate);
        }

        inner.alerts.insert(alert.id, alert.clone());
        inner.alert_queue.insert(alert.id, QueueEntry::pending());
        Ok(AlertOutcome::Created)
    }

    async fn lease_next_alert(&self, worker_id: &str) -> Result<AlertId, StoreError> {
        let mut inner = self.lock();
        let Inner {
            alerts,
            alert_queue,
            ..
        } = &mut *inner;

        let mut candidates: Vec<AlertId> = alert_queue.keys().copied().collect();
        candidates.sort_by_key(|id| alerts.get(id).map(|a| a.triggered_at));

        for id in candidates {
            if let Some(entry) = alert_queue.get_mut(&id) {
                if Self::lease(entry, worker_id, self.lease_timeout) {
                    return Ok(id);
                }
            }
        }
        Err(StoreError::NoWork)
    }

    async fn get_alert(&self, id: AlertId) -> Result<Alert, StoreError> {
        self.lock()
            .alerts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "alert",
                id: id.to_string(),
            })
    }

    async fn record_delivery(&self, delivery: &AlertDelivery) -> Result<(), StoreError> {
        self.lock().deliveries.push(delivery.clone());
        Ok(())
    }

    async fn mark_alert_delivered(&self, id: AlertId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let entry = inner
            .alert_queue
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "alert queue entry",
                id: id.to_string(),
            })?;
        entry.state = QueueState::Done;
        entry.locked_by = None;
        entry.locked_at = None;
        Ok(())
    }

    async fn mark_alert_failed(&self, id: AlertId, error: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let entry = inner
            .alert_queue
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "alert queue entry",
                id: id.to_string(),
            })?;
        entry.state = QueueState::Failed;
        entry.locked_by = None;
        entry.locked_at = None;
        entry.last_error = Some(error.to_string());
        Ok(())
    }

    async fn mark_alert_notified(&self, id: AlertId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let alert = inner
            .alerts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "alert",
                id: id.to_string(),
            })?;
        alert.notified = true;
        Ok(())
    }
}

// ============================================================================
// Inspection Helpers
// ============================================================================

impl MemoryEventStore {
    /// Snapshot of an event's queue entry
    pub fn event_queue_entry(&self, id: EventId) -> Option<QueueEntry> {
        self.lock().event_queue.get(&id).cloned()
    }

    /// Snapshot of an alert's queue entry
    pub fn alert_queue_entry(&self, id: AlertId) -> Option<QueueEntry> {
        self.lock().alert_queue.get(&id).cloned()
    }

    /// All stored events
    pub fn events(&self) -> Vec<Event> {
        self.lock().events.values().cloned().collect()
    }

    /// All stored alerts
    pub fn alerts(&self) -> Vec<Alert> {
        self.lock().alerts.values().cloned().collect()
    }

    /// Delivery rows recorded for an alert, in insertion order
    pub fn deliveries_for(&self, alert_id: AlertId) -> Vec<AlertDelivery> {
        self.lock()
            .deliveries
            .iter()
            .filter(|d| d.alert_id == alert_id)
            .cloned()
            .collect()
    }

    /// Backdate an event lease so it reads as expired (test support)
    pub fn backdate_event_lease(&self, id: EventId, age: Duration) {
        if let Some(entry) = self.lock().event_queue.get_mut(&id) {
            entry.locked_at =
                Some(Utc::now() - chrono::Duration::from_std(age).unwrap_or_default());
        }
    }

    /// Backdate an alert lease so it reads as expired (test support)
    pub fn backdate_alert_lease(&self, id: AlertId, age: Duration) {
        if let Some(entry) = self.lock().alert_queue.get_mut(&id) {
            entry.locked_at =
                Some(Utc::now() - chrono::Duration::from_std(age).unwrap_or_default());
        }
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
