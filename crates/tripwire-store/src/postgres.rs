//! PostgreSQL event store.
//!
//! All queue leasing goes through `FOR UPDATE SKIP LOCKED` so concurrent
//! workers of the same class can never claim the same entry; the
//! event→queue and alert→queue couplings are single transactions. Schema
//! migrations are embedded in the binary and applied with
//! [`PgEventStore::migrate`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

use tripwire_core::notify::ChannelKind;
use tripwire_core::source::SourceKind;
use tripwire_core::store::{AlertOutcome, EventStore, IngestOutcome, StoreError};
use tripwire_core::{
    Alert, AlertDelivery, AlertId, AlertLevel, ChannelId, EvaluationType, Event, EventId,
    NotificationChannel, Rule, RuleId, TenantId, Webhook, WebhookId,
};

/// Embedded schema migrations (`migrations/`)
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// How long a lease stays fresh before the entry becomes re-leasable.
///
/// Must exceed the worst-case evaluation latency, or two workers can end up
/// processing the same entry back to back.
pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Row Types
// ============================================================================

#[derive(sqlx::FromRow)]
struct WebhookRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    source: String,
    secret: String,
    events: Vec<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<WebhookRow> for Webhook {
    type Error = StoreError;

    fn try_from(row: WebhookRow) -> Result<Self, Self::Error> {
        Ok(Webhook {
            id: WebhookId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            name: row.name,
            source: parse_stored::<SourceKind>(&row.source, "webhook source")?,
            secret: row.secret,
            events: row.events,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    tenant_id: Uuid,
    webhook_id: Uuid,
    source: String,
    event_type: String,
    action: Option<String>,
    raw_payload: serde_json::Value,
    dedup_hash: Option<String>,
    received_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: EventId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            webhook_id: WebhookId::from_uuid(row.webhook_id),
            source: parse_stored::<SourceKind>(&row.source, "event source")?,
            event_type: row.event_type,
            action: row.action,
            raw_payload: row.raw_payload,
            dedup_hash: row.dedup_hash,
            received_at: row.received_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    description: Option<String>,
    source: String,
    event_type: String,
    sql: String,
    evaluation_type: String,
    alert_level: String,
    active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<RuleRow> for Rule {
    type Error = StoreError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        Ok(Rule {
            id: RuleId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            name: row.name,
            description: row.description,
            source: parse_stored::<SourceKind>(&row.source, "rule source")?,
            event_type: row.event_type,
            sql: row.sql,
            evaluation_type: parse_stored::<EvaluationType>(
                &row.evaluation_type,
                "rule evaluation type",
            )?,
            alert_level: parse_stored::<AlertLevel>(&row.alert_level, "rule alert level")?,
            active: row.active,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChannelRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    channel_type: String,
    config: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<ChannelRow> for NotificationChannel {
    type Error = StoreError;

    fn try_from(row: ChannelRow) -> Result<Self, Self::Error> {
        Ok(NotificationChannel {
            id: ChannelId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            name: row.name,
            kind: parse_stored::<ChannelKind>(&row.channel_type, "channel type")?,
            config: row.config,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    tenant_id: Uuid,
    rule_id: Uuid,
    event_id: Uuid,
    triggered_at: DateTime<Utc>,
    notified: bool,
}

impl From<AlertRow> for Alert {
    fn from(row: AlertRow) -> Self {
        Alert {
            id: AlertId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            rule_id: RuleId::from_uuid(row.rule_id),
            event_id: EventId::from_uuid(row.event_id),
            triggered_at: row.triggered_at,
            notified: row.notified,
        }
    }
}

// ============================================================================
// Error Mapping
// ============================================================================

fn parse_stored<T>(value: &str, what: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| StoreError::Corrupt {
        message: format!("{what} '{value}': {e}"),
    })
}

fn storage_error(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Constraint {
            message: db.message().to_string(),
        },
        _ => StoreError::Unavailable {
            message: error.to_string(),
        },
    }
}

// ============================================================================
// PgEventStore
// ============================================================================

const SELECT_RULE: &str = "SELECT id, tenant_id, name, description, source, event_type, sql, \
     evaluation_type, alert_level, active, created_at FROM rules";

const SELECT_CHANNEL: &str = "SELECT id, tenant_id, name, type AS channel_type, config, \
     created_at FROM notification_channels";

/// The production event store, backed by PostgreSQL
pub struct PgEventStore {
    pool: PgPool,
    lease_timeout: Duration,
}

impl PgEventStore {
    /// Wrap an existing pool with the default lease timeout
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
        }
    }

    /// Wrap an existing pool with a custom lease timeout.
    ///
    /// The timeout must exceed the worst observed evaluation latency.
    pub fn with_lease_timeout(pool: PgPool, lease_timeout: Duration) -> Self {
        Self {
            pool,
            lease_timeout,
        }
    }

    /// Connect to the store at `dsn`
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await
            .map_err(storage_error)?;
        Ok(Self::new(pool))
    }

    /// Apply any pending embedded migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable {
                message: e.to_string(),
            })
    }

    /// The underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Leases older than this instant are considered expired
    fn lease_cutoff(&self) -> DateTime<Utc> {
        Utc::now() - chrono::Duration::from_std(self.lease_timeout).unwrap_or_default()
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    // ------------------------------------------------------------------
    // Webhooks
    // ------------------------------------------------------------------

    async fn create_webhook(&self, webhook: &Webhook) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO webhooks (id, tenant_id, name, source, secret, events, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(webhook.id.as_uuid())
        .bind(webhook.tenant_id.as_uuid())
        .bind(&webhook.name)
        .bind(webhook.source.as_str())
        .bind(&webhook.secret)
        .bind(&webhook.events)
        .bind(webhook.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn get_webhook(&self, id: WebhookId) -> Result<Webhook, StoreError> {
        let row = sqlx::query_as::<_, WebhookRow>(
            "SELECT id, tenant_id, name, source, secret, events, created_at \
             FROM webhooks WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| StoreError::NotFound {
            entity: "webhook",
            id: id.to_string(),
        })?;
        row.try_into()
    }

    // ------------------------------------------------------------------
    // Events and the evaluation queue
    // ------------------------------------------------------------------

    #[instrument(skip(self, event), fields(event_id = %event.id))]
    async fn insert_event_with_queue(&self, event: &Event) -> Result<IngestOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let inserted = sqlx::query(
            "INSERT INTO events (id, tenant_id, webhook_id, source, event_type, action, \
                                 raw_payload, dedup_hash, received_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (tenant_id, dedup_hash) WHERE dedup_hash IS NOT NULL DO NOTHING",
        )
        .bind(event.id.as_uuid())
        .bind(event.tenant_id.as_uuid())
        .bind(event.webhook_id.as_uuid())
        .bind(event.source.as_str())
        .bind(&event.event_type)
        .bind(&event.action)
        .bind(&event.raw_payload)
        .bind(&event.dedup_hash)
        .bind(event.received_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await.map_err(storage_error)?;
            debug!(dedup_hash = ?event.dedup_hash, "Delivery deduplicated");
            return Ok(IngestOutcome::Deduplicated);
        }

        sqlx::query("INSERT INTO event_queue (event_id, state) VALUES ($1, 'pending')")
            .bind(event.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(IngestOutcome::Inserted)
    }

    async fn lease_next_event(&self, worker_id: &str) -> Result<EventId, StoreError> {
        let leased = sqlx::query_scalar::<_, Uuid>(
            "WITH next AS ( \
                 SELECT q.event_id \
                 FROM event_queue q \
                 JOIN events e ON e.id = q.event_id \
                 WHERE q.state = 'pending' \
                    OR (q.state = 'leased' AND q.locked_at < $2) \
                 ORDER BY e.received_at \
                 LIMIT 1 \
                 FOR UPDATE OF q SKIP LOCKED \
             ) \
             UPDATE event_queue AS q \
             SET state = 'leased', locked_by = $1, locked_at = now(), \
                 attempts = q.attempts + 1 \
             FROM next \
             WHERE q.event_id = next.event_id \
             RETURNING q.event_id",
        )
        .bind(worker_id)
        .bind(self.lease_cutoff())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        leased.map(EventId::from_uuid).ok_or(StoreError::NoWork)
    }

    async fn get_event(&self, id: EventId) -> Result<Event, StoreError> {
        let row = sqlx::query_as::<_, EventRow>(
            "SELECT id, tenant_id, webhook_id, source, event_type, action, raw_payload, \
                    dedup_hash, received_at \
             FROM events WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| StoreError::NotFound {
            entity: "event",
            id: id.to_string(),
        })?;
        row.try_into()
    }

    async fn mark_event_done(&self, id: EventId) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE event_queue \
             SET state = 'done', locked_by = NULL, locked_at = NULL \
             WHERE event_id = $1",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "event queue entry",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn mark_event_failed(&self, id: EventId, error: &str) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE event_queue \
             SET state = 'failed', locked_by = NULL, locked_at = NULL, last_error = $2 \
             WHERE event_id = $1",
        )
        .bind(id.as_uuid())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "event queue entry",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------

    async fn create_rule(&self, rule: &Rule) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO rules (id, tenant_id, name, description, source, event_type, sql, \
                                evaluation_type, alert_level, active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(rule.id.as_uuid())
        .bind(rule.tenant_id.as_uuid())
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.source.as_str())
        .bind(&rule.event_type)
        .bind(&rule.sql)
        .bind(rule.evaluation_type.as_str())
        .bind(rule.alert_level.as_str())
        .bind(rule.active)
        .bind(rule.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn get_rule(&self, tenant_id: TenantId, id: RuleId) -> Result<Rule, StoreError> {
        let row = sqlx::query_as::<_, RuleRow>(&format!(
            "{SELECT_RULE} WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| StoreError::NotFound {
            entity: "rule",
            id: id.to_string(),
        })?;
        row.try_into()
    }

    async fn list_rules(&self, tenant_id: TenantId) -> Result<Vec<Rule>, StoreError> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "{SELECT_RULE} WHERE tenant_id = $1 ORDER BY created_at"
        ))
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(Rule::try_from).collect()
    }

    async fn get_rules_for(
        &self,
        tenant_id: TenantId,
        source: SourceKind,
        event_type: &str,
    ) -> Result<Vec<Rule>, StoreError> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "{SELECT_RULE} \
             WHERE tenant_id = $1 AND source = $2 AND event_type = $3 AND active \
             ORDER BY created_at"
        ))
        .bind(tenant_id.as_uuid())
        .bind(source.as_str())
        .bind(event_type)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(Rule::try_from).collect()
    }

    async fn set_rule_active(
        &self,
        tenant_id: TenantId,
        id: RuleId,
        active: bool,
    ) -> Result<Rule, StoreError> {
        let row = sqlx::query_as::<_, RuleRow>(
            "UPDATE rules SET active = $3 WHERE id = $1 AND tenant_id = $2 \
             RETURNING id, tenant_id, name, description, source, event_type, sql, \
                       evaluation_type, alert_level, active, created_at",
        )
        .bind(id.as_uuid())
        .bind(tenant_id.as_uuid())
        .bind(active)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| StoreError::NotFound {
            entity: "rule",
            id: id.to_string(),
        })?;
        row.try_into()
    }

    async fn delete_rule(&self, tenant_id: TenantId, id: RuleId) -> Result<(), StoreError> {
        let deleted = sqlx::query("DELETE FROM rules WHERE id = $1 AND tenant_id = $2")
            .bind(id.as_uuid())
            .bind(tenant_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(storage_error)?
            .rows_affected();

        if deleted == 0 {
            return Err(StoreError::NotFound {
                entity: "rule",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Notification channels and rule destinations
    // ------------------------------------------------------------------

    async fn create_channel(&self, channel: &NotificationChannel) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO notification_channels (id, tenant_id, name, type, config, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(channel.id.as_uuid())
        .bind(channel.tenant_id.as_uuid())
        .bind(&channel.name)
        .bind(channel.kind.as_str())
        .bind(&channel.config)
        .bind(channel.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn get_channel(
        &self,
        tenant_id: TenantId,
        id: ChannelId,
    ) -> Result<NotificationChannel, StoreError> {
        let row = sqlx::query_as::<_, ChannelRow>(&format!(
            "{SELECT_CHANNEL} WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| StoreError::NotFound {
            entity: "notification channel",
            id: id.to_string(),
        })?;
        row.try_into()
    }

    async fn list_channels(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<NotificationChannel>, StoreError> {
        let rows = sqlx::query_as::<_, ChannelRow>(&format!(
            "{SELECT_CHANNEL} WHERE tenant_id = $1 ORDER BY created_at"
        ))
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(NotificationChannel::try_from).collect()
    }

    async fn add_rule_destination(
        &self,
        tenant_id: TenantId,
        rule_id: RuleId,
        channel_id: ChannelId,
    ) -> Result<(), StoreError> {
        // Both sides must exist within the tenant before the association
        // is written; the FK constraints close any remaining race.
        self.get_rule(tenant_id, rule_id).await?;
        self.get_channel(tenant_id, channel_id).await?;

        sqlx::query(
            "INSERT INTO rule_destinations (rule_id, channel_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(rule_id.as_uuid())
        .bind(channel_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn remove_rule_destination(
        &self,
        tenant_id: TenantId,
        rule_id: RuleId,
        channel_id: ChannelId,
    ) -> Result<(), StoreError> {
        let deleted = sqlx::query(
            "DELETE FROM rule_destinations \
             WHERE rule_id = $1 AND channel_id = $2 \
               AND rule_id IN (SELECT id FROM rules WHERE tenant_id = $3)",
        )
        .bind(rule_id.as_uuid())
        .bind(channel_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?
        .rows_affected();

        if deleted == 0 {
            return Err(StoreError::NotFound {
                entity: "rule destination",
                id: format!("{rule_id}/{channel_id}"),
            });
        }
        Ok(())
    }

    async fn list_channels_for_rule(
        &self,
        rule_id: RuleId,
    ) -> Result<Vec<NotificationChannel>, StoreError> {
        let rows = sqlx::query_as::<_, ChannelRow>(
            "SELECT c.id, c.tenant_id, c.name, c.type AS channel_type, c.config, c.created_at \
             FROM notification_channels c \
             JOIN rule_destinations d ON d.channel_id = c.id \
             WHERE d.rule_id = $1 \
             ORDER BY c.created_at",
        )
        .bind(rule_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(NotificationChannel::try_from).collect()
    }

    // ------------------------------------------------------------------
    // Alerts and the delivery queue
    // ------------------------------------------------------------------

    #[instrument(skip(self, alert), fields(alert_id = %alert.id))]
    async fn insert_alert_with_queue(&self, alert: &Alert) -> Result<AlertOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let inserted = sqlx::query(
            "INSERT INTO alerts (id, tenant_id, rule_id, event_id, triggered_at, notified) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (rule_id, event_id) DO NOTHING",
        )
        .bind(alert.id.as_uuid())
        .bind(alert.tenant_id.as_uuid())
        .bind(alert.rule_id.as_uuid())
        .bind(alert.event_id.as_uuid())
        .bind(alert.triggered_at)
        .bind(alert.notified)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await.map_err(storage_error)?;
            debug!(rule_id = %alert.rule_id, event_id = %alert.event_id,
                   "Alert already exists for (rule, event)");
            return Ok(AlertOutcome::Duplicate);
        }

        sqlx::query("INSERT INTO alert_queue (alert_id, state) VALUES ($1, 'pending')")
            .bind(alert.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(AlertOutcome::Created)
    }

    async fn lease_next_alert(&self, worker_id: &str) -> Result<AlertId, StoreError> {
        let leased = sqlx::query_scalar::<_, Uuid>(
            "WITH next AS ( \
                 SELECT q.alert_id \
                 FROM alert_queue q \
                 JOIN alerts a ON a.id = q.alert_id \
                 WHERE q.state = 'pending' \
                    OR (q.state = 'leased' AND q.locked_at < $2) \
                 ORDER BY a.triggered_at \
                 LIMIT 1 \
                 FOR UPDATE OF q SKIP LOCKED \
             ) \
             UPDATE alert_queue AS q \
             SET state = 'leased', locked_by = $1, locked_at = now(), \
                 attempts = q.attempts + 1 \
             FROM next \
             WHERE q.alert_id = next.alert_id \
             RETURNING q.alert_id",
        )
        .bind(worker_id)
        .bind(self.lease_cutoff())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        leased.map(AlertId::from_uuid).ok_or(StoreError::NoWork)
    }

    async fn get_alert(&self, id: AlertId) -> Result<Alert, StoreError> {
        let row = sqlx::query_as::<_, AlertRow>(
            "SELECT id, tenant_id, rule_id, event_id, triggered_at, notified \
             FROM alerts WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| StoreError::NotFound {
            entity: "alert",
            id: id.to_string(),
        })?;
        Ok(row.into())
    }

    async fn record_delivery(&self, delivery: &AlertDelivery) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO alert_deliveries (alert_id, channel_id, status, error, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(delivery.alert_id.as_uuid())
        .bind(delivery.channel_id.as_uuid())
        .bind(delivery.status.as_str())
        .bind(&delivery.error)
        .bind(delivery.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn mark_alert_delivered(&self, id: AlertId) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE alert_queue \
             SET state = 'done', locked_by = NULL, locked_at = NULL \
             WHERE alert_id = $1",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "alert queue entry",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn mark_alert_failed(&self, id: AlertId, error: &str) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE alert_queue \
             SET state = 'failed', locked_by = NULL, locked_at = NULL, last_error = $2 \
             WHERE alert_id = $1",
        )
        .bind(id.as_uuid())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "alert queue entry",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn mark_alert_notified(&self, id: AlertId) -> Result<(), StoreError> {
        let updated = sqlx::query("UPDATE alerts SET notified = TRUE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(storage_error)?
            .rows_affected();

        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "alert",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "postgres_tests.rs"]
mod tests;
