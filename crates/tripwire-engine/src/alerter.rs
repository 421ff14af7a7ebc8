//! The notification worker.
//!
//! Each pass leases one alert, loads the rule and event behind it, renders
//! one message, and dispatches it to every channel attached to the rule.
//! Per-channel outcomes land in `alert_deliveries`; the alert itself is
//! marked delivered and notified once every channel has been attempted,
//! whether or not any of them succeeded — partial failure is visible in the
//! delivery rows, not in the queue state.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use tripwire_core::notify::{channel_config_from_json, NotifierRegistry, NotifyError};
use tripwire_core::source::SourceRegistry;
use tripwire_core::store::{EventStore, StoreError};
use tripwire_core::{AlertDelivery, DeliveryStatus, Message, NotificationChannel};

use crate::{EngineError, WorkerConfig};

/// Leases alerts and dispatches them through the notifier registry
pub struct Alerter {
    store: Arc<dyn EventStore>,
    notifiers: Arc<NotifierRegistry>,
    sources: Arc<SourceRegistry>,
    config: WorkerConfig,
}

impl Alerter {
    /// Create an alerter over `store`, dispatching through `notifiers`.
    ///
    /// The source registry supplies `resource_url` extraction so messages
    /// can link back to the thing that triggered them.
    pub fn new(
        store: Arc<dyn EventStore>,
        notifiers: Arc<NotifierRegistry>,
        sources: Arc<SourceRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            notifiers,
            sources,
            config,
        }
    }

    /// Run until `shutdown` flips, attempting one lease per tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), EngineError> {
        let mut tick = tokio::time::interval(self.config.tick);
        info!(worker_id = %self.config.worker_id, "Alerter started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!(worker_id = %self.config.worker_id, "Alerter stopping");
                    return Ok(());
                }
                _ = tick.tick() => {
                    if let Err(e) = self.execute_once().await {
                        error!(worker_id = %self.config.worker_id, error = %e,
                               "Notification pass failed; will retry next tick");
                    }
                }
            }
        }
    }

    /// One notification pass: lease → render → deliver → record → ack.
    ///
    /// Returns `Ok(false)` when the queue was empty.
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn execute_once(&self) -> Result<bool, EngineError> {
        let alert_id = match self.store.lease_next_alert(&self.config.worker_id).await {
            Ok(id) => id,
            Err(StoreError::NoWork) => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let alert = self.store.get_alert(alert_id).await?;
        let rule = self.store.get_rule(alert.tenant_id, alert.rule_id).await?;
        let event = self.store.get_event(alert.event_id).await?;
        let channels = self.store.list_channels_for_rule(alert.rule_id).await?;
        debug!(
            alert_id = %alert.id,
            rule_id = %rule.id,
            channel_count = channels.len(),
            "Dispatching alert"
        );

        let resource_link = self
            .sources
            .parser(event.source)
            .and_then(|parser| parser.resource_url(&event.raw_payload).ok());
        let message = Message::for_alert(&rule, &event.event_type, resource_link);

        for channel in &channels {
            let (status, error) = match self.dispatch(channel, &message).await {
                Ok(()) => (DeliveryStatus::Delivered, None),
                Err(e) => {
                    warn!(
                        alert_id = %alert.id,
                        channel_id = %channel.id,
                        channel_type = %channel.kind,
                        error = %e,
                        "Delivery failed"
                    );
                    (DeliveryStatus::Failed, Some(e.to_string()))
                }
            };

            let delivery = AlertDelivery::new(alert.id, channel.id, status, error);
            if let Err(e) = self.store.record_delivery(&delivery).await {
                error!(
                    alert_id = %alert.id,
                    channel_id = %channel.id,
                    error = %e,
                    "Failed to record delivery outcome"
                );
            }
        }

        self.store.mark_alert_delivered(alert.id).await?;
        self.store.mark_alert_notified(alert.id).await?;
        info!(alert_id = %alert.id, channels = channels.len(), "Alert dispatched");
        Ok(true)
    }

    /// Deliver one message to one channel.
    ///
    /// A channel type with no registered notifier is an unrouteable — but
    /// never fatal — delivery failure.
    async fn dispatch(
        &self,
        channel: &NotificationChannel,
        message: &Message,
    ) -> Result<(), NotifyError> {
        let notifier =
            self.notifiers
                .get(channel.kind)
                .ok_or_else(|| NotifyError::UnknownChannelType {
                    kind: channel.kind.to_string(),
                })?;

        let config = channel_config_from_json(&channel.config)?;
        notifier.send(&config, message).await
    }
}

#[cfg(test)]
#[path = "alerter_tests.rs"]
mod tests;
