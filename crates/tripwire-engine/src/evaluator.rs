//! The evaluation worker.
//!
//! Each pass leases one event, builds a fresh sandbox around it, runs every
//! active rule in the event's `(tenant, source, event_type)` scope, and
//! records matches as alerts. A single bad rule never stops the pass; a
//! broken event (one the sandbox cannot even load) is marked failed rather
//! than retried forever.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use tripwire_core::store::{AlertOutcome, EventStore, StoreError};
use tripwire_core::{Alert, Event, Rule, Sandbox};

use crate::{EngineError, WorkerConfig};

/// Leases events and evaluates rules against them
pub struct Evaluator {
    store: Arc<dyn EventStore>,
    config: WorkerConfig,
}

impl Evaluator {
    /// Create an evaluator over `store`
    pub fn new(store: Arc<dyn EventStore>, config: WorkerConfig) -> Self {
        Self { store, config }
    }

    /// Run until `shutdown` flips, attempting one lease per tick.
    ///
    /// Pass-level errors are logged and retried on a later tick; they never
    /// end the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), EngineError> {
        let mut tick = tokio::time::interval(self.config.tick);
        info!(worker_id = %self.config.worker_id, "Evaluator started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!(worker_id = %self.config.worker_id, "Evaluator stopping");
                    return Ok(());
                }
                _ = tick.tick() => {
                    if let Err(e) = self.execute_once().await {
                        error!(worker_id = %self.config.worker_id, error = %e,
                               "Evaluation pass failed; will retry next tick");
                    }
                }
            }
        }
    }

    /// One evaluation pass: lease → evaluate → record → ack.
    ///
    /// Returns `Ok(false)` when the queue was empty.
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn execute_once(&self) -> Result<bool, EngineError> {
        let event_id = match self.store.lease_next_event(&self.config.worker_id).await {
            Ok(id) => id,
            Err(StoreError::NoWork) => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let event = self.store.get_event(event_id).await?;
        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            source = %event.source,
            lag_ms = (Utc::now() - event.received_at).num_milliseconds(),
            "Processing event"
        );

        let rules = self
            .store
            .get_rules_for(event.tenant_id, event.source, &event.event_type)
            .await?;
        debug!(event_id = %event.id, rule_count = rules.len(), "Fetched rules for event");

        // An event the sandbox cannot even load will not get better on
        // retry; it is terminal for this entry.
        let sandbox = match Sandbox::open().and_then(|s| s.add_event(&event).map(|()| s)) {
            Ok(sandbox) => sandbox,
            Err(e) => {
                error!(event_id = %event.id, error = %e, "Sandbox rejected event");
                self.store
                    .mark_event_failed(event_id, &e.to_string())
                    .await?;
                return Ok(true);
            }
        };

        for rule in &rules {
            match sandbox.execute_rule(rule) {
                Ok(count) if count > 0 => {
                    debug!(event_id = %event.id, rule_id = %rule.id, count, "Rule matched");
                    if let Err(e) = self.create_alert(rule, &event).await {
                        error!(
                            event_id = %event.id,
                            rule_id = %rule.id,
                            error = %e,
                            "Failed to save alert"
                        );
                    }
                }
                Ok(_) => {}
                // One bad rule must not stop the loop.
                Err(e) => {
                    warn!(
                        event_id = %event.id,
                        rule_id = %rule.id,
                        error = %e,
                        "Rule execution failed; continuing with next rule"
                    );
                }
            }
        }

        if let Err(e) = sandbox.close() {
            warn!(event_id = %event.id, error = %e, "Sandbox close failed");
        }

        self.store.mark_event_done(event_id).await?;
        Ok(true)
    }

    /// Record a match as an alert plus its pending delivery-queue entry, in
    /// one transaction. Idempotent across lease retries.
    async fn create_alert(&self, rule: &Rule, event: &Event) -> Result<(), StoreError> {
        let alert = Alert::new(rule, event);
        match self.store.insert_alert_with_queue(&alert).await? {
            AlertOutcome::Created => {
                info!(
                    alert_id = %alert.id,
                    rule_id = %rule.id,
                    event_id = %event.id,
                    level = %rule.alert_level,
                    "Alert raised"
                );
            }
            AlertOutcome::Duplicate => {
                debug!(
                    rule_id = %rule.id,
                    event_id = %event.id,
                    "Alert already recorded for this (rule, event)"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "evaluator_tests.rs"]
mod tests;
