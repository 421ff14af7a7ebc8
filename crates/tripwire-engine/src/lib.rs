//! # Tripwire Engine
//!
//! The two single-leased workers behind the ingest pipeline:
//!
//! - [`Evaluator`] leases events from the evaluation queue, runs every
//!   matching active rule against the event in a fresh SQL sandbox, and
//!   records matches as alerts.
//! - [`Alerter`] leases alerts from the delivery queue, renders a message,
//!   and dispatches it to every channel attached to the alert's rule,
//!   recording per-channel outcomes.
//!
//! Both are tick-driven loops (one lease attempt per tick) that exit at the
//! next tick boundary when the shared shutdown signal flips. Leases expire
//! on a configurable freshness window, so a worker killed mid-item does not
//! strand it — the entry is simply re-leased later.

use std::time::Duration;

use tripwire_core::store::StoreError;

pub mod alerter;
pub mod evaluator;

pub use alerter::Alerter;
pub use evaluator::Evaluator;

/// Interval between lease attempts.
///
/// Deliberately conservative throughput (one item per second per worker);
/// raising the tick rate changes nothing semantically.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

// ============================================================================
// Worker Configuration
// ============================================================================

/// Identity and pacing for one worker loop
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identity written into `locked_by` when leasing
    pub worker_id: String,
    /// Interval between lease attempts
    pub tick: Duration,
}

impl WorkerConfig {
    /// Default configuration for the evaluation worker
    pub fn evaluator() -> Self {
        Self {
            worker_id: "evaluator-1".to_string(),
            tick: DEFAULT_TICK,
        }
    }

    /// Default configuration for the notification worker
    pub fn alerter() -> Self {
        Self {
            worker_id: "alerter-1".to_string(),
            tick: DEFAULT_TICK,
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that escape a worker pass.
///
/// Everything reaching this level is transient from the loop's point of
/// view: the pass is logged and retried on a later tick, and any leased
/// entry is recovered through lease expiry.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),
}
