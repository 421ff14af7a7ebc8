//! # Tripwire Store
//!
//! [`EventStore`](tripwire_core::store::EventStore) backends.
//!
//! Two implementations share the contract:
//! - [`PgEventStore`] — the production backend on PostgreSQL, using
//!   row-level locking with skip-locked reads for the queue-lease protocol
//!   and native transactions for the event→queue and alert→queue coupling.
//! - [`MemoryEventStore`] — a fully functional in-process backend for tests
//!   and development, including lease expiry and deduplication semantics.
//!
//! Consumers depend on the trait; which backend is injected is a wiring
//! decision made at startup.

pub mod memory;
pub mod postgres;

pub use memory::MemoryEventStore;
pub use postgres::{PgEventStore, DEFAULT_LEASE_TIMEOUT, MIGRATOR};
