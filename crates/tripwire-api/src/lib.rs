//! # Tripwire HTTP API
//!
//! The admin and ingest surface:
//!
//! - `POST /api/events/{webhook_id}` — the validated ingest endpoint
//! - webhook, rule, and notification-channel administration
//! - `POST /api/rules/{id}/test` — dry-run a rule against a posted payload
//! - `POST /api/notification-channels/{id}/test` — synchronous test message
//!
//! Handlers depend on the [`EventStore`] trait and the two startup-built
//! registries; which store backend sits behind them is decided by the
//! binary that wires the service together.

pub mod errors;
pub mod responses;
pub mod routes;

use axum::routing::{delete, get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use tripwire_core::notify::NotifierRegistry;
use tripwire_core::source::SourceRegistry;
use tripwire_core::store::EventStore;
use tripwire_core::TenantId;

pub use errors::{ApiError, ServiceError};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Persistence for every entity and both work queues
    pub store: Arc<dyn EventStore>,

    /// Per-source validators and parsers
    pub sources: Arc<SourceRegistry>,

    /// Per-channel-type notifiers
    pub notifiers: Arc<NotifierRegistry>,

    /// The tenant every request is scoped to until an auth layer exists
    pub tenant_id: TenantId,
}

impl AppState {
    /// Create application state scoped to the hard-coded tenant
    pub fn new(
        store: Arc<dyn EventStore>,
        sources: Arc<SourceRegistry>,
        notifiers: Arc<NotifierRegistry>,
    ) -> Self {
        Self {
            store,
            sources,
            notifiers,
            tenant_id: TenantId::default_tenant(),
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create the HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health_check))
        .route("/api/webhooks", post(routes::webhooks::create))
        .route("/api/webhooks/{id}", get(routes::webhooks::get_by_id))
        .route("/api/events/{webhook_id}", post(routes::events::ingest))
        .route(
            "/api/notification-channels",
            post(routes::channels::create).get(routes::channels::list),
        )
        .route(
            "/api/notification-channels/{id}/test",
            post(routes::channels::test),
        )
        .route(
            "/api/rules",
            post(routes::rules::create).get(routes::rules::list),
        )
        .route(
            "/api/rules/{id}",
            get(routes::rules::get_by_id)
                .patch(routes::rules::patch)
                .delete(routes::rules::remove),
        )
        .route("/api/rules/{id}/test", post(routes::rules::test))
        .route(
            "/api/rules/{id}/destinations",
            post(routes::destinations::create).get(routes::destinations::list),
        )
        .route(
            "/api/rules/{id}/destinations/{dest_id}",
            delete(routes::destinations::remove),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .into_inner(),
        )
        .with_state(state)
}

/// Start the HTTP server on `port`, draining gracefully when `shutdown`
/// flips.
pub async fn start_server(
    state: AppState,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServiceError> {
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: addr.to_string(),
            message: e.to_string(),
        })?;

    info!("Starting HTTP server on {}", addr);

    // In-flight requests complete; new connections stop immediately.
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            info!("HTTP server draining");
        })
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

// ============================================================================
// Health
// ============================================================================

/// Liveness probe
async fn handle_health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
