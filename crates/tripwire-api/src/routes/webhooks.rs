//! Webhook administration: create an endpoint, fetch its definition.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::{info, instrument};

use tripwire_core::source::SourceKind;
use tripwire_core::{Webhook, WebhookId};

use crate::errors::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateWebhookRequest {
    pub name: String,
    pub source: String,
    #[serde(default)]
    pub events: Vec<String>,
}

/// `POST /api/webhooks`
///
/// Creates a webhook with a server-generated signing secret. The secret is
/// returned exactly once here and on explicit reads; operators configure it
/// at the provider.
#[instrument(skip(state, request), fields(source = %request.source))]
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateWebhookRequest>,
) -> Result<(StatusCode, Json<Webhook>), ApiError> {
    let source: SourceKind = request.source.parse()?;
    if !state.sources.is_enabled(source) {
        return Err(tripwire_core::source::SourceError::UnknownSource {
            source_name: request.source,
        }
        .into());
    }

    let webhook = Webhook::new(state.tenant_id, request.name, source, request.events);
    state.store.create_webhook(&webhook).await?;

    info!(webhook_id = %webhook.id, source = %source, "Webhook created");
    Ok((StatusCode::CREATED, Json(webhook)))
}

/// `GET /api/webhooks/{id}`
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Webhook>, ApiError> {
    let id: WebhookId = id
        .parse()
        .map_err(|_| ApiError::InvalidId { value: id })?;
    let webhook = state.store.get_webhook(id).await?;
    Ok(Json(webhook))
}
