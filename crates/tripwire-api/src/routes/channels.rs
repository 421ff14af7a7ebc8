//! Notification channel administration and the synchronous test endpoint.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument};

use tripwire_core::notify::{channel_config_from_json, ChannelKind, NotifyError};
use tripwire_core::{ChannelId, NotificationChannel};

use crate::errors::ApiError;
use crate::responses::ChannelTestResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub config: serde_json::Value,
}

/// `POST /api/notification-channels`
#[instrument(skip(state, request), fields(kind = %request.kind))]
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateChannelRequest>,
) -> Result<(StatusCode, Json<NotificationChannel>), ApiError> {
    let kind: ChannelKind = request.kind.parse()?;
    if !state.notifiers.is_enabled(kind) {
        return Err(NotifyError::UnknownChannelType { kind: request.kind }.into());
    }

    // Surface config-shape mistakes at creation time instead of at the
    // first delivery.
    channel_config_from_json(&request.config)?;

    let channel = NotificationChannel {
        id: ChannelId::new(),
        tenant_id: state.tenant_id,
        name: request.name,
        kind,
        config: request.config,
        created_at: Utc::now(),
    };
    state.store.create_channel(&channel).await?;

    info!(channel_id = %channel.id, kind = %kind, "Notification channel created");
    Ok((StatusCode::CREATED, Json(channel)))
}

/// `GET /api/notification-channels`
pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<NotificationChannel>>, ApiError> {
    Ok(Json(state.store.list_channels(state.tenant_id).await?))
}

/// `POST /api/notification-channels/{id}/test`
///
/// Synchronously dispatches the notifier's fixed test message through the
/// channel's configuration.
#[instrument(skip(state))]
pub async fn test(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChannelTestResponse>, ApiError> {
    let id: ChannelId = id
        .parse()
        .map_err(|_| ApiError::InvalidId { value: id })?;
    let channel = state.store.get_channel(state.tenant_id, id).await?;

    let notifier = state
        .notifiers
        .get(channel.kind)
        .ok_or_else(|| NotifyError::UnknownChannelType {
            kind: channel.kind.to_string(),
        })?;

    let config = channel_config_from_json(&channel.config)?;
    notifier.test(&config).await?;

    Ok(Json(ChannelTestResponse { status: "ok" }))
}
