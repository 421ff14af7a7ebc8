//! Rule destinations: the rule → channel associations alerts fan out over.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::{info, instrument};

use tripwire_core::{ChannelId, NotificationChannel, RuleId};

use crate::errors::ApiError;
use crate::responses::DestinationResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AddDestinationRequest {
    pub channel_id: String,
}

fn parse_rule_id(value: String) -> Result<RuleId, ApiError> {
    value
        .parse()
        .map_err(|_| ApiError::InvalidId { value })
}

fn parse_channel_id(value: String) -> Result<ChannelId, ApiError> {
    value
        .parse()
        .map_err(|_| ApiError::InvalidId { value })
}

/// `POST /api/rules/{id}/destinations`
#[instrument(skip(state, request))]
pub async fn create(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AddDestinationRequest>,
) -> Result<(StatusCode, Json<DestinationResponse>), ApiError> {
    let rule_id = parse_rule_id(id)?;
    let channel_id = parse_channel_id(request.channel_id)?;

    state
        .store
        .add_rule_destination(state.tenant_id, rule_id, channel_id)
        .await?;

    info!(rule_id = %rule_id, channel_id = %channel_id, "Destination attached");
    Ok((
        StatusCode::CREATED,
        Json(DestinationResponse {
            rule_id,
            channel_id,
        }),
    ))
}

/// `GET /api/rules/{id}/destinations`
pub async fn list(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<NotificationChannel>>, ApiError> {
    let rule_id = parse_rule_id(id)?;
    // 404 for unknown rules, not an empty list.
    state.store.get_rule(state.tenant_id, rule_id).await?;
    Ok(Json(state.store.list_channels_for_rule(rule_id).await?))
}

/// `DELETE /api/rules/{id}/destinations/{dest_id}`
#[instrument(skip(state))]
pub async fn remove(
    State(state): State<AppState>,
    Path((id, dest_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let rule_id = parse_rule_id(id)?;
    let channel_id = parse_channel_id(dest_id)?;

    state
        .store
        .remove_rule_destination(state.tenant_id, rule_id, channel_id)
        .await?;

    info!(rule_id = %rule_id, channel_id = %channel_id, "Destination detached");
    Ok(StatusCode::NO_CONTENT)
}
