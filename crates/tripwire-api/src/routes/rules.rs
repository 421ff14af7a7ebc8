//! Rule administration and the dry-run endpoint.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use tripwire_core::source::SourceKind;
use tripwire_core::{
    AlertLevel, EvaluationType, Event, EventId, Rule, RuleId, Sandbox, WebhookId,
};

use crate::errors::ApiError;
use crate::responses::RuleTestResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub source: String,
    pub event_type: String,
    /// The SQL predicate body (`condition` on the wire, `sql` accepted)
    #[serde(alias = "sql")]
    pub condition: String,
    #[serde(default)]
    pub evaluation_type: Option<String>,
    pub alert_level: String,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PatchRuleRequest {
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TestRuleRequest {
    pub event: serde_json::Value,
}

fn parse_rule_id(value: String) -> Result<RuleId, ApiError> {
    value
        .parse()
        .map_err(|_| ApiError::InvalidId { value })
}

/// `POST /api/rules`
#[instrument(skip(state, request), fields(name = %request.name))]
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<Rule>), ApiError> {
    let source: SourceKind = request.source.parse()?;
    if !state.sources.is_enabled(source) {
        return Err(tripwire_core::source::SourceError::UnknownSource {
            source_name: request.source,
        }
        .into());
    }

    let alert_level: AlertLevel =
        request
            .alert_level
            .parse()
            .map_err(|_| ApiError::InvalidRequest {
                message: format!("invalid alert_level '{}'", request.alert_level),
            })?;

    let evaluation_type = match request.evaluation_type.as_deref() {
        None => EvaluationType::LiveTrigger,
        Some(raw) => raw.parse().map_err(|_| ApiError::InvalidRequest {
            message: format!("invalid evaluation_type '{raw}'"),
        })?,
    };

    let rule = Rule {
        id: RuleId::new(),
        tenant_id: state.tenant_id,
        name: request.name,
        description: request.description.filter(|d| !d.is_empty()),
        source,
        event_type: request.event_type,
        sql: request.condition,
        evaluation_type,
        alert_level,
        active: request.active.unwrap_or(false),
        created_at: Utc::now(),
    };
    state.store.create_rule(&rule).await?;

    info!(rule_id = %rule.id, source = %source, event_type = %rule.event_type, "Rule created");
    Ok((StatusCode::CREATED, Json(rule)))
}

/// `GET /api/rules`
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Rule>>, ApiError> {
    Ok(Json(state.store.list_rules(state.tenant_id).await?))
}

/// `GET /api/rules/{id}`
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Rule>, ApiError> {
    let id = parse_rule_id(id)?;
    Ok(Json(state.store.get_rule(state.tenant_id, id).await?))
}

/// `PATCH /api/rules/{id}` — toggle `active`
pub async fn patch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PatchRuleRequest>,
) -> Result<Json<Rule>, ApiError> {
    let id = parse_rule_id(id)?;
    let active = request.active.ok_or_else(|| ApiError::InvalidRequest {
        message: "missing active field".to_string(),
    })?;

    let rule = state
        .store
        .set_rule_active(state.tenant_id, id, active)
        .await?;
    info!(rule_id = %rule.id, active, "Rule toggled");
    Ok(Json(rule))
}

/// `DELETE /api/rules/{id}`
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_rule_id(id)?;
    state.store.delete_rule(state.tenant_id, id).await?;
    info!(rule_id = %id, "Rule deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/rules/{id}/test`
///
/// Dry-run the stored rule against a posted payload: a synthetic event is
/// built from the request body, loaded into a fresh sandbox, and evaluated.
/// Sandbox failures surface in the `error` field with `match = false`
/// rather than failing the request.
#[instrument(skip(state, request))]
pub async fn test(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<TestRuleRequest>,
) -> Result<Json<RuleTestResponse>, ApiError> {
    let id = parse_rule_id(id)?;
    let rule = state.store.get_rule(state.tenant_id, id).await?;

    let event = Event {
        id: EventId::new(),
        tenant_id: rule.tenant_id,
        webhook_id: WebhookId::new(),
        source: rule.source,
        event_type: rule.event_type.clone(),
        action: request
            .event
            .get("action")
            .and_then(|a| a.as_str())
            .map(String::from),
        raw_payload: request.event,
        dedup_hash: None,
        received_at: Utc::now(),
    };

    let details = serde_json::json!({
        "rule_id": rule.id,
        "rule_name": rule.name,
        "sql": rule.sql,
        "event": event.raw_payload,
    });

    let outcome = Sandbox::open()
        .and_then(|sandbox| sandbox.add_event(&event).map(|()| sandbox))
        .and_then(|sandbox| sandbox.execute_rule(&rule));

    let response = match outcome {
        Ok(count) => RuleTestResponse {
            matched: count > 0,
            alert_level: rule.alert_level,
            details,
            error: None,
        },
        Err(e) => {
            warn!(rule_id = %rule.id, error = %e, "Rule dry-run failed");
            RuleTestResponse {
                matched: false,
                alert_level: rule.alert_level,
                details,
                error: Some(e.to_string()),
            }
        }
    };

    Ok(Json(response))
}
