//! The ingest endpoint.
//!
//! `POST /api/events/{webhook_id}` authenticates the delivery against the
//! webhook's secret, parses it through the source's parser, and persists
//! the event together with its pending evaluation-queue entry in one
//! transaction. All-or-nothing: a failure anywhere leaves no partial rows.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use tripwire_core::source::{InboundRequest, SourceError};
use tripwire_core::store::IngestOutcome;
use tripwire_core::{Event, WebhookId};

use crate::errors::ApiError;
use crate::responses::IngestResponse;
use crate::AppState;

/// Stable hash tying a delivery to `(source, event_type, delivery_id)`.
///
/// Providers that redeliver (GitHub does, on manual redelivery and some
/// retries) reuse the delivery id, so the hash makes the second insert a
/// no-op.
fn dedup_hash(source: &str, event_type: &str, delivery_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"|");
    hasher.update(event_type.as_bytes());
    hasher.update(b"|");
    hasher.update(delivery_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// `POST /api/events/{webhook_id}`
#[instrument(skip(state, headers, body), fields(webhook_id = %webhook_id))]
pub async fn ingest(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    let webhook_id: WebhookId = webhook_id
        .parse()
        .map_err(|_| ApiError::InvalidId { value: webhook_id })?;

    // 1. The webhook must exist (404 otherwise).
    let webhook = state.store.get_webhook(webhook_id).await?;

    // 2–3. Authenticate with the source's validator (401 on failure).
    let validator =
        state
            .sources
            .validator(webhook.source)
            .ok_or_else(|| SourceError::UnknownSource {
                source_name: webhook.source.to_string(),
            })?;

    let header_pairs = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect::<Vec<_>>();
    let request = InboundRequest::new(header_pairs, body);

    validator.validate(&request, &webhook.secret)?;

    // 4. Extract the event type and payload (400 on failure).
    let parser = state
        .sources
        .parser(webhook.source)
        .ok_or_else(|| SourceError::UnknownSource {
            source_name: webhook.source.to_string(),
        })?;

    let event_type = parser.event_type(&request)?;
    let payload = parser.parse(&request)?;

    let action = payload
        .get("action")
        .and_then(|a| a.as_str())
        .map(String::from);

    let hash = parser
        .delivery_id(&request)
        .map(|delivery_id| dedup_hash(webhook.source.as_str(), &event_type, &delivery_id));

    // 5. One transaction: the event and its pending queue entry.
    let event = Event::new(&webhook, event_type, action, payload, hash);
    let outcome = state.store.insert_event_with_queue(&event).await?;

    Ok(match outcome {
        IngestOutcome::Inserted => {
            info!(
                event_id = %event.id,
                event_type = %event.event_type,
                source = %event.source,
                "Event accepted"
            );
            Json(IngestResponse {
                status: "accepted",
                event_id: Some(event.id),
            })
        }
        IngestOutcome::Deduplicated => {
            info!(event_type = %event.event_type, "Duplicate delivery ignored");
            Json(IngestResponse {
                status: "duplicate",
                event_id: None,
            })
        }
    })
}
