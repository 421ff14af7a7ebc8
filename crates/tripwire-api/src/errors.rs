//! Error types for the HTTP service.
//!
//! [`ApiError`] folds the module error enums into HTTP statuses following
//! the service's taxonomy:
//!
//! - `400 Bad Request` — input errors (malformed requests, unknown sources
//!   or channel types, invalid identifiers); never retried
//! - `401 Unauthorized` — signature validation failures; never retried
//! - `404 Not Found` — missing webhooks, rules, channels
//! - `500 Internal Server Error` — transient storage or delivery failures
//!
//! Storage details never reach the client; they are logged server-side and
//! replaced with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use tracing::{error, warn};

use tripwire_core::notify::NotifyError;
use tripwire_core::source::SourceError;
use tripwire_core::store::StoreError;

// ============================================================================
// ApiError
// ============================================================================

/// Request handler errors with HTTP status mapping
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body or a field in it is unusable
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// A path segment is not a valid identifier
    #[error("invalid identifier: {value}")]
    InvalidId { value: String },

    /// Source-layer failure (signature, payload, event type)
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Notifier-layer failure (unknown channel type, config, delivery)
    #[error(transparent)]
    Notify(#[from] NotifyError),

    /// Store-layer failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } | Self::InvalidId { .. } => StatusCode::BAD_REQUEST,

            Self::Source(SourceError::MissingSignature)
            | Self::Source(SourceError::InvalidSignature) => StatusCode::UNAUTHORIZED,
            Self::Source(_) => StatusCode::BAD_REQUEST,

            Self::Notify(NotifyError::UnknownChannelType { .. })
            | Self::Notify(NotifyError::MissingConfig { .. })
            | Self::Notify(NotifyError::InvalidConfig { .. }) => StatusCode::BAD_REQUEST,
            Self::Notify(_) => StatusCode::INTERNAL_SERVER_ERROR,

            Self::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Storage internals stay server-side.
        let message = match &self {
            Self::Store(e) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!(error = %e, "Storage error while handling request");
                "internal error".to_string()
            }
            other => {
                if status == StatusCode::UNAUTHORIZED {
                    warn!(error = %other, "Rejected unauthenticated request");
                }
                other.to_string()
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        (status, Json(body)).into_response()
    }
}

// ============================================================================
// ServiceError
// ============================================================================

/// Server lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },
}
