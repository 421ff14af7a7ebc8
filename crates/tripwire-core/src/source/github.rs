//! GitHub source implementation.
//!
//! Validates deliveries with the `X-Hub-Signature-256` HMAC header and
//! parses the GitHub webhook wire format (`X-GitHub-Event` event type,
//! `X-GitHub-Delivery` delivery id, JSON payload).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use super::{InboundRequest, Parser, SourceError, Validator};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the HMAC-SHA256 signature of the raw body
const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Header carrying the event-type discriminator
const EVENT_TYPE_HEADER: &str = "x-github-event";

/// Header carrying GitHub's unique delivery id
const DELIVERY_ID_HEADER: &str = "x-github-delivery";

/// Seeded detection rule: a pull request merged with nobody looking.
///
/// Matches a `pull_request` event whose action is `closed`, whose PR was
/// merged, and which had no assignees, no requested reviewers, and zero
/// comments. Written in the sandbox engine's SQL dialect (SQLite JSON1).
pub const UNREVIEWED_MERGE_RULE_SQL: &str = "\
SELECT id FROM events
WHERE json_extract(raw_payload, '$.action') = 'closed'
  AND json_extract(raw_payload, '$.pull_request.merged') = 1
  AND json_array_length(raw_payload, '$.pull_request.assignees') = 0
  AND json_array_length(raw_payload, '$.pull_request.requested_reviewers') = 0
  AND json_extract(raw_payload, '$.pull_request.comments') = 0";

// ============================================================================
// GithubValidator
// ============================================================================

/// Validates GitHub webhook deliveries.
///
/// Computes `HMAC-SHA256(secret, raw-body)` and compares it against the
/// hex digest in `X-Hub-Signature-256` (after stripping the `sha256=`
/// prefix). The comparison runs in constant time via
/// [`hmac::Mac::verify_slice`] to prevent timing-based secret recovery.
pub struct GithubValidator;

impl Validator for GithubValidator {
    fn validate(&self, request: &InboundRequest, secret: &str) -> Result<(), SourceError> {
        let signature = request
            .header(SIGNATURE_HEADER)
            .ok_or(SourceError::MissingSignature)?;

        let hex_part = signature.strip_prefix("sha256=").unwrap_or(signature);
        let sig_bytes = hex::decode(hex_part).map_err(|_| SourceError::InvalidSignature)?;

        // An HMAC key can be any length; new_from_slice only fails for
        // unreasonable inputs the hex secret can never produce.
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SourceError::InvalidSignature)?;
        mac.update(request.body());

        mac.verify_slice(&sig_bytes)
            .map_err(|_| SourceError::InvalidSignature)
    }
}

// ============================================================================
// GithubParser
// ============================================================================

/// Parses the GitHub webhook wire format
pub struct GithubParser;

impl Parser for GithubParser {
    fn parse(&self, request: &InboundRequest) -> Result<serde_json::Value, SourceError> {
        serde_json::from_slice(request.body()).map_err(|e| SourceError::MalformedPayload {
            message: e.to_string(),
        })
    }

    fn event_type(&self, request: &InboundRequest) -> Result<String, SourceError> {
        request
            .header(EVENT_TYPE_HEADER)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .ok_or(SourceError::MissingType)
    }

    /// Canonical resource URL: `pull_request.html_url`
    fn resource_url(&self, payload: &serde_json::Value) -> Result<Url, SourceError> {
        let url_str = payload
            .get("pull_request")
            .and_then(|pr| pr.get("html_url"))
            .and_then(|u| u.as_str())
            .filter(|u| !u.is_empty())
            .ok_or(SourceError::NoResource)?;

        Url::parse(url_str).map_err(|_| SourceError::NoResource)
    }

    fn delivery_id(&self, request: &InboundRequest) -> Option<String> {
        request
            .header(DELIVERY_ID_HEADER)
            .filter(|v| !v.is_empty())
            .map(String::from)
    }
}

#[cfg(test)]
#[path = "github_tests.rs"]
mod tests;
