//! # Event Source Module
//!
//! Per-source request validation and payload parsing for inbound webhook
//! deliveries.
//!
//! Each supported source (GitHub being the built-in) contributes a
//! [`Validator`] that authenticates a request against the webhook secret and
//! a [`Parser`] that extracts the payload, the event-type discriminator, and
//! a canonical resource URL. The [`SourceRegistry`] maps a [`SourceKind`] to
//! both; it is built once at startup and shared read-only behind `Arc`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

pub mod github;

pub use github::{GithubParser, GithubValidator};

// ============================================================================
// SourceKind
// ============================================================================

/// Enumerated event source supported by the ingest pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Github,
}

impl SourceKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(Self::Github),
            _ => Err(SourceError::UnknownSource {
                source_name: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while validating or parsing an inbound delivery
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("unsupported source: {source_name}")]
    UnknownSource { source_name: String },

    #[error("missing signature header")]
    MissingSignature,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed payload: {message}")]
    MalformedPayload { message: String },

    #[error("missing event type header")]
    MissingType,

    #[error("payload carries no recognizable resource")]
    NoResource,
}

// ============================================================================
// Inbound Request
// ============================================================================

/// The parts of an inbound HTTP delivery the source layer needs.
///
/// Owns the raw body, so the body remains fully readable after validation
/// and parsing — validators and parsers borrow it without consuming.
/// Header names are normalized to lowercase at construction.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    headers: HashMap<String, String>,
    body: Bytes,
}

impl InboundRequest {
    /// Build a request from raw header pairs and the raw body.
    ///
    /// Header names are lowercased; duplicate names keep the last value.
    pub fn new<I, K, V>(headers: I, body: Bytes) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        Self { headers, body }
    }

    /// Look up a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The raw request body
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

// ============================================================================
// Capability Traits
// ============================================================================

/// Authenticates an inbound delivery against the webhook secret.
///
/// Implementations must not consume the request body — [`InboundRequest`]
/// guarantees it stays readable for the parser that runs afterwards.
pub trait Validator: Send + Sync {
    /// Accept the request or fail with [`SourceError::MissingSignature`] /
    /// [`SourceError::InvalidSignature`].
    fn validate(&self, request: &InboundRequest, secret: &str) -> Result<(), SourceError>;
}

/// Extracts structured data from a validated delivery
pub trait Parser: Send + Sync {
    /// Parse the payload into a generic JSON tree.
    ///
    /// # Errors
    ///
    /// [`SourceError::MalformedPayload`] when the body is not valid JSON.
    fn parse(&self, request: &InboundRequest) -> Result<serde_json::Value, SourceError>;

    /// The event-type discriminator (typically a source-specific header).
    ///
    /// # Errors
    ///
    /// [`SourceError::MissingType`] when the discriminator is absent.
    fn event_type(&self, request: &InboundRequest) -> Result<String, SourceError>;

    /// A canonical resource URL for human-readable alert bodies.
    ///
    /// # Errors
    ///
    /// [`SourceError::NoResource`] when the payload has no such resource.
    fn resource_url(&self, payload: &serde_json::Value) -> Result<Url, SourceError>;

    /// The provider-supplied delivery id, when the source has one.
    ///
    /// Used by ingest to build a stable deduplication hash; `None` disables
    /// dedup for the delivery.
    fn delivery_id(&self, request: &InboundRequest) -> Option<String>;
}

// ============================================================================
// SourceRegistry
// ============================================================================

/// Registry mapping each [`SourceKind`] to its validator and parser.
///
/// Built once at service startup and used read-only during request handling;
/// shared across tasks behind `Arc`.
pub struct SourceRegistry {
    validators: HashMap<SourceKind, Arc<dyn Validator>>,
    parsers: HashMap<SourceKind, Arc<dyn Parser>>,
}

impl SourceRegistry {
    /// Create a new, empty registry
    pub fn new() -> Self {
        Self {
            validators: HashMap::new(),
            parsers: HashMap::new(),
        }
    }

    /// Create a registry with all built-in sources registered
    pub fn with_builtin_sources() -> Self {
        let mut registry = Self::new();
        registry.register(
            SourceKind::Github,
            Arc::new(GithubValidator),
            Arc::new(GithubParser),
        );
        registry
    }

    /// Register a source with its validator and parser.
    ///
    /// Replaces any previous registration for the same source. Intended for
    /// startup-time registration only.
    pub fn register(
        &mut self,
        source: SourceKind,
        validator: Arc<dyn Validator>,
        parser: Arc<dyn Parser>,
    ) -> &mut Self {
        self.validators.insert(source, validator);
        self.parsers.insert(source, parser);
        self
    }

    /// Check whether a source is registered
    pub fn is_enabled(&self, source: SourceKind) -> bool {
        self.validators.contains_key(&source)
    }

    /// Look up the validator for a source
    pub fn validator(&self, source: SourceKind) -> Option<Arc<dyn Validator>> {
        self.validators.get(&source).cloned()
    }

    /// Look up the parser for a source
    pub fn parser(&self, source: SourceKind) -> Option<Arc<dyn Parser>> {
        self.parsers.get(&source).cloned()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
