//! # Notification Module
//!
//! Outbound alert delivery through pluggable notifiers.
//!
//! A [`Notifier`] knows how to render and transmit an alert [`Message`] to
//! one kind of channel (Slack being the built-in). The [`NotifierRegistry`]
//! maps a [`ChannelKind`] to its notifier; like the source registry it is
//! built once at startup and shared read-only behind `Arc`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

use crate::{AlertLevel, EvaluationType, Rule, RuleId};

pub mod slack;

pub use slack::SlackNotifier;

// ============================================================================
// ChannelKind
// ============================================================================

/// Enumerated notification channel type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Slack,
}

impl ChannelKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slack => "slack",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slack" => Ok(Self::Slack),
            _ => Err(NotifyError::UnknownChannelType {
                kind: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while resolving a notifier or delivering a message
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("unsupported notification channel type: {kind}")]
    UnknownChannelType { kind: String },

    #[error("channel config missing key '{key}'")]
    MissingConfig { key: String },

    #[error("channel config is not a string-keyed map: {message}")]
    InvalidConfig { message: String },

    #[error("delivery failed: {message}")]
    Delivery { message: String },

    #[error("notifier initialization failed: {message}")]
    Init { message: String },
}

// ============================================================================
// Message
// ============================================================================

/// Channel config: the channel's opaque JSON blob, interpreted as a
/// string-keyed map by the notifier that owns the schema.
pub type ChannelConfig = HashMap<String, String>;

/// Deserialize a channel's stored config blob into a [`ChannelConfig`].
///
/// # Errors
///
/// [`NotifyError::InvalidConfig`] when the blob is not an object of strings.
pub fn channel_config_from_json(config: &serde_json::Value) -> Result<ChannelConfig, NotifyError> {
    serde_json::from_value(config.clone()).map_err(|e| NotifyError::InvalidConfig {
        message: e.to_string(),
    })
}

/// Everything a notifier needs to render one alert.
///
/// Rendering is the notifier's responsibility; the message carries raw
/// facts, not markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub title: String,
    pub body: String,
    pub resource_link: Option<Url>,
    pub event_source: String,
    pub event_type: String,
    pub rule_id: RuleId,
    pub rule_name: String,
    pub rule_description: Option<String>,
    pub rule_evaluation_type: EvaluationType,
    pub rule_alert_level: AlertLevel,
    pub rule_sql: String,
}

impl Message {
    /// Build the message for an alert raised by `rule` on an event of
    /// `event_type`, optionally pointing at the event's resource.
    pub fn for_alert(rule: &Rule, event_type: &str, resource_link: Option<Url>) -> Self {
        let title = format!("[{}] {}", rule.alert_level, rule.name);
        let body = rule
            .description
            .clone()
            .unwrap_or_else(|| format!("Rule '{}' matched a {} event", rule.name, event_type));

        Self {
            title,
            body,
            resource_link,
            event_source: rule.source.to_string(),
            event_type: event_type.to_string(),
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            rule_description: rule.description.clone(),
            rule_evaluation_type: rule.evaluation_type,
            rule_alert_level: rule.alert_level,
            rule_sql: rule.sql.clone(),
        }
    }
}

// ============================================================================
// Notifier Trait
// ============================================================================

/// Interface for delivering alerts to one kind of channel
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a fixed test message to verify the channel configuration
    async fn test(&self, config: &ChannelConfig) -> Result<(), NotifyError>;

    /// Render and transmit a full alert message
    async fn send(&self, config: &ChannelConfig, message: &Message) -> Result<(), NotifyError>;
}

// ============================================================================
// NotifierRegistry
// ============================================================================

/// Registry mapping each [`ChannelKind`] to its notifier.
///
/// Built once at service startup and used read-only afterwards.
pub struct NotifierRegistry {
    notifiers: HashMap<ChannelKind, Arc<dyn Notifier>>,
}

impl NotifierRegistry {
    /// Create a new, empty registry
    pub fn new() -> Self {
        Self {
            notifiers: HashMap::new(),
        }
    }

    /// Create a registry with all built-in notifiers registered.
    ///
    /// # Errors
    ///
    /// [`NotifyError::Init`] when a notifier's transport cannot be built.
    pub fn with_builtin_channels() -> Result<Self, NotifyError> {
        let mut registry = Self::new();
        registry.register(ChannelKind::Slack, Arc::new(SlackNotifier::new()?));
        Ok(registry)
    }

    /// Register a notifier for a channel kind.
    ///
    /// Replaces any previous registration. Intended for startup-time
    /// registration only.
    pub fn register(&mut self, kind: ChannelKind, notifier: Arc<dyn Notifier>) -> &mut Self {
        self.notifiers.insert(kind, notifier);
        self
    }

    /// Check whether a channel kind has a notifier
    pub fn is_enabled(&self, kind: ChannelKind) -> bool {
        self.notifiers.contains_key(&kind)
    }

    /// Look up the notifier for a channel kind
    pub fn get(&self, kind: ChannelKind) -> Option<Arc<dyn Notifier>> {
        self.notifiers.get(&kind).cloned()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
