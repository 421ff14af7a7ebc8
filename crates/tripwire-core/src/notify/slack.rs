//! Slack notifier.
//!
//! Posts alert messages to a Slack incoming-webhook URL taken from the
//! channel config (`webhook_url` key). Messages are rendered as Slack
//! Markdown and sent as `{"text": ...}`; any 2xx response counts as
//! delivered. Requests carry a 5-second deadline so a slow Slack endpoint
//! cannot stall the notifier worker.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{ChannelConfig, Message, Notifier, NotifyError};

/// Config key holding the incoming-webhook URL
const WEBHOOK_URL_KEY: &str = "webhook_url";

/// Outbound request deadline
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Delivers alerts to Slack incoming webhooks
pub struct SlackNotifier {
    client: Client,
}

impl SlackNotifier {
    /// Build a notifier with its own timeout-bounded HTTP client.
    ///
    /// # Errors
    ///
    /// [`NotifyError::Init`] when the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Init {
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    fn webhook_url<'a>(config: &'a ChannelConfig) -> Result<&'a str, NotifyError> {
        config
            .get(WEBHOOK_URL_KEY)
            .map(String::as_str)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| NotifyError::MissingConfig {
                key: WEBHOOK_URL_KEY.to_string(),
            })
    }

    async fn post_text(&self, webhook_url: &str, text: String) -> Result<(), NotifyError> {
        let payload = serde_json::json!({ "text": text });

        let response = self
            .client
            .post(webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Delivery {
                message: format!("slack webhook returned status {status}"),
            });
        }
        Ok(())
    }
}

/// Render a message as Slack Markdown
fn render_markdown(message: &Message) -> String {
    let mut text = format!("*{}*\n{}", message.title, message.body);

    text.push_str(&format!(
        "\n\n> Source: `{}` / `{}`\n> Rule: {} ({}, {})",
        message.event_source,
        message.event_type,
        message.rule_name,
        message.rule_alert_level,
        message.rule_evaluation_type,
    ));

    if let Some(description) = &message.rule_description {
        text.push_str(&format!("\n> {description}"));
    }

    text.push_str(&format!("\n```{}```", message.rule_sql));

    if let Some(link) = &message.resource_link {
        text.push_str(&format!("\n<{link}>"));
    }

    text
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn test(&self, config: &ChannelConfig) -> Result<(), NotifyError> {
        let webhook_url = Self::webhook_url(config)?;
        self.post_text(
            webhook_url,
            "*Tripwire test notification*\nThis channel is wired up correctly.".to_string(),
        )
        .await
    }

    async fn send(&self, config: &ChannelConfig, message: &Message) -> Result<(), NotifyError> {
        let webhook_url = Self::webhook_url(config)?;
        self.post_text(webhook_url, render_markdown(message)).await
    }
}

#[cfg(test)]
#[path = "slack_tests.rs"]
mod tests;
