//! Slack and Discord incoming-webhook channel.

use super::{check_status, ChannelError, NotificationChannel};
use crate::templates::{render_chat, TemplateData, TemplateKey};
use async_trait::async_trait;
use sentinel_core::types::ChannelKind;
use serde_json::json;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
enum Flavor {
    Slack { channel: Option<String> },
    Discord,
}

/// Posts alerts to a chat webhook.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    http_client: reqwest::Client,
    webhook_url: Url,
    flavor: Flavor,
}

impl WebhookChannel {
    /// Slack webhook; posts a single coloured attachment.
    pub fn slack(http_client: reqwest::Client, webhook_url: Url, channel: Option<String>) -> Self {
        Self {
            http_client,
            webhook_url,
            flavor: Flavor::Slack { channel },
        }
    }

    /// Discord webhook; posts the rendered text as message content.
    pub fn discord(http_client: reqwest::Client, webhook_url: Url) -> Self {
        Self {
            http_client,
            webhook_url,
            flavor: Flavor::Discord,
        }
    }

    fn payload(&self, template: TemplateKey, data: &TemplateData) -> serde_json::Value {
        let rendered = render_chat(template, data);
        match &self.flavor {
            Flavor::Slack { channel } => {
                let mut payload = json!({
                    "attachments": [{
                        "color": rendered.color,
                        "title": rendered.title,
                        "text": rendered.text,
                        "footer": "Trade Sentinel",
                        "ts": data.timestamp.timestamp(),
                    }]
                });
                if let Some(channel) = channel {
                    payload["channel"] = json!(channel);
                }
                payload
            }
            Flavor::Discord => json!({
                "content": format!("**{}**\n{}", rendered.title, rendered.text),
            }),
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        match self.flavor {
            Flavor::Slack { .. } => ChannelKind::Slack,
            Flavor::Discord => ChannelKind::Discord,
        }
    }

    async fn send(&self, template: TemplateKey, data: &TemplateData) -> Result<(), ChannelError> {
        let response = self
            .http_client
            .post(self.webhook_url.clone())
            .json(&self.payload(template, data))
            .send()
            .await?;
        check_status(&response)?;

        debug!(
            channel = %self.kind(),
            alert_id = %data.alert_id,
            "Sent webhook alert"
        );
        Ok(())
    }
}
