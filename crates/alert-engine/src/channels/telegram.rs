//! Telegram bot channel.

use super::{check_status, ChannelError, NotificationChannel};
use crate::templates::{render_chat, TemplateData, TemplateKey};
use async_trait::async_trait;
use sentinel_core::config::TelegramConfig;
use sentinel_core::types::ChannelKind;
use tracing::debug;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Sends alerts through the Telegram Bot API `sendMessage` method.
#[derive(Debug, Clone)]
pub struct TelegramChannel {
    http_client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramChannel {
    pub fn new(http_client: reqwest::Client, config: TelegramConfig) -> Self {
        Self {
            http_client,
            api_base: TELEGRAM_API.to_string(),
            bot_token: config.bot_token,
            chat_id: config.chat_id,
        }
    }

    /// Point the channel at a different API host.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    async fn send(&self, template: TemplateKey, data: &TemplateData) -> Result<(), ChannelError> {
        let rendered = render_chat(template, data);
        let text = format!(
            "<b>{}</b>\n{}",
            escape_html(&rendered.title),
            escape_html(&rendered.text.replace('*', ""))
        );
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);

        let response = self
            .http_client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": text,
                "parse_mode": "HTML"
            }))
            .send()
            .await?;
        check_status(&response)?;

        debug!(alert_id = %data.alert_id, "Sent Telegram alert");
        Ok(())
    }
}
