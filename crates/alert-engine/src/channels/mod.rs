//! Notification channels.

pub mod email;
pub mod telegram;
pub mod webhook;

pub use email::EmailChannel;
pub use telegram::TelegramChannel;
pub use webhook::WebhookChannel;

use crate::templates::{TemplateData, TemplateKey};
use async_trait::async_trait;
use sentinel_core::types::ChannelKind;
use thiserror::Error;

/// Notification channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel {0} is not registered")]
    NotRegistered(ChannelKind),
    #[error("Channel {channel} timed out after {timeout_secs}s")]
    Timeout {
        channel: ChannelKind,
        timeout_secs: u64,
    },
    #[error("Failed to build notification: {0}")]
    Build(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Endpoint rejected notification with status {0}")]
    Rejected(u16),
    #[error("No recipients configured")]
    NoRecipients,
}

impl From<reqwest::Error> for ChannelError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// A destination alerts can be delivered to.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Render `template` with `data` and deliver it.
    async fn send(&self, template: TemplateKey, data: &TemplateData) -> Result<(), ChannelError>;
}

/// Map a non-success HTTP status to a rejection.
pub(crate) fn check_status(response: &reqwest::Response) -> Result<(), ChannelError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ChannelError::Rejected(status.as_u16()))
    }
}
