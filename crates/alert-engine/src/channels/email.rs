//! SMTP email channel.

use super::{ChannelError, NotificationChannel};
use crate::templates::{render_email, TemplateData, TemplateKey};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use sentinel_core::config::SmtpConfig;
use sentinel_core::types::ChannelKind;
use std::sync::Arc;
use tracing::debug;

/// Sends alerts as plain-text email over SMTP.
#[derive(Clone)]
pub struct EmailChannel {
    mailer: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from_mailbox: Mailbox,
    default_recipients: Vec<String>,
}

impl EmailChannel {
    pub fn new(config: SmtpConfig) -> Result<Self, ChannelError> {
        let creds = Credentials::new(config.username, config.password);

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| ChannelError::Transport(e.to_string()))?
            .port(config.port)
            .credentials(creds)
            .timeout(Some(std::time::Duration::from_secs(10)))
            .build();

        let from_mailbox = parse_mailbox(&config.from_address)?;

        Ok(Self {
            mailer: Arc::new(mailer),
            from_mailbox,
            default_recipients: config.default_recipients,
        })
    }

    /// Recipients for a notification: the alert's own list, else the defaults.
    fn recipients<'a>(&'a self, data: &'a TemplateData) -> &'a [String] {
        if data.recipients.is_empty() {
            &self.default_recipients
        } else {
            &data.recipients
        }
    }

    fn build_message(&self, template: TemplateKey, data: &TemplateData) -> Result<Message, ChannelError> {
        let recipients = self.recipients(data);
        if recipients.is_empty() {
            return Err(ChannelError::NoRecipients);
        }

        let rendered = render_email(template, data);
        let mut builder = Message::builder()
            .from(self.from_mailbox.clone())
            .subject(rendered.subject)
            .header(ContentType::TEXT_PLAIN);
        for address in recipients {
            builder = builder.to(parse_mailbox(address)?);
        }

        builder
            .body(rendered.body)
            .map_err(|e| ChannelError::Build(e.to_string()))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, ChannelError> {
    address
        .parse()
        .map_err(|e: lettre::address::AddressError| ChannelError::Build(e.to_string()))
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, template: TemplateKey, data: &TemplateData) -> Result<(), ChannelError> {
        let email = self.build_message(template, data)?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        debug!(alert_id = %data.alert_id, template = template.as_str(), "Sent email alert");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::types::{Alert, AlertType, Severity};

    fn channel(default_recipients: Vec<String>) -> EmailChannel {
        EmailChannel::new(SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "user".to_string(),
            password: "secret".to_string(),
            from_address: "Sentinel <alerts@example.com>".to_string(),
            default_recipients,
        })
        .unwrap()
    }

    fn data(recipients: &[String]) -> TemplateData {
        let alert = Alert::new(AlertType::ServiceDown, "trading", Severity::Critical, "down");
        TemplateData::from_alert(&alert, recipients)
    }

    #[tokio::test]
    async fn test_missing_recipients_is_an_error() {
        let channel = channel(vec![]);
        let result = channel.build_message(TemplateKey::ServiceDown, &data(&[]));
        assert!(matches!(result, Err(ChannelError::NoRecipients)));
    }

    #[tokio::test]
    async fn test_falls_back_to_default_recipients() {
        let channel = channel(vec!["ops@example.com".to_string()]);
        let message = channel
            .build_message(TemplateKey::ServiceDown, &data(&[]))
            .unwrap();
        let to: Vec<String> = message
            .envelope()
            .to()
            .iter()
            .map(|a| a.to_string())
            .collect();
        assert_eq!(to, vec!["ops@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_rejected() {
        let channel = channel(vec![]);
        let result =
            channel.build_message(TemplateKey::ServiceDown, &data(&["not an address".to_string()]));
        assert!(matches!(result, Err(ChannelError::Build(_))));
    }
}
