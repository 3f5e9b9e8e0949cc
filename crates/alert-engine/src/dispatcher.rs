//! Fan-out of approved alerts to notification channels.

use crate::channels::{ChannelError, NotificationChannel};
use crate::error::{AlertError, Result};
use crate::templates::{TemplateData, TemplateKey};
use futures_util::future::join_all;
use sentinel_core::types::{Alert, ChannelKind};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Result of one channel attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelOutcome {
    pub channel: ChannelKind,
    /// `None` on success, otherwise the failure description.
    pub error: Option<String>,
}

impl ChannelOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-channel outcomes of a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub alert_id: Uuid,
    pub outcomes: Vec<ChannelOutcome>,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }

    /// At least one delivery, or nothing was attempted.
    pub fn is_success(&self) -> bool {
        self.outcomes.is_empty() || self.delivered() > 0
    }
}

/// Delivers alerts to registered channels, each attempt under its own timeout.
pub struct NotificationDispatcher {
    channels: HashMap<ChannelKind, Arc<dyn NotificationChannel>>,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            channels: HashMap::new(),
            timeout,
        }
    }

    /// Register a channel, replacing any previous channel of the same kind.
    pub fn register(&mut self, channel: Arc<dyn NotificationChannel>) {
        self.channels.insert(channel.kind(), channel);
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.register(channel);
        self
    }

    pub fn registered(&self) -> BTreeSet<ChannelKind> {
        self.channels.keys().copied().collect()
    }

    async fn attempt(
        &self,
        kind: ChannelKind,
        template: TemplateKey,
        data: &TemplateData,
    ) -> std::result::Result<(), ChannelError> {
        let channel = self
            .channels
            .get(&kind)
            .ok_or(ChannelError::NotRegistered(kind))?;

        match tokio::time::timeout(self.timeout, channel.send(template, data)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout {
                channel: kind,
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }

    /// Send `alert` to every channel in `channels` concurrently.
    ///
    /// Succeeds when at least one channel delivers or the set is empty;
    /// fails with [`AlertError::AllChannelsFailed`] otherwise. Failures are
    /// logged and never retried.
    pub async fn dispatch(
        &self,
        alert: &Alert,
        channels: &BTreeSet<ChannelKind>,
        recipients: &[String],
    ) -> Result<DispatchReport> {
        let template = TemplateKey::for_alert_type(alert.alert_type);
        let data = TemplateData::from_alert(alert, recipients);

        let attempts = channels.iter().map(|kind| {
            let data = &data;
            async move {
                let result = self.attempt(*kind, template, data).await;
                if let Err(ref e) = result {
                    warn!(
                        alert_id = %alert.id,
                        channel = %kind,
                        error = %e,
                        "Notification channel failed"
                    );
                }
                ChannelOutcome {
                    channel: *kind,
                    error: result.err().map(|e| e.to_string()),
                }
            }
        });

        let report = DispatchReport {
            alert_id: alert.id,
            outcomes: join_all(attempts).await,
        };

        if report.is_success() {
            debug!(
                alert_id = %alert.id,
                delivered = report.delivered(),
                failed = report.failed(),
                "Alert dispatched"
            );
            Ok(report)
        } else {
            error!(
                alert_id = %alert.id,
                attempted = report.outcomes.len(),
                "All notification channels failed"
            );
            Err(AlertError::AllChannelsFailed {
                alert_id: alert.id,
                attempted: report.outcomes.len(),
            })
        }
    }
}
