//! Alert event publishing for downstream consumers.

use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;
use sentinel_core::types::Alert;
use serde::Serialize;
use tracing::debug;

/// Redis pub/sub channels.
pub mod channels {
    pub const ALERT_EVENTS: &str = "alerts:events";
}

/// Wire form of an admitted alert.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent<'a> {
    pub alert_id: String,
    pub subject_id: &'a str,
    pub alert_type: &'static str,
    pub severity: &'static str,
    pub message: &'a str,
    pub metadata: &'a serde_json::Value,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
    pub timestamp: String,
}

impl<'a> From<&'a Alert> for AlertEvent<'a> {
    fn from(alert: &'a Alert) -> Self {
        Self {
            alert_id: alert.id.to_string(),
            subject_id: &alert.subject_id,
            alert_type: alert.alert_type.as_str(),
            severity: alert.severity.as_str(),
            message: &alert.message,
            metadata: &alert.metadata,
            value: alert.value,
            threshold: alert.threshold,
            timestamp: alert.created_at.to_rfc3339(),
        }
    }
}

/// Best-effort broadcast of admitted alerts.
#[async_trait]
pub trait AlertPublisher: Send + Sync {
    async fn publish(&self, alert: &Alert) -> Result<()>;
}

/// Publishes alert events on a Redis channel.
pub struct RedisAlertPublisher {
    redis: redis::aio::ConnectionManager,
}

impl RedisAlertPublisher {
    pub async fn new(redis_client: redis::Client) -> sentinel_core::Result<Self> {
        let redis = redis::aio::ConnectionManager::new(redis_client).await?;
        Ok(Self { redis })
    }

    pub async fn publish_event(&self, alert: &Alert) -> sentinel_core::Result<()> {
        let payload = encode_event(alert)?;

        let mut conn = self.redis.clone();
        let _: () = conn.publish(channels::ALERT_EVENTS, payload).await?;
        debug!(alert_id = %alert.id, "Published alert event to Redis");

        Ok(())
    }
}

/// JSON payload published for `alert`.
pub fn encode_event(alert: &Alert) -> sentinel_core::Result<String> {
    Ok(serde_json::to_string(&AlertEvent::from(alert))?)
}

#[async_trait]
impl AlertPublisher for RedisAlertPublisher {
    async fn publish(&self, alert: &Alert) -> Result<()> {
        Ok(self.publish_event(alert).await?)
    }
}
