//! Observation sources for monitored subjects.

use async_trait::async_trait;
use sentinel_core::config::ProviderConfig;
use sentinel_core::types::{PositionSnapshot, ResourceSample};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{source_name} unavailable for {subject}: {reason}")]
    Unavailable {
        source_name: &'static str,
        subject: String,
        reason: String,
    },
}

impl ProviderError {
    pub fn unavailable(
        source_name: &'static str,
        subject: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::Unavailable {
            source_name,
            subject: subject.into(),
            reason: reason.to_string(),
        }
    }
}

/// Supplies the data the engine evaluates each cycle.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Open positions of a portfolio subject.
    async fn positions(&self, subject_id: &str) -> Result<Vec<PositionSnapshot>, ProviderError>;

    /// Latest resource reading of a host subject.
    async fn resource_sample(&self, subject_id: &str) -> Result<ResourceSample, ProviderError>;

    /// Whether a service subject currently reports healthy.
    async fn service_health(&self, subject_id: &str) -> Result<bool, ProviderError>;
}

/// Pulls observations from the position service, the host metrics agent and
/// each service's health endpoint.
pub struct HttpMetricsProvider {
    client: reqwest::Client,
    position_url: Url,
    agent_url: Url,
    service_base_url: Url,
}

impl HttpMetricsProvider {
    pub fn new(config: &ProviderConfig) -> sentinel_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            position_url: config.position_service_url.clone(),
            agent_url: config.metrics_agent_url.clone(),
            service_base_url: config.service_health_base_url.clone(),
        })
    }

    /// Append path segments to `base`, percent-encoding each one.
    fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, String> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| format!("{} cannot be a base URL", base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl MetricsProvider for HttpMetricsProvider {
    async fn positions(&self, subject_id: &str) -> Result<Vec<PositionSnapshot>, ProviderError> {
        let unavailable = |e: String| ProviderError::unavailable("position service", subject_id, e);

        let url = Self::endpoint(&self.position_url, &["positions", subject_id]).map_err(unavailable)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unavailable(e.to_string()))?;

        let positions: Vec<PositionSnapshot> =
            response.json().await.map_err(|e| unavailable(e.to_string()))?;
        debug!(subject = subject_id, count = positions.len(), "Fetched positions");
        Ok(positions)
    }

    async fn resource_sample(&self, subject_id: &str) -> Result<ResourceSample, ProviderError> {
        let unavailable = |e: String| ProviderError::unavailable("metrics agent", subject_id, e);

        let mut url = Self::endpoint(&self.agent_url, &["metrics", "system"]).map_err(unavailable)?;
        url.query_pairs_mut().append_pair("host", subject_id);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unavailable(e.to_string()))?;

        response.json().await.map_err(|e| unavailable(e.to_string()))
    }

    /// HTTP 200 is healthy. Any other status, or no response at all, is
    /// unhealthy rather than an error.
    async fn service_health(&self, subject_id: &str) -> Result<bool, ProviderError> {
        let url = Self::endpoint(&self.service_base_url, &[subject_id, "health"])
            .map_err(|e| ProviderError::unavailable("service health", subject_id, e))?;

        match self.client.get(url).send().await {
            Ok(response) => Ok(response.status() == reqwest::StatusCode::OK),
            Err(e) => {
                debug!(subject = subject_id, error = %e, "Health check request failed");
                Ok(false)
            }
        }
    }
}
