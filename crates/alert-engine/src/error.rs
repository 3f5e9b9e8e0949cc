//! Error taxonomy for alert engine operations.

use crate::metrics::MetricsError;
use crate::provider::ProviderError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    #[error("All {attempted} notification channels failed for alert {alert_id}")]
    AllChannelsFailed { alert_id: Uuid, attempted: usize },

    #[error("Alert not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<MetricsError> for AlertError {
    fn from(err: MetricsError) -> Self {
        match err {
            MetricsError::InsufficientData => Self::InsufficientData(err.to_string()),
            MetricsError::InvalidConfidence(_) => Self::InvalidConfig(err.to_string()),
        }
    }
}

impl From<ProviderError> for AlertError {
    fn from(err: ProviderError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AlertError>;
