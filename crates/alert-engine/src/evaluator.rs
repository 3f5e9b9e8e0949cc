//! Threshold evaluation and alert-config validation.

use crate::cooldown::MAX_COOLDOWN_SECS;
use crate::error::{AlertError, Result};
use crate::metrics::RiskMetricsSnapshot;
use crate::templates::alert_message;
use chrono::{DateTime, Utc};
use sentinel_core::types::{
    Alert, AlertConfig, AlertKind, AlertType, PortfolioExposure, ResourceSample, RiskProfile,
};
use serde_json::json;

/// What was observed about a subject during a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Portfolio {
        snapshot: RiskMetricsSnapshot,
        exposure: PortfolioExposure,
    },
    Resource(ResourceSample),
    ServiceHealth {
        healthy: bool,
    },
}

impl Observation {
    /// Whether this observation carries data for `alert_type`.
    fn covers(&self, alert_type: AlertType) -> bool {
        match self {
            Self::Portfolio { .. } => alert_type.is_risk(),
            Self::Resource(_) => alert_type.is_resource(),
            Self::ServiceHealth { .. } => alert_type == AlertType::ServiceDown,
        }
    }

    /// Measured value compared against the threshold. Drawdown and VaR are
    /// reported as positive loss magnitudes.
    fn measured(&self, alert_type: AlertType) -> Option<f64> {
        match self {
            Self::Portfolio { snapshot, exposure } => match alert_type {
                AlertType::Drawdown => Some(-snapshot.max_drawdown),
                AlertType::ValueAtRisk => Some(-snapshot.var_95),
                AlertType::Leverage => Some(exposure.max_leverage),
                AlertType::PositionSize => Some(exposure.total_exposure),
                _ => None,
            },
            Self::Resource(sample) => sample.value_for(alert_type),
            Self::ServiceHealth { .. } => None,
        }
    }

    fn metadata(&self) -> serde_json::Value {
        match self {
            Self::Portfolio { snapshot, exposure } => json!({
                "var_95": snapshot.var_95,
                "var_99": snapshot.var_99,
                "expected_shortfall": snapshot.expected_shortfall,
                "sharpe_ratio": snapshot.sharpe_ratio,
                "sortino_ratio": snapshot.sortino_ratio,
                "max_drawdown": snapshot.max_drawdown,
                "total_exposure": exposure.total_exposure,
                "max_leverage": exposure.max_leverage,
                "position_count": exposure.position_count,
            }),
            Self::Resource(sample) => json!({
                "sampled_at": sample.sampled_at,
            }),
            Self::ServiceHealth { healthy } => json!({
                "healthy": healthy,
            }),
        }
    }
}

/// Threshold that applies to `config`: its own, else the profile's limit for
/// the risk types that have one.
pub fn effective_threshold(config: &AlertConfig, profile: &RiskProfile) -> Option<f64> {
    config.threshold.or(match config.alert_type {
        AlertType::Drawdown => Some(profile.max_drawdown),
        AlertType::Leverage => Some(profile.max_leverage),
        AlertType::PositionSize => Some(profile.max_position_size),
        _ => None,
    })
}

/// Compares observations against alert configs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdEvaluator;

impl ThresholdEvaluator {
    /// One candidate per enabled config whose value strictly exceeds its
    /// threshold, or per unhealthy service.
    pub fn evaluate(
        &self,
        subject_id: &str,
        observation: &Observation,
        profile: &RiskProfile,
        configs: &[AlertConfig],
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        configs
            .iter()
            .filter(|config| config.enabled && observation.covers(config.alert_type))
            .filter_map(|config| self.evaluate_one(subject_id, observation, profile, config, now))
            .collect()
    }

    fn evaluate_one(
        &self,
        subject_id: &str,
        observation: &Observation,
        profile: &RiskProfile,
        config: &AlertConfig,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        let alert_type = config.alert_type;

        let alert = match alert_type.kind() {
            AlertKind::ServiceHealth => match observation {
                Observation::ServiceHealth { healthy: false } => Alert::new(
                    alert_type,
                    subject_id,
                    config.severity,
                    alert_message(alert_type, subject_id, None, None),
                ),
                _ => return None,
            },
            AlertKind::Threshold => {
                let threshold = effective_threshold(config, profile)?;
                let value = observation.measured(alert_type)?;
                if value.is_nan() || value <= threshold {
                    return None;
                }
                Alert::new(
                    alert_type,
                    subject_id,
                    config.severity,
                    alert_message(alert_type, subject_id, Some(value), Some(threshold)),
                )
                .with_measurement(value, threshold)
            }
        };

        Some(alert.with_metadata(observation.metadata()).created_at(now))
    }
}

/// Reject configs the evaluator cannot apply meaningfully.
pub fn validate_alert_config(config: &AlertConfig) -> Result<()> {
    let alert_type = config.alert_type;

    if let Some(threshold) = config.threshold {
        if !threshold.is_finite() {
            return Err(AlertError::InvalidConfig(format!(
                "{alert_type}: threshold must be finite"
            )));
        }
        if threshold < 0.0 {
            return Err(AlertError::InvalidConfig(format!(
                "{alert_type}: threshold must be non-negative, got {threshold}"
            )));
        }
        if let Some(max) = alert_type.unit().and_then(|unit| unit.max()) {
            if threshold > max {
                return Err(AlertError::InvalidConfig(format!(
                    "{alert_type}: threshold must be at most {max}, got {threshold}"
                )));
            }
        }
    } else if alert_type.is_resource() {
        return Err(AlertError::InvalidConfig(format!(
            "{alert_type}: a threshold is required"
        )));
    }

    if config.cooldown_seconds > MAX_COOLDOWN_SECS {
        return Err(AlertError::InvalidConfig(format!(
            "{alert_type}: cooldown_seconds must be at most {MAX_COOLDOWN_SECS}, got {}",
            config.cooldown_seconds
        )));
    }

    if config.recipients.iter().any(|r| r.trim().is_empty()) {
        return Err(AlertError::InvalidConfig(format!(
            "{alert_type}: recipients must not be blank"
        )));
    }

    Ok(())
}
