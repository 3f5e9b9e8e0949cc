//! Risk statistics over a return series.
//!
//! Every function here is pure. Standard deviations are population standard
//! deviations and quantiles interpolate linearly between order statistics at
//! rank `q * (n - 1)`.

use chrono::{DateTime, Utc};
use sentinel_core::types::ReturnSeries;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum MetricsError {
    #[error("return series is empty")]
    InsufficientData,
    #[error("confidence must be strictly between 0 and 1, got {0}")]
    InvalidConfidence(f64),
}

/// Risk statistics for one subject at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetricsSnapshot {
    pub subject_id: String,
    pub var_95: f64,
    pub var_99: f64,
    pub expected_shortfall: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub computed_at: DateTime<Utc>,
}

impl RiskMetricsSnapshot {
    /// Compute VaR(95), VaR(99), ES(95), Sharpe, Sortino and max drawdown.
    pub fn compute(
        subject_id: impl Into<String>,
        returns: &ReturnSeries,
        risk_free_rate: f64,
    ) -> Result<Self, MetricsError> {
        let returns = returns.as_slice();
        if returns.is_empty() {
            return Err(MetricsError::InsufficientData);
        }

        Ok(Self {
            subject_id: subject_id.into(),
            var_95: value_at_risk(returns, 0.95)?,
            var_99: value_at_risk(returns, 0.99)?,
            expected_shortfall: expected_shortfall(returns, 0.95)?,
            sharpe_ratio: sharpe_ratio(returns, risk_free_rate),
            sortino_ratio: sortino_ratio(returns, risk_free_rate),
            max_drawdown: max_drawdown(returns),
            computed_at: Utc::now(),
        })
    }
}

fn check_confidence(confidence: f64) -> Result<(), MetricsError> {
    if confidence > 0.0 && confidence < 1.0 {
        Ok(())
    } else {
        Err(MetricsError::InvalidConfidence(confidence))
    }
}

/// Quantile `q` of an ascending slice with linear interpolation.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Historical value at risk: the `1 - confidence` quantile of the returns.
pub fn value_at_risk(returns: &[f64], confidence: f64) -> Result<f64, MetricsError> {
    check_confidence(confidence)?;
    if returns.is_empty() {
        return Err(MetricsError::InsufficientData);
    }

    let mut sorted = returns.to_vec();
    sorted.sort_by(f64::total_cmp);
    Ok(quantile_sorted(&sorted, 1.0 - confidence))
}

/// Mean of the returns at or below VaR. Falls back to VaR itself when no
/// return qualifies.
pub fn expected_shortfall(returns: &[f64], confidence: f64) -> Result<f64, MetricsError> {
    let var = value_at_risk(returns, confidence)?;
    let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= var).collect();

    if tail.is_empty() {
        Ok(var)
    } else {
        Ok(tail.mean())
    }
}

fn excess_returns(returns: &[f64], risk_free_rate: f64) -> Vec<f64> {
    returns.iter().map(|r| r - risk_free_rate).collect()
}

fn is_degenerate(std_dev: f64) -> bool {
    std_dev == 0.0 || !std_dev.is_finite()
}

/// Mean excess return over its population standard deviation; 0 when the
/// deviation is 0 or the series is empty.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }

    let excess = excess_returns(returns, risk_free_rate);
    let std_dev = excess.iter().population_std_dev();
    if is_degenerate(std_dev) {
        return 0.0;
    }

    excess.iter().mean() / std_dev
}

/// Mean excess return over the population standard deviation of the negative
/// excess returns only; 0 when there are none or their deviation is 0.
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    let excess = excess_returns(returns, risk_free_rate);
    let downside: Vec<f64> = excess.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.is_empty() {
        return 0.0;
    }

    let downside_std = downside.iter().population_std_dev();
    if is_degenerate(downside_std) {
        return 0.0;
    }

    excess.iter().mean() / downside_std
}

/// Worst peak-to-trough decline of the compounded series, as a non-positive
/// fraction. 0 for empty or monotone non-decreasing series.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut cumulative = 1.0;
    let mut peak = f64::NEG_INFINITY;
    let mut worst: f64 = 0.0;

    for r in returns {
        cumulative *= 1.0 + r;
        peak = peak.max(cumulative);
        let drawdown = if peak > 0.0 {
            (cumulative - peak) / peak
        } else {
            -1.0
        };
        worst = worst.min(drawdown);
    }

    worst
}
