//! Risk limits, position snapshots, and return series.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered per-period simple returns, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReturnSeries(Vec<f64>);

impl ReturnSeries {
    pub fn new(returns: Vec<f64>) -> Self {
        Self(returns)
    }

    /// Per-position returns in the order the positions were reported.
    pub fn from_positions(positions: &[PositionSnapshot]) -> Self {
        Self(positions.iter().map(PositionSnapshot::simple_return).collect())
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f64>> for ReturnSeries {
    fn from(returns: Vec<f64>) -> Self {
        Self(returns)
    }
}

/// Per-subject risk limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub subject_id: String,
    /// Largest tolerated drawdown as a positive fraction (0.20 = 20%).
    pub max_drawdown: f64,
    /// Largest tolerated total exposure in quote currency.
    pub max_position_size: f64,
    pub max_leverage: f64,
    /// Fraction of capital risked per trade.
    pub risk_per_trade: f64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl RiskProfile {
    /// Profile with system defaults for a subject seen for the first time.
    pub fn with_defaults(subject_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            subject_id: subject_id.into(),
            max_drawdown: 0.20,
            max_position_size: 100_000.0,
            max_leverage: 3.0,
            risk_per_trade: 0.02,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check every limit is finite and non-negative, and that the fractional
    /// limits do not exceed 1. Returns a description of the first violation.
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("max_drawdown", self.max_drawdown, Some(1.0)),
            ("max_position_size", self.max_position_size, None),
            ("max_leverage", self.max_leverage, None),
            ("risk_per_trade", self.risk_per_trade, Some(1.0)),
        ];

        for (name, value, max) in fields {
            if !value.is_finite() {
                return Err(format!("{name} must be finite"));
            }
            if value < 0.0 {
                return Err(format!("{name} must be non-negative, got {value}"));
            }
            if let Some(max) = max {
                if value > max {
                    return Err(format!("{name} must be at most {max}, got {value}"));
                }
            }
        }

        if self.subject_id.trim().is_empty() {
            return Err("subject_id must not be empty".to_string());
        }

        Ok(())
    }
}

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

/// Point-in-time view of an open position as reported by the position service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    #[serde(default)]
    pub symbol: Option<String>,
    pub side: PositionSide,
    pub entry_price: f64,
    pub current_price: f64,
    pub quantity: f64,
    #[serde(default)]
    pub margin: f64,
}

impl PositionSnapshot {
    /// Simple return since entry, signed by side. Zero when the entry price
    /// is not positive.
    pub fn simple_return(&self) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        match self.side {
            PositionSide::Long => (self.current_price - self.entry_price) / self.entry_price,
            PositionSide::Short => (self.entry_price - self.current_price) / self.entry_price,
        }
    }

    pub fn exposure(&self) -> f64 {
        self.quantity.abs() * self.current_price
    }

    /// Exposure over margin; `None` when margin is not positive.
    pub fn leverage(&self) -> Option<f64> {
        if self.margin > 0.0 {
            Some(self.exposure() / self.margin)
        } else {
            None
        }
    }
}

/// Aggregates over a portfolio's positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioExposure {
    pub total_exposure: f64,
    pub max_leverage: f64,
    pub position_count: usize,
}

impl PortfolioExposure {
    pub fn from_positions(positions: &[PositionSnapshot]) -> Self {
        let total_exposure = positions.iter().map(PositionSnapshot::exposure).sum();
        let max_leverage = positions
            .iter()
            .filter_map(PositionSnapshot::leverage)
            .fold(0.0_f64, f64::max);

        Self {
            total_exposure,
            max_leverage,
            position_count: positions.len(),
        }
    }
}
