//! Alert taxonomy, per-type configuration, and alert records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Every condition the engine knows how to alert on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// Portfolio drawdown magnitude above the allowed fraction.
    Drawdown,
    /// Highest position leverage above the allowed multiple.
    Leverage,
    /// Total exposure above the allowed notional.
    PositionSize,
    /// 95% one-period loss above the allowed fraction.
    ValueAtRisk,
    /// Host CPU utilisation (percent).
    CpuUsage,
    /// Host memory utilisation (percent).
    MemoryUsage,
    /// Host disk utilisation (percent).
    DiskUsage,
    /// Inbound network traffic (bytes).
    NetworkIn,
    /// Outbound network traffic (bytes).
    NetworkOut,
    /// Service health check failed.
    ServiceDown,
}

/// Evaluation style of an alert type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Fires when a measured value is strictly greater than a threshold.
    Threshold,
    /// Fires when an observed health flag is false; thresholds are ignored.
    ServiceHealth,
}

/// Unit a threshold is expressed in, which also fixes its allowed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdUnit {
    /// 0 to 100.
    Percent,
    /// 0 to 1.
    Fraction,
    /// Non-negative multiple.
    Ratio,
    /// Non-negative notional amount.
    Amount,
    /// Non-negative byte count.
    Bytes,
}

impl ThresholdUnit {
    /// Inclusive upper bound, if the unit has one.
    pub fn max(&self) -> Option<f64> {
        match self {
            Self::Percent => Some(100.0),
            Self::Fraction => Some(1.0),
            Self::Ratio | Self::Amount | Self::Bytes => None,
        }
    }
}

impl AlertType {
    pub const ALL: [AlertType; 10] = [
        AlertType::Drawdown,
        AlertType::Leverage,
        AlertType::PositionSize,
        AlertType::ValueAtRisk,
        AlertType::CpuUsage,
        AlertType::MemoryUsage,
        AlertType::DiskUsage,
        AlertType::NetworkIn,
        AlertType::NetworkOut,
        AlertType::ServiceDown,
    ];

    pub fn kind(&self) -> AlertKind {
        match self {
            Self::ServiceDown => AlertKind::ServiceHealth,
            _ => AlertKind::Threshold,
        }
    }

    /// Threshold unit, or `None` for boolean alerts.
    pub fn unit(&self) -> Option<ThresholdUnit> {
        match self {
            Self::Drawdown | Self::ValueAtRisk => Some(ThresholdUnit::Fraction),
            Self::Leverage => Some(ThresholdUnit::Ratio),
            Self::PositionSize => Some(ThresholdUnit::Amount),
            Self::CpuUsage | Self::MemoryUsage | Self::DiskUsage => Some(ThresholdUnit::Percent),
            Self::NetworkIn | Self::NetworkOut => Some(ThresholdUnit::Bytes),
            Self::ServiceDown => None,
        }
    }

    /// Alert types computed from a portfolio's positions.
    pub fn is_risk(&self) -> bool {
        matches!(
            self,
            Self::Drawdown | Self::Leverage | Self::PositionSize | Self::ValueAtRisk
        )
    }

    /// Alert types computed from a host resource sample.
    pub fn is_resource(&self) -> bool {
        matches!(
            self,
            Self::CpuUsage | Self::MemoryUsage | Self::DiskUsage | Self::NetworkIn | Self::NetworkOut
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drawdown => "drawdown",
            Self::Leverage => "leverage",
            Self::PositionSize => "position_size",
            Self::ValueAtRisk => "value_at_risk",
            Self::CpuUsage => "cpu_usage",
            Self::MemoryUsage => "memory_usage",
            Self::DiskUsage => "disk_usage",
            Self::NetworkIn => "network_in",
            Self::NetworkOut => "network_out",
            Self::ServiceDown => "service_down",
        }
    }

    /// Parse the storage representation produced by [`AlertType::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification channel identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Slack,
    Discord,
    Telegram,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Slack => "slack",
            Self::Discord => "discord",
            Self::Telegram => "telegram",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "slack" => Some(Self::Slack),
            "discord" => Some(Self::Discord),
            "telegram" => Some(Self::Telegram),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_enabled() -> bool {
    true
}

fn default_severity() -> Severity {
    Severity::Warning
}

fn default_cooldown() -> u64 {
    300
}

/// Configuration for a single alert type. One active config per type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    pub alert_type: AlertType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    /// Breach threshold. Ignored for service-health alerts; for risk alerts
    /// an unset threshold falls back to the subject's risk profile.
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Minimum seconds between two admitted alerts for the same subject.
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,
    #[serde(default)]
    pub channels: BTreeSet<ChannelKind>,
    /// Email recipients; empty means the channel's configured default.
    #[serde(default)]
    pub recipients: Vec<String>,
}

impl AlertConfig {
    /// Create an enabled config with default severity and cooldown.
    pub fn new(alert_type: AlertType) -> Self {
        Self {
            alert_type,
            enabled: default_enabled(),
            severity: default_severity(),
            threshold: None,
            cooldown_seconds: default_cooldown(),
            channels: BTreeSet::new(),
            recipients: Vec::new(),
        }
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn cooldown_seconds(mut self, seconds: u64) -> Self {
        self.cooldown_seconds = seconds;
        self
    }

    pub fn channel(mut self, channel: ChannelKind) -> Self {
        self.channels.insert(channel);
        self
    }

    pub fn recipient(mut self, address: impl Into<String>) -> Self {
        self.recipients.push(address.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A persisted alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub alert_type: AlertType,
    /// User, host, or service the alert concerns.
    pub subject_id: String,
    pub severity: Severity,
    /// Measured value (absent for service-health alerts).
    pub value: Option<f64>,
    /// Threshold that was breached (absent for service-health alerts).
    pub threshold: Option<f64>,
    pub message: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        subject_id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_type,
            subject_id: subject_id.into(),
            severity,
            value: None,
            threshold: None,
            message: message.into(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        }
    }

    pub fn with_measurement(mut self, value: f64, threshold: f64) -> Self {
        self.value = Some(value);
        self.threshold = Some(threshold);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    /// Mark the alert resolved. Returns `false` (and changes nothing) if it
    /// was already resolved.
    pub fn resolve(&mut self, resolved_by: impl Into<String>, at: DateTime<Utc>) -> bool {
        if self.is_resolved() {
            return false;
        }
        self.resolved_at = Some(at);
        self.resolved_by = Some(resolved_by.into());
        true
    }
}

/// Filter for querying alert history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertFilter {
    pub alert_type: Option<AlertType>,
    pub subject_id: Option<String>,
    pub severity: Option<Severity>,
    pub resolved: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl AlertFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alert_type(mut self, alert_type: AlertType) -> Self {
        self.alert_type = Some(alert_type);
        self
    }

    pub fn subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn resolved(mut self, resolved: bool) -> Self {
        self.resolved = Some(resolved);
        self
    }

    pub fn time_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check a single alert against every set criterion (limit excluded).
    pub fn matches(&self, alert: &Alert) -> bool {
        if let Some(alert_type) = self.alert_type {
            if alert.alert_type != alert_type {
                return false;
            }
        }
        if let Some(ref subject) = self.subject_id {
            if &alert.subject_id != subject {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if alert.severity != severity {
                return false;
            }
        }
        if let Some(resolved) = self.resolved {
            if alert.is_resolved() != resolved {
                return false;
            }
        }
        if let Some(from) = self.from {
            if alert.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if alert.created_at > to {
                return false;
            }
        }
        true
    }
}
