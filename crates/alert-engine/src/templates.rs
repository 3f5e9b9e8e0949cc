//! Notification templates.

use chrono::{DateTime, Utc};
use sentinel_core::types::{Alert, AlertType, Severity};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Template families shared by every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKey {
    ServiceDown,
    HighResource,
    RiskLimit,
}

impl TemplateKey {
    pub fn for_alert_type(alert_type: AlertType) -> Self {
        if alert_type == AlertType::ServiceDown {
            Self::ServiceDown
        } else if alert_type.is_resource() {
            Self::HighResource
        } else {
            Self::RiskLimit
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceDown => "service_down",
            Self::HighResource => "high_resource",
            Self::RiskLimit => "risk_limit",
        }
    }
}

/// Values substituted into a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateData {
    pub alert_id: Uuid,
    pub alert_type: AlertType,
    pub subject_id: String,
    pub severity: Severity,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Email recipients; channels without addressing ignore this.
    pub recipients: Vec<String>,
}

impl TemplateData {
    pub fn from_alert(alert: &Alert, recipients: &[String]) -> Self {
        Self {
            alert_id: alert.id,
            alert_type: alert.alert_type,
            subject_id: alert.subject_id.clone(),
            severity: alert.severity,
            value: alert.value,
            threshold: alert.threshold,
            message: alert.message.clone(),
            timestamp: alert.created_at,
            recipients: recipients.to_vec(),
        }
    }

    fn formatted_time(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedChat {
    pub title: String,
    /// Hex colour such as `#FF0000`.
    pub color: &'static str,
    pub text: String,
}

impl RenderedChat {
    /// Colour as an integer, the form Discord embeds expect.
    pub fn color_value(&self) -> u32 {
        u32::from_str_radix(self.color.trim_start_matches('#'), 16).unwrap_or(0)
    }
}

/// Human-readable measurement with the unit of the alert type.
pub fn format_measurement(alert_type: AlertType, value: f64) -> String {
    match alert_type {
        AlertType::CpuUsage | AlertType::MemoryUsage | AlertType::DiskUsage => {
            format!("{:.2}%", value)
        }
        AlertType::Drawdown | AlertType::ValueAtRisk => format!("{:.2}%", value * 100.0),
        AlertType::Leverage => format!("{:.2}x", value),
        AlertType::PositionSize => format!("{:.2}", value),
        AlertType::NetworkIn | AlertType::NetworkOut => format!("{:.0} bytes", value),
        AlertType::ServiceDown => String::new(),
    }
}

fn label(alert_type: AlertType) -> &'static str {
    match alert_type {
        AlertType::Drawdown => "Drawdown",
        AlertType::Leverage => "Leverage",
        AlertType::PositionSize => "Position size",
        AlertType::ValueAtRisk => "Value at risk (95%)",
        AlertType::CpuUsage => "CPU usage",
        AlertType::MemoryUsage => "Memory usage",
        AlertType::DiskUsage => "Disk usage",
        AlertType::NetworkIn => "Network in",
        AlertType::NetworkOut => "Network out",
        AlertType::ServiceDown => "Service",
    }
}

/// One-line alert message stored on the alert record.
pub fn alert_message(
    alert_type: AlertType,
    subject_id: &str,
    value: Option<f64>,
    threshold: Option<f64>,
) -> String {
    match (alert_type, value, threshold) {
        (AlertType::ServiceDown, _, _) => format!("Service {} is down", subject_id),
        (_, Some(value), Some(threshold)) => format!(
            "{} {} exceeds threshold {} for {}",
            label(alert_type),
            format_measurement(alert_type, value),
            format_measurement(alert_type, threshold),
            subject_id
        ),
        _ => format!("{} alert for {}", label(alert_type), subject_id),
    }
}

fn measurement_lines(data: &TemplateData) -> String {
    let value = data
        .value
        .map(|v| format_measurement(data.alert_type, v))
        .unwrap_or_else(|| "n/a".to_string());
    let threshold = data
        .threshold
        .map(|t| format_measurement(data.alert_type, t))
        .unwrap_or_else(|| "n/a".to_string());
    format!("Value: {}\nThreshold: {}", value, threshold)
}

pub fn render_email(key: TemplateKey, data: &TemplateData) -> RenderedEmail {
    let severity = data.severity.as_str().to_uppercase();
    match key {
        TemplateKey::ServiceDown => RenderedEmail {
            subject: format!("[{}] Service down: {}", severity, data.subject_id),
            body: format!(
                "Service status alert\n\nService: {}\nStatus: down\nTime: {}\nDetails: {}\n",
                data.subject_id,
                data.formatted_time(),
                data.message
            ),
        },
        TemplateKey::HighResource => RenderedEmail {
            subject: format!(
                "[{}] Resource usage exceeded: {} on {}",
                severity,
                label(data.alert_type),
                data.subject_id
            ),
            body: format!(
                "Resource usage alert\n\nHost: {}\nResource: {}\n{}\nTime: {}\n",
                data.subject_id,
                label(data.alert_type),
                measurement_lines(data),
                data.formatted_time()
            ),
        },
        TemplateKey::RiskLimit => RenderedEmail {
            subject: format!(
                "[{}] Risk limit breached: {} for {}",
                severity,
                label(data.alert_type),
                data.subject_id
            ),
            body: format!(
                "Risk limit alert\n\nPortfolio: {}\nMetric: {}\n{}\nTime: {}\nDetails: {}\n",
                data.subject_id,
                label(data.alert_type),
                measurement_lines(data),
                data.formatted_time(),
                data.message
            ),
        },
    }
}

pub fn render_chat(key: TemplateKey, data: &TemplateData) -> RenderedChat {
    match key {
        TemplateKey::ServiceDown => RenderedChat {
            title: "Service down".to_string(),
            color: "#FF0000",
            text: format!(
                "*Service*: {}\n*Status*: down\n*Time*: {}\n*Details*: {}",
                data.subject_id,
                data.formatted_time(),
                data.message
            ),
        },
        TemplateKey::HighResource => RenderedChat {
            title: "Resource usage alert".to_string(),
            color: "#FFA500",
            text: format!(
                "*Host*: {}\n*Resource*: {}\n*{}*\n*Time*: {}",
                data.subject_id,
                label(data.alert_type),
                measurement_lines(data).replace('\n', "*\n*"),
                data.formatted_time()
            ),
        },
        TemplateKey::RiskLimit => RenderedChat {
            title: "Risk limit breached".to_string(),
            color: "#8B0000",
            text: format!(
                "*Portfolio*: {}\n*Metric*: {}\n*{}*\n*Time*: {}",
                data.subject_id,
                label(data.alert_type),
                measurement_lines(data).replace('\n', "*\n*"),
                data.formatted_time()
            ),
        },
    }
}
