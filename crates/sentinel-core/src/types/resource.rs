//! Host resource samples.

use super::AlertType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One reading of a host's resource utilisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    /// Bytes received since the agent started.
    pub network_in: f64,
    /// Bytes sent since the agent started.
    pub network_out: f64,
    #[serde(default = "Utc::now")]
    pub sampled_at: DateTime<Utc>,
}

impl ResourceSample {
    /// The reading that a resource alert type compares against.
    pub fn value_for(&self, alert_type: AlertType) -> Option<f64> {
        match alert_type {
            AlertType::CpuUsage => Some(self.cpu_usage),
            AlertType::MemoryUsage => Some(self.memory_usage),
            AlertType::DiskUsage => Some(self.disk_usage),
            AlertType::NetworkIn => Some(self.network_in),
            AlertType::NetworkOut => Some(self.network_out),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_for_resource_types_only() {
        let sample = ResourceSample {
            cpu_usage: 42.0,
            memory_usage: 50.0,
            disk_usage: 60.0,
            network_in: 1_000.0,
            network_out: 2_000.0,
            sampled_at: Utc::now(),
        };

        assert_eq!(sample.value_for(AlertType::CpuUsage), Some(42.0));
        assert_eq!(sample.value_for(AlertType::NetworkOut), Some(2_000.0));
        assert_eq!(sample.value_for(AlertType::Drawdown), None);
        assert_eq!(sample.value_for(AlertType::ServiceDown), None);
    }

    #[test]
    fn test_sampled_at_defaults_when_missing() {
        let sample: ResourceSample = serde_json::from_str(
            r#"{"cpu_usage":1,"memory_usage":2,"disk_usage":3,"network_in":4,"network_out":5}"#,
        )
        .unwrap();
        assert_eq!(sample.disk_usage, 3.0);
    }
}
