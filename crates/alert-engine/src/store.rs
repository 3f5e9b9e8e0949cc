//! Persistence interface for alerts, configs, metrics and risk profiles.

use crate::metrics::RiskMetricsSnapshot;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sentinel_core::types::{Alert, AlertConfig, AlertFilter, AlertType, RiskProfile};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Storage backend for the alert engine.
#[async_trait::async_trait]
pub trait AlertStore: Send + Sync {
    async fn save_alert(&self, alert: &Alert) -> Result<()>;

    async fn get_alert(&self, id: Uuid) -> Result<Option<Alert>>;

    /// Alerts matching `filter`, newest first.
    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>>;

    /// Mark an alert resolved unless it already is. Returns the stored alert
    /// after the call, or `None` if no alert has this id.
    async fn resolve_alert(
        &self,
        id: Uuid,
        resolved_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>>;

    async fn get_alert_config(&self, alert_type: AlertType) -> Result<Option<AlertConfig>>;

    /// Insert or replace the config for `config.alert_type`.
    async fn put_alert_config(&self, config: &AlertConfig) -> Result<()>;

    async fn list_alert_configs(&self) -> Result<Vec<AlertConfig>>;

    /// Append a metrics snapshot to the subject's history.
    async fn save_risk_metrics(&self, snapshot: &RiskMetricsSnapshot) -> Result<()>;

    async fn get_risk_profile(&self, subject_id: &str) -> Result<Option<RiskProfile>>;

    /// Insert or replace the profile for `profile.subject_id`.
    async fn put_risk_profile(&self, profile: &RiskProfile) -> Result<()>;
}

/// Snapshots kept per subject by [`MemoryAlertStore`]; older ones are dropped.
pub const MEMORY_METRICS_HISTORY: usize = 1_000;

/// In-memory store for tests and deployments without a database.
#[derive(Clone, Default)]
pub struct MemoryAlertStore {
    alerts: Arc<RwLock<Vec<Alert>>>,
    configs: Arc<RwLock<HashMap<AlertType, AlertConfig>>>,
    metrics: Arc<RwLock<HashMap<String, VecDeque<RiskMetricsSnapshot>>>>,
    profiles: Arc<RwLock<HashMap<String, RiskProfile>>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics history for a subject, oldest first.
    pub async fn risk_metrics_for(&self, subject_id: &str) -> Vec<RiskMetricsSnapshot> {
        self.metrics
            .read()
            .await
            .get(subject_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl AlertStore for MemoryAlertStore {
    async fn save_alert(&self, alert: &Alert) -> Result<()> {
        self.alerts.write().await.push(alert.clone());
        Ok(())
    }

    async fn get_alert(&self, id: Uuid) -> Result<Option<Alert>> {
        Ok(self.alerts.read().await.iter().find(|a| a.id == id).cloned())
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        let alerts = self.alerts.read().await;

        let mut matching: Vec<Alert> = alerts.iter().filter(|a| filter.matches(a)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(limit) = filter.limit {
            matching.truncate(limit as usize);
        }

        Ok(matching)
    }

    async fn resolve_alert(
        &self,
        id: Uuid,
        resolved_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        let mut alerts = self.alerts.write().await;
        Ok(alerts.iter_mut().find(|a| a.id == id).map(|alert| {
            alert.resolve(resolved_by, at);
            alert.clone()
        }))
    }

    async fn get_alert_config(&self, alert_type: AlertType) -> Result<Option<AlertConfig>> {
        Ok(self.configs.read().await.get(&alert_type).cloned())
    }

    async fn put_alert_config(&self, config: &AlertConfig) -> Result<()> {
        self.configs
            .write()
            .await
            .insert(config.alert_type, config.clone());
        Ok(())
    }

    async fn list_alert_configs(&self) -> Result<Vec<AlertConfig>> {
        let mut configs: Vec<AlertConfig> = self.configs.read().await.values().cloned().collect();
        configs.sort_by_key(|c| c.alert_type);
        Ok(configs)
    }

    async fn save_risk_metrics(&self, snapshot: &RiskMetricsSnapshot) -> Result<()> {
        let mut metrics = self.metrics.write().await;
        let history = metrics.entry(snapshot.subject_id.clone()).or_default();
        if history.len() == MEMORY_METRICS_HISTORY {
            history.pop_front();
        }
        history.push_back(snapshot.clone());
        Ok(())
    }

    async fn get_risk_profile(&self, subject_id: &str) -> Result<Option<RiskProfile>> {
        Ok(self.profiles.read().await.get(subject_id).cloned())
    }

    async fn put_risk_profile(&self, profile: &RiskProfile) -> Result<()> {
        self.profiles
            .write()
            .await
            .insert(profile.subject_id.clone(), profile.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sentinel_core::types::Severity;

    #[tokio::test]
    async fn test_list_alerts_newest_first_with_limit() {
        let store = MemoryAlertStore::new();
        let now = Utc::now();

        for i in 0..3 {
            let alert = Alert::new(AlertType::CpuUsage, "host-1", Severity::Warning, format!("a{i}"))
                .created_at(now + Duration::seconds(i));
            store.save_alert(&alert).await.unwrap();
        }
        store
            .save_alert(&Alert::new(AlertType::DiskUsage, "host-2", Severity::High, "disk"))
            .await
            .unwrap();

        let filter = AlertFilter::new().subject("host-1").limit(2);
        let alerts = store.list_alerts(&filter).await.unwrap();

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].message, "a2");
        assert_eq!(alerts[1].message, "a1");
    }

    #[tokio::test]
    async fn test_resolve_keeps_first_resolution() {
        let store = MemoryAlertStore::new();
        let alert = Alert::new(AlertType::ServiceDown, "api", Severity::Critical, "down");
        store.save_alert(&alert).await.unwrap();

        let first = Utc::now();
        let resolved = store.resolve_alert(alert.id, "alice", first).await.unwrap().unwrap();
        assert_eq!(resolved.resolved_by.as_deref(), Some("alice"));

        let again = store
            .resolve_alert(alert.id, "bob", first + Duration::minutes(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.resolved_at, Some(first));
        assert_eq!(again.resolved_by.as_deref(), Some("alice"));

        assert!(store
            .resolve_alert(Uuid::new_v4(), "alice", first)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_metrics_history_is_capped_per_subject() {
        let store = MemoryAlertStore::new();
        let series = sentinel_core::types::ReturnSeries::new(vec![0.01, -0.02, 0.03]);

        for _ in 0..MEMORY_METRICS_HISTORY + 5 {
            let snapshot = RiskMetricsSnapshot::compute("user-1", &series, 0.0).unwrap();
            store.save_risk_metrics(&snapshot).await.unwrap();
        }
        let other = RiskMetricsSnapshot::compute("user-2", &series, 0.0).unwrap();
        store.save_risk_metrics(&other).await.unwrap();

        assert_eq!(store.risk_metrics_for("user-1").await.len(), MEMORY_METRICS_HISTORY);
        assert_eq!(store.risk_metrics_for("user-2").await.len(), 1);
        assert!(store.risk_metrics_for("user-3").await.is_empty());
    }

    #[tokio::test]
    async fn test_config_upsert_is_keyed_by_type() {
        let store = MemoryAlertStore::new();
        store
            .put_alert_config(&AlertConfig::new(AlertType::CpuUsage).threshold(80.0))
            .await
            .unwrap();
        store
            .put_alert_config(&AlertConfig::new(AlertType::CpuUsage).threshold(70.0))
            .await
            .unwrap();

        let configs = store.list_alert_configs().await.unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].threshold, Some(70.0));
    }
}
