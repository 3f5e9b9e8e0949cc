//! PostgreSQL storage backend for the alert engine.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sentinel_core::types::{
    Alert, AlertConfig, AlertFilter, AlertType, ChannelKind, RiskProfile, Severity,
};
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics::RiskMetricsSnapshot;
use crate::store::AlertStore;

/// PostgreSQL-backed alert store. Tables come from `migrations/`.
pub struct PostgresAlertStore {
    pool: PgPool,
}

impl PostgresAlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row for alerts.
#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    alert_type: String,
    subject_id: String,
    severity: String,
    value: Option<f64>,
    threshold: Option<f64>,
    message: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
}

impl AlertRow {
    fn into_alert(self) -> Result<Alert> {
        let alert_type = AlertType::parse(&self.alert_type)
            .ok_or_else(|| anyhow!("unknown alert type in store: {}", self.alert_type))?;
        let severity = Severity::parse(&self.severity)
            .ok_or_else(|| anyhow!("unknown severity in store: {}", self.severity))?;

        Ok(Alert {
            id: self.id,
            alert_type,
            subject_id: self.subject_id,
            severity,
            value: self.value,
            threshold: self.threshold,
            message: self.message,
            metadata: self.metadata,
            created_at: self.created_at,
            resolved_at: self.resolved_at,
            resolved_by: self.resolved_by,
        })
    }
}

/// Database row for alert configs.
#[derive(Debug, sqlx::FromRow)]
struct AlertConfigRow {
    alert_type: String,
    enabled: bool,
    severity: String,
    threshold: Option<f64>,
    cooldown_seconds: i64,
    channels: Vec<String>,
    recipients: Vec<String>,
}

impl AlertConfigRow {
    fn into_config(self) -> Result<AlertConfig> {
        let alert_type = AlertType::parse(&self.alert_type)
            .ok_or_else(|| anyhow!("unknown alert type in store: {}", self.alert_type))?;
        let severity = Severity::parse(&self.severity)
            .ok_or_else(|| anyhow!("unknown severity in store: {}", self.severity))?;

        let channels = self
            .channels
            .iter()
            .filter_map(|c| {
                let parsed = ChannelKind::parse(c);
                if parsed.is_none() {
                    warn!(alert_type = %alert_type, channel = %c, "Ignoring unknown channel");
                }
                parsed
            })
            .collect();

        Ok(AlertConfig {
            alert_type,
            enabled: self.enabled,
            severity,
            threshold: self.threshold,
            cooldown_seconds: u64::try_from(self.cooldown_seconds).map_err(|_| {
                anyhow!(
                    "negative cooldown in store for {}: {}",
                    alert_type,
                    self.cooldown_seconds
                )
            })?,
            channels,
            recipients: self.recipients,
        })
    }
}

/// Database row for risk profiles.
#[derive(Debug, sqlx::FromRow)]
struct RiskProfileRow {
    subject_id: String,
    max_drawdown: f64,
    max_position_size: f64,
    max_leverage: f64,
    risk_per_trade: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RiskProfileRow> for RiskProfile {
    fn from(row: RiskProfileRow) -> Self {
        Self {
            subject_id: row.subject_id,
            max_drawdown: row.max_drawdown,
            max_position_size: row.max_position_size,
            max_leverage: row.max_leverage,
            risk_per_trade: row.risk_per_trade,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const ALERT_COLUMNS: &str = "id, alert_type, subject_id, severity, value, threshold, message, \
                             metadata, created_at, resolved_at, resolved_by";

#[async_trait::async_trait]
impl AlertStore for PostgresAlertStore {
    async fn save_alert(&self, alert: &Alert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (id, alert_type, subject_id, severity, value, threshold,
                                message, metadata, created_at, resolved_at, resolved_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(alert.id)
        .bind(alert.alert_type.as_str())
        .bind(&alert.subject_id)
        .bind(alert.severity.as_str())
        .bind(alert.value)
        .bind(alert.threshold)
        .bind(&alert.message)
        .bind(&alert.metadata)
        .bind(alert.created_at)
        .bind(alert.resolved_at)
        .bind(&alert.resolved_by)
        .execute(&self.pool)
        .await?;

        debug!(alert_id = %alert.id, alert_type = %alert.alert_type, "Saved alert");
        Ok(())
    }

    async fn get_alert(&self, id: Uuid) -> Result<Option<Alert>> {
        let query = format!("SELECT {} FROM alerts WHERE id = $1", ALERT_COLUMNS);
        let row = sqlx::query_as::<_, AlertRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(AlertRow::into_alert).transpose()
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        let mut query = format!("SELECT {} FROM alerts WHERE 1=1", ALERT_COLUMNS);

        let mut param_count = 0;

        if filter.alert_type.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND alert_type = ${}", param_count));
        }

        if filter.subject_id.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND subject_id = ${}", param_count));
        }

        if filter.severity.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND severity = ${}", param_count));
        }

        match filter.resolved {
            Some(true) => query.push_str(" AND resolved_at IS NOT NULL"),
            Some(false) => query.push_str(" AND resolved_at IS NULL"),
            None => {}
        }

        if filter.from.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND created_at >= ${}", param_count));
        }

        if filter.to.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND created_at <= ${}", param_count));
        }

        query.push_str(" ORDER BY created_at DESC");

        if filter.limit.is_some() {
            param_count += 1;
            query.push_str(&format!(" LIMIT ${}", param_count));
        }

        let mut query_builder = sqlx::query_as::<_, AlertRow>(&query);

        if let Some(alert_type) = filter.alert_type {
            query_builder = query_builder.bind(alert_type.as_str());
        }

        if let Some(ref subject_id) = filter.subject_id {
            query_builder = query_builder.bind(subject_id);
        }

        if let Some(severity) = filter.severity {
            query_builder = query_builder.bind(severity.as_str());
        }

        if let Some(from) = filter.from {
            query_builder = query_builder.bind(from);
        }

        if let Some(to) = filter.to {
            query_builder = query_builder.bind(to);
        }

        if let Some(limit) = filter.limit {
            query_builder = query_builder.bind(limit as i64);
        }

        let rows = query_builder.fetch_all(&self.pool).await?;

        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    async fn resolve_alert(
        &self,
        id: Uuid,
        resolved_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        let updated = sqlx::query(
            r#"
            UPDATE alerts SET resolved_at = $2, resolved_by = $3
            WHERE id = $1 AND resolved_at IS NULL
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(resolved_by)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() > 0 {
            debug!(alert_id = %id, resolved_by, "Resolved alert");
        }

        self.get_alert(id).await
    }

    async fn get_alert_config(&self, alert_type: AlertType) -> Result<Option<AlertConfig>> {
        let row = sqlx::query_as::<_, AlertConfigRow>(
            r#"
            SELECT alert_type, enabled, severity, threshold, cooldown_seconds, channels, recipients
            FROM alert_configs
            WHERE alert_type = $1
            "#,
        )
        .bind(alert_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(AlertConfigRow::into_config).transpose()
    }

    async fn put_alert_config(&self, config: &AlertConfig) -> Result<()> {
        let channels: Vec<&str> = config.channels.iter().map(ChannelKind::as_str).collect();
        let cooldown_seconds = i64::try_from(config.cooldown_seconds).map_err(|_| {
            anyhow!(
                "cooldown out of range for {}: {}",
                config.alert_type,
                config.cooldown_seconds
            )
        })?;

        sqlx::query(
            r#"
            INSERT INTO alert_configs
                (alert_type, enabled, severity, threshold, cooldown_seconds, channels, recipients, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (alert_type) DO UPDATE SET
                enabled = EXCLUDED.enabled,
                severity = EXCLUDED.severity,
                threshold = EXCLUDED.threshold,
                cooldown_seconds = EXCLUDED.cooldown_seconds,
                channels = EXCLUDED.channels,
                recipients = EXCLUDED.recipients,
                updated_at = NOW()
            "#,
        )
        .bind(config.alert_type.as_str())
        .bind(config.enabled)
        .bind(config.severity.as_str())
        .bind(config.threshold)
        .bind(cooldown_seconds)
        .bind(&channels)
        .bind(&config.recipients)
        .execute(&self.pool)
        .await?;

        debug!(alert_type = %config.alert_type, "Saved alert config");
        Ok(())
    }

    async fn list_alert_configs(&self) -> Result<Vec<AlertConfig>> {
        let rows = sqlx::query_as::<_, AlertConfigRow>(
            r#"
            SELECT alert_type, enabled, severity, threshold, cooldown_seconds, channels, recipients
            FROM alert_configs
            ORDER BY alert_type
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AlertConfigRow::into_config).collect()
    }

    async fn save_risk_metrics(&self, snapshot: &RiskMetricsSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO risk_metrics (subject_id, var_95, var_99, expected_shortfall,
                                      sharpe_ratio, sortino_ratio, max_drawdown, computed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&snapshot.subject_id)
        .bind(snapshot.var_95)
        .bind(snapshot.var_99)
        .bind(snapshot.expected_shortfall)
        .bind(snapshot.sharpe_ratio)
        .bind(snapshot.sortino_ratio)
        .bind(snapshot.max_drawdown)
        .bind(snapshot.computed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_risk_profile(&self, subject_id: &str) -> Result<Option<RiskProfile>> {
        let row = sqlx::query_as::<_, RiskProfileRow>(
            r#"
            SELECT subject_id, max_drawdown, max_position_size, max_leverage,
                   risk_per_trade, created_at, updated_at
            FROM risk_profiles
            WHERE subject_id = $1
            "#,
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RiskProfile::from))
    }

    async fn put_risk_profile(&self, profile: &RiskProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO risk_profiles (subject_id, max_drawdown, max_position_size, max_leverage,
                                       risk_per_trade, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (subject_id) DO UPDATE SET
                max_drawdown = EXCLUDED.max_drawdown,
                max_position_size = EXCLUDED.max_position_size,
                max_leverage = EXCLUDED.max_leverage,
                risk_per_trade = EXCLUDED.risk_per_trade,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&profile.subject_id)
        .bind(profile.max_drawdown)
        .bind(profile.max_position_size)
        .bind(profile.max_leverage)
        .bind(profile.risk_per_trade)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(subject = %profile.subject_id, "Saved risk profile");
        Ok(())
    }
}
