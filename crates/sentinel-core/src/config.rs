//! Configuration management for the Trade Sentinel system.

use crate::types::{AlertConfig, AlertType, ChannelKind, RiskProfile, Severity, Subject};
use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use url::Url;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Absent when `DATABASE_URL` is unset; the monitor then keeps state in memory.
    pub database: Option<DatabaseConfig>,
    /// Absent when `REDIS_URL` is unset; alerts are then not published.
    pub redis: Option<RedisConfig>,
    pub alerts: AlertsConfig,
    pub provider: ProviderConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// Notification channel credentials. A channel is registered only when its
/// section is present.
#[derive(Debug, Clone, Default)]
pub struct AlertsConfig {
    pub smtp: Option<SmtpConfig>,
    pub slack: Option<SlackConfig>,
    pub discord_webhook_url: Option<Url>,
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
    /// Recipients used when an alert config lists none.
    pub default_recipients: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub webhook_url: Url,
    pub channel: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

/// Upstream services the engine pulls observations from.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub position_service_url: Url,
    pub metrics_agent_url: Url,
    pub service_health_base_url: Url,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub interval_secs: u64,
    pub worker_pool_size: usize,
    pub channel_timeout_secs: u64,
    pub risk_free_rate: f64,
    pub rules_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            worker_pool_size: 8,
            channel_timeout_secs: 10,
            risk_free_rate: 0.0,
            rules_path: "alert_rules".to_string(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_url(key: &'static str, default: &str) -> Result<Url> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|source| Error::Url { field: key, source })
}

fn env_optional_url(key: &'static str) -> Result<Option<Url>> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => Url::parse(&raw)
            .map(Some)
            .map_err(|source| Error::Url { field: key, source }),
        _ => Ok(None),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Config {
    /// Load configuration from environment variables.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database = env::var("DATABASE_URL").ok().map(|url| DatabaseConfig {
            url,
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 5),
        });

        let redis = env::var("REDIS_URL").ok().map(|url| RedisConfig { url });

        let smtp = match env::var("SMTP_HOST") {
            Ok(host) => Some(SmtpConfig {
                host,
                port: env_parse("SMTP_PORT", 587),
                username: env::var("SMTP_USERNAME").unwrap_or_default(),
                password: env::var("SMTP_PASSWORD").unwrap_or_default(),
                from_address: env::var("SMTP_FROM").map_err(|_| Error::Config {
                    message: "SMTP_FROM must be set when SMTP_HOST is set".to_string(),
                })?,
                default_recipients: env::var("SMTP_TO")
                    .map(|raw| split_list(&raw))
                    .unwrap_or_default(),
            }),
            Err(_) => None,
        };

        let slack = env_optional_url("SLACK_WEBHOOK_URL")?.map(|webhook_url| SlackConfig {
            webhook_url,
            channel: env::var("SLACK_CHANNEL").ok(),
        });

        let telegram = match (env::var("TELEGRAM_BOT_TOKEN"), env::var("TELEGRAM_CHAT_ID")) {
            (Ok(bot_token), Ok(chat_id)) => Some(TelegramConfig { bot_token, chat_id }),
            _ => None,
        };

        let defaults = EngineConfig::default();

        Ok(Self {
            database,
            redis,
            alerts: AlertsConfig {
                smtp,
                slack,
                discord_webhook_url: env_optional_url("DISCORD_WEBHOOK_URL")?,
                telegram,
            },
            provider: ProviderConfig {
                position_service_url: env_url("POSITION_SERVICE_URL", "http://localhost:8002")?,
                metrics_agent_url: env_url("METRICS_AGENT_URL", "http://localhost:9100")?,
                service_health_base_url: env_url("SERVICE_HEALTH_BASE_URL", "http://localhost")?,
                timeout_secs: env_parse("PROVIDER_TIMEOUT_SECS", 5),
            },
            engine: EngineConfig {
                interval_secs: env_parse("ALERT_INTERVAL_SECS", defaults.interval_secs),
                worker_pool_size: env_parse("ALERT_WORKER_POOL_SIZE", defaults.worker_pool_size)
                    .max(1),
                channel_timeout_secs: env_parse(
                    "ALERT_CHANNEL_TIMEOUT_SECS",
                    defaults.channel_timeout_secs,
                ),
                risk_free_rate: env_parse("RISK_FREE_RATE", defaults.risk_free_rate),
                rules_path: env::var("ALERT_RULES_PATH").unwrap_or(defaults.rules_path),
            },
        })
    }

    /// Load configuration for testing (with defaults).
    #[cfg(test)]
    pub fn test_config() -> Self {
        let local = |port: u16| {
            Url::parse(&format!("http://127.0.0.1:{port}")).unwrap()
        };
        Self {
            database: None,
            redis: None,
            alerts: AlertsConfig::default(),
            provider: ProviderConfig {
                position_service_url: local(8002),
                metrics_agent_url: local(9100),
                service_health_base_url: local(80),
                timeout_secs: 1,
            },
            engine: EngineConfig::default(),
        }
    }
}

/// Alert rules: per-type alert configs, monitored subjects, and risk profiles.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertRules {
    #[serde(default = "default_alert_configs")]
    pub alerts: Vec<AlertConfig>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub profiles: Vec<RiskProfile>,
}

impl Default for AlertRules {
    fn default() -> Self {
        Self {
            alerts: default_alert_configs(),
            subjects: Vec::new(),
            profiles: Vec::new(),
        }
    }
}

/// Built-in rules for host resources, service health and portfolio risk.
/// The risk rules carry no threshold and apply each subject's profile limits.
pub fn default_alert_configs() -> Vec<AlertConfig> {
    let resource = |alert_type: AlertType, threshold: f64| {
        AlertConfig::new(alert_type)
            .threshold(threshold)
            .channel(ChannelKind::Email)
            .channel(ChannelKind::Slack)
    };

    let risk = |alert_type: AlertType| {
        AlertConfig::new(alert_type)
            .severity(Severity::High)
            .channel(ChannelKind::Email)
            .channel(ChannelKind::Slack)
    };

    vec![
        resource(AlertType::CpuUsage, 80.0),
        resource(AlertType::MemoryUsage, 85.0),
        resource(AlertType::DiskUsage, 90.0),
        resource(AlertType::NetworkIn, 1_000_000_000.0),
        resource(AlertType::NetworkOut, 1_000_000_000.0),
        AlertConfig::new(AlertType::ServiceDown)
            .severity(Severity::Critical)
            .channel(ChannelKind::Email)
            .channel(ChannelKind::Slack),
        risk(AlertType::Drawdown),
        risk(AlertType::Leverage),
        risk(AlertType::PositionSize),
    ]
}

impl AlertRules {
    /// Load rules from an optional file (`path` with or without a
    /// `.toml`/`.yaml`/`.json` extension) layered under `SENTINEL__*`
    /// environment overrides. A missing file yields the built-in rules.
    #[allow(clippy::result_large_err)]
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("SENTINEL")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let rules: AlertRules = settings.try_deserialize()?;
        tracing::debug!(
            path,
            alerts = rules.alerts.len(),
            subjects = rules.subjects.len(),
            profiles = rules.profiles.len(),
            "Loaded alert rules"
        );
        Ok(rules)
    }
}
