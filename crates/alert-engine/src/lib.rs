//! Alert Engine
//!
//! Risk metrics, threshold evaluation, cooldown gating and multi-channel
//! notification dispatch for monitored portfolios, hosts and services.

pub mod channels;
pub mod clock;
pub mod cooldown;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod metrics;
pub mod pg_store;
pub mod provider;
pub mod publisher;
pub mod store;
pub mod templates;

pub use channels::{
    ChannelError, EmailChannel, NotificationChannel, TelegramChannel, WebhookChannel,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use cooldown::CooldownGate;
pub use dispatcher::{ChannelOutcome, DispatchReport, NotificationDispatcher};
pub use engine::{AlertEngine, CycleReport, CycleState, EngineSettings};
pub use error::{AlertError, Result};
pub use evaluator::{validate_alert_config, Observation, ThresholdEvaluator};
pub use metrics::{MetricsError, RiskMetricsSnapshot};
pub use pg_store::PostgresAlertStore;
pub use provider::{HttpMetricsProvider, MetricsProvider, ProviderError};
pub use publisher::{AlertPublisher, RedisAlertPublisher};
pub use store::{AlertStore, MemoryAlertStore};
pub use templates::{TemplateData, TemplateKey};
