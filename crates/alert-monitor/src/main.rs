//! Alert Monitor
//!
//! Periodically evaluates portfolio risk, host resources and service health,
//! and fans admitted alerts out to the configured notification channels.

use alert_engine::{
    AlertEngine, AlertPublisher, AlertStore, EmailChannel, EngineSettings, HttpMetricsProvider,
    MemoryAlertStore, NotificationDispatcher, PostgresAlertStore, RedisAlertPublisher,
    TelegramChannel, WebhookChannel,
};
use anyhow::Result;
use clap::Parser;
use sentinel_core::config::{AlertRules, AlertsConfig, Config};
use sentinel_core::db;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

const HEALTH_FILE: &str = "/tmp/healthy";

#[derive(Parser, Debug)]
#[command(name = "alert-monitor", about = "Risk and resource alerting service")]
struct Args {
    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Alert rules file, overriding ALERT_RULES_PATH.
    #[arg(long)]
    rules: Option<String>,
}

fn touch_health_file() {
    let _ = std::fs::write(HEALTH_FILE, format!("{}", chrono::Utc::now().timestamp()));
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "alert_monitor=info,alert_engine=info,sentinel_core=warn".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn build_dispatcher(alerts: &AlertsConfig, timeout: Duration) -> Result<NotificationDispatcher> {
    let http_client = reqwest::Client::builder().timeout(timeout).build()?;
    let mut dispatcher = NotificationDispatcher::new(timeout);

    if let Some(smtp) = &alerts.smtp {
        dispatcher.register(Arc::new(EmailChannel::new(smtp.clone())?));
    }
    if let Some(slack) = &alerts.slack {
        dispatcher.register(Arc::new(WebhookChannel::slack(
            http_client.clone(),
            slack.webhook_url.clone(),
            slack.channel.clone(),
        )));
    }
    if let Some(url) = &alerts.discord_webhook_url {
        dispatcher.register(Arc::new(WebhookChannel::discord(http_client.clone(), url.clone())));
    }
    if let Some(telegram) = &alerts.telegram {
        dispatcher.register(Arc::new(TelegramChannel::new(http_client, telegram.clone())));
    }

    let registered = dispatcher.registered();
    if registered.is_empty() {
        warn!("No notification channels configured; alerts will only be stored");
    } else {
        info!(channels = ?registered, "Notification channels registered");
    }

    Ok(dispatcher)
}

async fn build_store(config: &Config) -> Result<Arc<dyn AlertStore>> {
    match &config.database {
        Some(database) => {
            let pool = db::create_pool(database).await?;

            let skip_migrations = std::env::var("SKIP_MIGRATIONS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false);
            if skip_migrations {
                info!("Skipping migrations (SKIP_MIGRATIONS=true)");
            } else {
                db::run_migrations(&pool).await?;
            }

            Ok(Arc::new(PostgresAlertStore::new(pool)))
        }
        None => {
            warn!("DATABASE_URL not set, keeping alerts in memory");
            Ok(Arc::new(MemoryAlertStore::new()))
        }
    }
}

async fn build_publisher(config: &Config) -> Option<Arc<dyn AlertPublisher>> {
    let redis = config.redis.as_ref()?;

    let client = match redis::Client::open(redis.url.as_str()) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Invalid REDIS_URL, alert events disabled");
            return None;
        }
    };

    match RedisAlertPublisher::new(client).await {
        Ok(publisher) => Some(Arc::new(publisher)),
        Err(e) => {
            warn!(error = %e, "Redis unavailable, alert events disabled");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    info!("Starting Alert Monitor");
    touch_health_file();

    let config = Config::from_env()?;
    let rules_path = args.rules.unwrap_or_else(|| config.engine.rules_path.clone());
    let rules = AlertRules::load(&rules_path)?;

    let store = build_store(&config).await?;
    let provider = Arc::new(HttpMetricsProvider::new(&config.provider)?);
    let dispatcher = build_dispatcher(
        &config.alerts,
        Duration::from_secs(config.engine.channel_timeout_secs),
    )?;

    let mut engine = AlertEngine::new(
        EngineSettings::from(&config.engine),
        store,
        provider,
        dispatcher,
    );
    if let Some(publisher) = build_publisher(&config).await {
        engine = engine.with_publisher(publisher);
    }

    engine.apply_rules(&rules).await?;
    info!(
        subjects = engine.subjects().await.len(),
        rules = %rules_path,
        "Alert rules applied"
    );

    if args.once {
        let report = engine.run_cycle().await;
        touch_health_file();
        info!(admitted = report.admitted, "Single cycle finished");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    engine
        .run_with(shutdown_rx, |_| touch_health_file())
        .await;

    Ok(())
}
