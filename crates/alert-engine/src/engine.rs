//! Alert engine orchestration.
//!
//! A cycle walks every monitored subject through three phases:
//! collecting observations from the [`MetricsProvider`], evaluating them
//! against alert configs and the cooldown gate, and dispatching the admitted
//! alerts. Failures (and panics) are contained per subject and per alert.

use chrono::{DateTime, Utc};
use futures_util::{stream, FutureExt, StreamExt};
use sentinel_core::config::{AlertRules, EngineConfig};
use sentinel_core::types::{
    Alert, AlertConfig, AlertFilter, AlertType, PortfolioExposure, ReturnSeries, RiskProfile,
    Subject, SubjectKind,
};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::cooldown::CooldownGate;
use crate::dispatcher::NotificationDispatcher;
use crate::error::{AlertError, Result};
use crate::evaluator::{validate_alert_config, Observation, ThresholdEvaluator};
use crate::metrics::RiskMetricsSnapshot;
use crate::provider::MetricsProvider;
use crate::publisher::AlertPublisher;
use crate::store::AlertStore;

/// Phase of the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Collecting,
    Evaluating,
    Dispatching,
}

impl CycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Collecting,
            2 => Self::Evaluating,
            3 => Self::Dispatching,
            _ => Self::Idle,
        }
    }
}

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub interval: Duration,
    /// Maximum subjects observed (and alerts dispatched) concurrently.
    pub worker_pool_size: usize,
    pub risk_free_rate: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            worker_pool_size: 8,
            risk_free_rate: 0.0,
        }
    }
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs.max(1)),
            worker_pool_size: config.worker_pool_size.max(1),
            risk_free_rate: config.risk_free_rate,
        }
    }
}

/// Summary of one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Another cycle was already running; nothing was done.
    pub skipped: bool,
    pub subjects: usize,
    pub observed: usize,
    pub failed_subjects: usize,
    pub candidates: usize,
    pub admitted: usize,
    pub suppressed: usize,
    pub persisted: usize,
    pub dispatch_failures: usize,
    pub alert_ids: Vec<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CycleReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

#[derive(Default)]
struct Counters {
    failed_subjects: AtomicUsize,
    persisted: AtomicUsize,
    dispatch_failures: AtomicUsize,
}

/// Periodic risk and resource alerting over a set of subjects.
pub struct AlertEngine {
    settings: EngineSettings,
    store: Arc<dyn AlertStore>,
    provider: Arc<dyn MetricsProvider>,
    dispatcher: NotificationDispatcher,
    publisher: Option<Arc<dyn AlertPublisher>>,
    clock: Arc<dyn Clock>,
    evaluator: ThresholdEvaluator,
    cooldown: CooldownGate,
    subjects: RwLock<Vec<Subject>>,
    state: AtomicU8,
    cycle_lock: Mutex<()>,
}

impl AlertEngine {
    pub fn new(
        settings: EngineSettings,
        store: Arc<dyn AlertStore>,
        provider: Arc<dyn MetricsProvider>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            settings,
            store,
            provider,
            dispatcher,
            publisher: None,
            clock: Arc::new(SystemClock),
            evaluator: ThresholdEvaluator,
            cooldown: CooldownGate::new(),
            subjects: RwLock::new(Vec::new()),
            state: AtomicU8::new(CycleState::Idle as u8),
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn AlertPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> CycleState {
        CycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: CycleState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn cooldown(&self) -> &CooldownGate {
        &self.cooldown
    }

    // ===== Subjects =====

    /// Start monitoring a subject. Returns `false` if it was already monitored.
    pub async fn add_subject(&self, subject: Subject) -> bool {
        let mut subjects = self.subjects.write().await;
        if subjects.contains(&subject) {
            return false;
        }
        info!(subject = %subject, "Monitoring subject");
        subjects.push(subject);
        true
    }

    /// Stop monitoring a subject. Returns `false` if it was not monitored.
    pub async fn remove_subject(&self, subject: &Subject) -> bool {
        let mut subjects = self.subjects.write().await;
        let before = subjects.len();
        subjects.retain(|s| s != subject);
        let removed = subjects.len() != before;
        if removed {
            info!(subject = %subject, "Stopped monitoring subject");
        }
        removed
    }

    pub async fn subjects(&self) -> Vec<Subject> {
        self.subjects.read().await.clone()
    }

    // ===== Configuration =====

    /// Validate and store the config for its alert type.
    pub async fn upsert_alert_config(&self, config: AlertConfig) -> Result<()> {
        validate_alert_config(&config)?;
        self.store.put_alert_config(&config).await?;
        info!(
            alert_type = %config.alert_type,
            enabled = config.enabled,
            threshold = ?config.threshold,
            cooldown_seconds = config.cooldown_seconds,
            "Alert config updated"
        );
        Ok(())
    }

    pub async fn alert_config(&self, alert_type: AlertType) -> Result<Option<AlertConfig>> {
        Ok(self.store.get_alert_config(alert_type).await?)
    }

    /// Validate and store a subject's risk profile.
    pub async fn upsert_risk_profile(&self, mut profile: RiskProfile) -> Result<RiskProfile> {
        profile.validate().map_err(AlertError::InvalidConfig)?;

        if let Some(existing) = self.store.get_risk_profile(&profile.subject_id).await? {
            profile.created_at = existing.created_at;
        }
        profile.updated_at = self.clock.now();

        self.store.put_risk_profile(&profile).await?;
        info!(subject = %profile.subject_id, "Risk profile updated");
        Ok(profile)
    }

    /// The subject's risk profile, created with system defaults on first use.
    pub async fn risk_profile(&self, subject_id: &str) -> Result<RiskProfile> {
        if let Some(profile) = self.store.get_risk_profile(subject_id).await? {
            return Ok(profile);
        }

        let profile = RiskProfile::with_defaults(subject_id);
        self.store.put_risk_profile(&profile).await?;
        debug!(subject = subject_id, "Created default risk profile");
        Ok(profile)
    }

    /// Apply loaded rules: alert configs, risk profiles, then subjects.
    pub async fn apply_rules(&self, rules: &AlertRules) -> Result<()> {
        for config in &rules.alerts {
            self.upsert_alert_config(config.clone()).await?;
        }
        for profile in &rules.profiles {
            self.upsert_risk_profile(profile.clone()).await?;
        }
        for subject in &rules.subjects {
            self.add_subject(subject.clone()).await;
        }
        Ok(())
    }

    // ===== Alerts =====

    pub async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        Ok(self.store.list_alerts(filter).await?)
    }

    /// Resolve an alert. Resolving an already-resolved alert changes nothing
    /// and returns it as stored.
    pub async fn resolve(&self, alert_id: Uuid, resolved_by: &str) -> Result<Alert> {
        let alert = self
            .store
            .resolve_alert(alert_id, resolved_by, self.clock.now())
            .await?
            .ok_or(AlertError::NotFound(alert_id))?;

        info!(
            alert_id = %alert_id,
            resolved_by = ?alert.resolved_by,
            "Alert resolved"
        );
        Ok(alert)
    }

    // ===== Cycle =====

    async fn observe(&self, subject: &Subject) -> Result<(Observation, RiskProfile)> {
        match subject.kind {
            SubjectKind::Portfolio => {
                let positions = self.provider.positions(&subject.id).await?;
                if positions.is_empty() {
                    return Err(AlertError::InsufficientData(format!(
                        "no open positions for {}",
                        subject.id
                    )));
                }

                let returns = ReturnSeries::from_positions(&positions);
                let mut snapshot =
                    RiskMetricsSnapshot::compute(&subject.id, &returns, self.settings.risk_free_rate)?;
                snapshot.computed_at = self.clock.now();

                if let Err(e) = self.store.save_risk_metrics(&snapshot).await {
                    warn!(subject = %subject, error = %e, "Failed to save risk metrics");
                }

                let exposure = PortfolioExposure::from_positions(&positions);
                let profile = self.risk_profile(&subject.id).await?;
                Ok((Observation::Portfolio { snapshot, exposure }, profile))
            }
            SubjectKind::Host => {
                let sample = self.provider.resource_sample(&subject.id).await?;
                Ok((Observation::Resource(sample), RiskProfile::with_defaults(&subject.id)))
            }
            SubjectKind::Service => {
                let healthy = self.provider.service_health(&subject.id).await?;
                Ok((
                    Observation::ServiceHealth { healthy },
                    RiskProfile::with_defaults(&subject.id),
                ))
            }
        }
    }

    async fn deliver(&self, alert: &Alert, config: &AlertConfig, counters: &Counters) {
        if let Err(e) = self.store.save_alert(alert).await {
            error!(alert_id = %alert.id, error = %e, "Failed to persist alert, not dispatching");
            return;
        }
        counters.persisted.fetch_add(1, Ordering::Relaxed);

        if self
            .dispatcher
            .dispatch(alert, &config.channels, &config.recipients)
            .await
            .is_err()
        {
            counters.dispatch_failures.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish(alert).await {
                warn!(alert_id = %alert.id, error = %e, "Failed to publish alert event");
            }
        }
    }

    /// Run one cycle over every monitored subject. Returns a skipped report
    /// if a cycle is already in progress.
    pub async fn run_cycle(&self) -> CycleReport {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            debug!("Cycle already running, skipping");
            return CycleReport::skipped();
        };

        let started_at = self.clock.now();
        let subjects = self.subjects().await;
        let counters = Counters::default();
        let workers = self.settings.worker_pool_size.max(1);

        let configs: HashMap<AlertType, AlertConfig> = match self.store.list_alert_configs().await {
            Ok(configs) => configs.into_iter().map(|c| (c.alert_type, c)).collect(),
            Err(e) => {
                error!(error = %e, "Failed to load alert configs, skipping cycle");
                return CycleReport {
                    subjects: subjects.len(),
                    started_at: Some(started_at),
                    finished_at: Some(self.clock.now()),
                    ..Default::default()
                };
            }
        };
        let config_list: Vec<AlertConfig> = configs.values().cloned().collect();

        // Collecting
        self.set_state(CycleState::Collecting);
        let observations = Mutex::new(Vec::with_capacity(subjects.len()));
        stream::iter(subjects.iter())
            .for_each_concurrent(workers, |subject| {
                let observations = &observations;
                let counters = &counters;
                async move {
                    match AssertUnwindSafe(self.observe(subject)).catch_unwind().await {
                        Ok(Ok(observed)) => observations.lock().await.push((subject, observed)),
                        Ok(Err(AlertError::InsufficientData(reason))) => {
                            debug!(subject = %subject, reason = %reason, "Skipping subject");
                        }
                        Ok(Err(e)) => {
                            counters.failed_subjects.fetch_add(1, Ordering::Relaxed);
                            warn!(subject = %subject, error = %e, "Failed to observe subject");
                        }
                        Err(_) => {
                            counters.failed_subjects.fetch_add(1, Ordering::Relaxed);
                            error!(subject = %subject, "Panic while observing subject");
                        }
                    }
                }
            })
            .await;
        let observations = observations.into_inner();

        // Evaluating
        self.set_state(CycleState::Evaluating);
        let now = self.clock.now();
        let mut candidates = 0;
        let mut admitted: Vec<(Alert, &AlertConfig)> = Vec::new();
        for (subject, (observation, profile)) in &observations {
            for alert in self
                .evaluator
                .evaluate(&subject.id, observation, profile, &config_list, now)
            {
                candidates += 1;
                let Some(config) = configs.get(&alert.alert_type) else {
                    continue;
                };
                if self.cooldown.admit(&alert, config.cooldown_seconds, now) {
                    admitted.push((alert, config));
                }
            }
        }

        // Dispatching
        self.set_state(CycleState::Dispatching);
        let alert_ids: Vec<Uuid> = admitted.iter().map(|(a, _)| a.id).collect();
        stream::iter(admitted.iter())
            .for_each_concurrent(workers, |(alert, config)| {
                let counters = &counters;
                async move {
                    if AssertUnwindSafe(self.deliver(alert, config, counters))
                        .catch_unwind()
                        .await
                        .is_err()
                    {
                        error!(alert_id = %alert.id, "Panic while delivering alert");
                    }
                }
            })
            .await;

        self.set_state(CycleState::Idle);

        let report = CycleReport {
            skipped: false,
            subjects: subjects.len(),
            observed: observations.len(),
            failed_subjects: counters.failed_subjects.load(Ordering::Relaxed),
            candidates,
            admitted: alert_ids.len(),
            suppressed: candidates - alert_ids.len(),
            persisted: counters.persisted.load(Ordering::Relaxed),
            dispatch_failures: counters.dispatch_failures.load(Ordering::Relaxed),
            alert_ids,
            started_at: Some(started_at),
            finished_at: Some(self.clock.now()),
        };

        info!(
            subjects = report.subjects,
            observed = report.observed,
            failed = report.failed_subjects,
            candidates = report.candidates,
            admitted = report.admitted,
            suppressed = report.suppressed,
            dispatch_failures = report.dispatch_failures,
            "Alert cycle complete"
        );

        report
    }

    /// Run cycles on the configured interval until `shutdown` turns true.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        self.run_with(shutdown, |_| {}).await;
    }

    /// Like [`AlertEngine::run`], calling `on_cycle` after every completed cycle.
    pub async fn run_with<F>(&self, mut shutdown: watch::Receiver<bool>, mut on_cycle: F)
    where
        F: FnMut(&CycleReport) + Send,
    {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.settings.interval.as_secs(),
            workers = self.settings.worker_pool_size,
            "Alert engine started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_cycle().await;
                    if !report.skipped {
                        on_cycle(&report);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Alert engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ChannelError, NotificationChannel};
    use crate::clock::ManualClock;
    use crate::provider::ProviderError;
    use crate::store::MemoryAlertStore;
    use crate::templates::{TemplateData, TemplateKey};
    use async_trait::async_trait;
    use mockall::mock;
    use sentinel_core::types::{
        ChannelKind, PositionSide, PositionSnapshot, ResourceSample, Severity,
    };
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeProvider {
        positions: HashMap<String, Vec<PositionSnapshot>>,
        cpu: HashMap<String, f64>,
        health: HashMap<String, bool>,
        delay: Option<Duration>,
        panic_on: Option<String>,
    }

    #[async_trait]
    impl MetricsProvider for FakeProvider {
        async fn positions(
            &self,
            subject_id: &str,
        ) -> std::result::Result<Vec<PositionSnapshot>, ProviderError> {
            self.positions
                .get(subject_id)
                .cloned()
                .ok_or_else(|| ProviderError::unavailable("positions", subject_id, "down"))
        }

        async fn resource_sample(
            &self,
            subject_id: &str,
        ) -> std::result::Result<ResourceSample, ProviderError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.panic_on.as_deref() == Some(subject_id) {
                panic!("agent exploded");
            }
            let cpu = self
                .cpu
                .get(subject_id)
                .copied()
                .ok_or_else(|| ProviderError::unavailable("agent", subject_id, "connection refused"))?;
            Ok(ResourceSample {
                cpu_usage: cpu,
                memory_usage: 10.0,
                disk_usage: 10.0,
                network_in: 0.0,
                network_out: 0.0,
                sampled_at: Utc::now(),
            })
        }

        async fn service_health(&self, subject_id: &str) -> std::result::Result<bool, ProviderError> {
            Ok(self.health.get(subject_id).copied().unwrap_or(false))
        }
    }

    #[derive(Default)]
    struct RecordingChannel {
        sent: StdMutex<Vec<(TemplateKey, Uuid)>>,
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Slack
        }

        async fn send(
            &self,
            template: TemplateKey,
            data: &TemplateData,
        ) -> std::result::Result<(), ChannelError> {
            self.sent.lock().unwrap().push((template, data.alert_id));
            Ok(())
        }
    }

    struct Harness {
        engine: Arc<AlertEngine>,
        store: MemoryAlertStore,
        channel: Arc<RecordingChannel>,
        clock: Arc<ManualClock>,
    }

    async fn harness(provider: FakeProvider) -> Harness {
        let store = MemoryAlertStore::new();
        let channel = Arc::new(RecordingChannel::default());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let dispatcher =
            NotificationDispatcher::new(Duration::from_secs(1)).with_channel(channel.clone());

        let engine = AlertEngine::new(
            EngineSettings::default(),
            Arc::new(store.clone()),
            Arc::new(provider),
            dispatcher,
        )
        .with_clock(clock.clone());

        engine
            .upsert_alert_config(
                AlertConfig::new(AlertType::CpuUsage)
                    .threshold(80.0)
                    .cooldown_seconds(300)
                    .channel(ChannelKind::Slack),
            )
            .await
            .unwrap();

        Harness {
            engine: Arc::new(engine),
            store,
            channel,
            clock,
        }
    }

    fn cpu_provider(readings: &[(&str, f64)]) -> FakeProvider {
        FakeProvider {
            cpu: readings.iter().map(|(h, v)| (h.to_string(), *v)).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cooldown_across_cycles() {
        let h = harness(cpu_provider(&[("host-1", 85.0)])).await;
        h.engine.add_subject(Subject::host("host-1")).await;

        let first = h.engine.run_cycle().await;
        assert_eq!(first.admitted, 1);

        h.clock.advance(chrono::Duration::seconds(120));
        let second = h.engine.run_cycle().await;
        assert_eq!(second.candidates, 1);
        assert_eq!(second.admitted, 0);
        assert_eq!(second.suppressed, 1);

        h.clock.advance(chrono::Duration::seconds(181));
        let third = h.engine.run_cycle().await;
        assert_eq!(third.admitted, 1);

        let alerts = h.store.list_alerts(&AlertFilter::new()).await.unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(h.channel.sent.lock().unwrap().len(), 2);
        assert_eq!(h.engine.state(), CycleState::Idle);
    }

    #[tokio::test]
    async fn test_value_at_threshold_does_not_alert() {
        let h = harness(cpu_provider(&[("host-1", 80.0)])).await;
        h.engine.add_subject(Subject::host("host-1")).await;

        let report = h.engine.run_cycle().await;
        assert_eq!(report.candidates, 0);
        assert!(h.channel.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_is_isolated() {
        let h = harness(cpu_provider(&[("host-b", 95.0)])).await;
        h.engine.add_subject(Subject::host("host-a")).await;
        h.engine.add_subject(Subject::host("host-b")).await;

        let report = h.engine.run_cycle().await;

        assert_eq!(report.failed_subjects, 1);
        assert_eq!(report.admitted, 1);
        let alerts = h.store.list_alerts(&AlertFilter::new()).await.unwrap();
        assert_eq!(alerts[0].subject_id, "host-b");
    }

    #[tokio::test]
    async fn test_panicking_subject_is_contained() {
        let mut provider = cpu_provider(&[("host-a", 95.0), ("host-b", 95.0)]);
        provider.panic_on = Some("host-a".to_string());
        let h = harness(provider).await;
        h.engine.add_subject(Subject::host("host-a")).await;
        h.engine.add_subject(Subject::host("host-b")).await;

        let report = h.engine.run_cycle().await;

        assert_eq!(report.failed_subjects, 1);
        assert_eq!(report.admitted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_cycle_is_skipped() {
        let mut provider = cpu_provider(&[("host-1", 50.0)]);
        provider.delay = Some(Duration::from_millis(100));
        let h = harness(provider).await;
        h.engine.add_subject(Subject::host("host-1")).await;

        let (first, second) = tokio::join!(h.engine.run_cycle(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            h.engine.run_cycle().await
        });

        assert!(!first.skipped);
        assert!(second.skipped);
    }

    #[tokio::test]
    async fn test_portfolio_drawdown_uses_profile() {
        let position = |entry: f64, current: f64| PositionSnapshot {
            symbol: None,
            side: PositionSide::Long,
            entry_price: entry,
            current_price: current,
            quantity: 1.0,
            margin: 100.0,
        };
        // returns [0.1, -0.5, 0.1] -> max drawdown -0.5
        let provider = FakeProvider {
            positions: HashMap::from([(
                "user-1".to_string(),
                vec![position(100.0, 110.0), position(100.0, 50.0), position(100.0, 110.0)],
            )]),
            ..Default::default()
        };
        let h = harness(provider).await;
        h.engine
            .upsert_alert_config(
                AlertConfig::new(AlertType::Drawdown)
                    .severity(Severity::Critical)
                    .channel(ChannelKind::Slack),
            )
            .await
            .unwrap();
        h.engine.add_subject(Subject::portfolio("user-1")).await;

        let report = h.engine.run_cycle().await;
        assert_eq!(report.admitted, 1);

        let alert = &h.store.list_alerts(&AlertFilter::new()).await.unwrap()[0];
        assert_eq!(alert.alert_type, AlertType::Drawdown);
        assert_eq!(alert.threshold, Some(0.20));
        assert!((alert.value.unwrap() - 0.5).abs() < 1e-9);

        assert_eq!(h.store.risk_metrics_for("user-1").await.len(), 1);
        let profile = h.engine.risk_profile("user-1").await.unwrap();
        assert_eq!(profile.max_leverage, 3.0);

        let sent = h.channel.sent.lock().unwrap();
        assert_eq!(sent[0].0, TemplateKey::RiskLimit);
    }

    #[tokio::test]
    async fn test_service_down_alert() {
        let provider = FakeProvider {
            health: HashMap::from([("trading".to_string(), false), ("accounts".to_string(), true)]),
            ..Default::default()
        };
        let h = harness(provider).await;
        h.engine
            .upsert_alert_config(AlertConfig::new(AlertType::ServiceDown).channel(ChannelKind::Slack))
            .await
            .unwrap();
        h.engine.add_subject(Subject::service("trading")).await;
        h.engine.add_subject(Subject::service("accounts")).await;

        let report = h.engine.run_cycle().await;
        assert_eq!(report.admitted, 1);
        assert_eq!(h.channel.sent.lock().unwrap()[0].0, TemplateKey::ServiceDown);
    }

    #[tokio::test]
    async fn test_resolve_semantics() {
        let h = harness(cpu_provider(&[("host-1", 99.0)])).await;
        h.engine.add_subject(Subject::host("host-1")).await;
        let report = h.engine.run_cycle().await;
        let alert_id = report.alert_ids[0];

        let first = h.engine.resolve(alert_id, "alice").await.unwrap();
        h.clock.advance(chrono::Duration::minutes(5));
        let second = h.engine.resolve(alert_id, "bob").await.unwrap();

        assert_eq!(second.resolved_at, first.resolved_at);
        assert_eq!(second.resolved_by.as_deref(), Some("alice"));

        let missing = h.engine.resolve(Uuid::new_v4(), "alice").await;
        assert!(matches!(missing, Err(AlertError::NotFound(_))));

        let open = h
            .engine
            .list_alerts(&AlertFilter::new().resolved(false))
            .await
            .unwrap();
        assert!(open.is_empty());
    }

    #[tokio::test]
    async fn test_config_and_profile_validation() {
        let h = harness(FakeProvider::default()).await;

        let bad = h
            .engine
            .upsert_alert_config(AlertConfig::new(AlertType::MemoryUsage).threshold(150.0))
            .await;
        assert!(matches!(bad, Err(AlertError::InvalidConfig(_))));
        assert!(h.engine.alert_config(AlertType::MemoryUsage).await.unwrap().is_none());

        let bad = h
            .engine
            .upsert_alert_config(
                AlertConfig::new(AlertType::ServiceDown).cooldown_seconds(u64::MAX),
            )
            .await;
        assert!(matches!(bad, Err(AlertError::InvalidConfig(_))));
        assert!(h.engine.alert_config(AlertType::ServiceDown).await.unwrap().is_none());

        let mut profile = RiskProfile::with_defaults("user-1");
        profile.risk_per_trade = 2.0;
        let bad = h.engine.upsert_risk_profile(profile).await;
        assert!(matches!(bad, Err(AlertError::InvalidConfig(_))));

        let mut profile = RiskProfile::with_defaults("user-1");
        profile.max_leverage = 5.0;
        h.engine.upsert_risk_profile(profile).await.unwrap();
        assert_eq!(h.engine.risk_profile("user-1").await.unwrap().max_leverage, 5.0);
    }

    #[tokio::test]
    async fn test_subject_management() {
        let h = harness(FakeProvider::default()).await;

        assert!(h.engine.add_subject(Subject::host("db-1")).await);
        assert!(!h.engine.add_subject(Subject::host("db-1")).await);
        assert!(h.engine.add_subject(Subject::service("db-1")).await);
        assert_eq!(h.engine.subjects().await.len(), 2);

        assert!(h.engine.remove_subject(&Subject::host("db-1")).await);
        assert!(!h.engine.remove_subject(&Subject::host("db-1")).await);
        assert_eq!(h.engine.subjects().await, vec![Subject::service("db-1")]);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = harness(cpu_provider(&[("host-1", 90.0)])).await;
        h.engine.add_subject(Subject::host("host-1")).await;

        let (tx, rx) = watch::channel(false);
        let engine = h.engine.clone();
        let cycles = Arc::new(AtomicUsize::new(0));
        let counted = cycles.clone();
        let handle = tokio::spawn(async move {
            engine
                .run_with(rx, move |_| {
                    counted.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        });

        // The first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        tokio_test::assert_ok!(tokio::time::timeout(Duration::from_secs(5), handle).await);

        assert_eq!(cycles.load(Ordering::SeqCst), 1);
        assert_eq!(h.store.list_alerts(&AlertFilter::new()).await.unwrap().len(), 1);
    }

    #[derive(Default)]
    struct RecordingPublisher {
        published: StdMutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl AlertPublisher for RecordingPublisher {
        async fn publish(&self, alert: &Alert) -> anyhow::Result<()> {
            self.published.lock().unwrap().push(alert.id);
            Ok(())
        }
    }

    struct FailingPublisher;

    #[async_trait]
    impl AlertPublisher for FailingPublisher {
        async fn publish(&self, _alert: &Alert) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("broker unreachable"))
        }
    }

    mock! {
        pub Store {}

        #[async_trait]
        impl AlertStore for Store {
            async fn save_alert(&self, alert: &Alert) -> anyhow::Result<()>;
            async fn get_alert(&self, id: Uuid) -> anyhow::Result<Option<Alert>>;
            async fn list_alerts(&self, filter: &AlertFilter) -> anyhow::Result<Vec<Alert>>;
            async fn resolve_alert(
                &self,
                id: Uuid,
                resolved_by: &str,
                at: DateTime<Utc>,
            ) -> anyhow::Result<Option<Alert>>;
            async fn get_alert_config(&self, alert_type: AlertType) -> anyhow::Result<Option<AlertConfig>>;
            async fn put_alert_config(&self, config: &AlertConfig) -> anyhow::Result<()>;
            async fn list_alert_configs(&self) -> anyhow::Result<Vec<AlertConfig>>;
            async fn save_risk_metrics(&self, snapshot: &RiskMetricsSnapshot) -> anyhow::Result<()>;
            async fn get_risk_profile(&self, subject_id: &str) -> anyhow::Result<Option<RiskProfile>>;
            async fn put_risk_profile(&self, profile: &RiskProfile) -> anyhow::Result<()>;
        }
    }

    fn cpu_config() -> AlertConfig {
        AlertConfig::new(AlertType::CpuUsage)
            .threshold(80.0)
            .channel(ChannelKind::Slack)
    }

    #[tokio::test]
    async fn test_admitted_alerts_are_published_after_persist() {
        let store = MemoryAlertStore::new();
        let publisher = Arc::new(RecordingPublisher::default());
        let engine = AlertEngine::new(
            EngineSettings::default(),
            Arc::new(store.clone()),
            Arc::new(cpu_provider(&[("host-1", 95.0), ("host-2", 10.0)])),
            NotificationDispatcher::new(Duration::from_secs(1)),
        )
        .with_publisher(publisher.clone());
        engine.upsert_alert_config(cpu_config()).await.unwrap();
        engine.add_subject(Subject::host("host-1")).await;
        engine.add_subject(Subject::host("host-2")).await;

        let report = engine.run_cycle().await;

        assert_eq!(report.admitted, 1);
        let published = publisher.published.lock().unwrap().clone();
        assert_eq!(published, report.alert_ids);
        assert!(store.get_alert(published[0]).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_fail_cycle() {
        let store = MemoryAlertStore::new();
        let channel = Arc::new(RecordingChannel::default());
        let engine = AlertEngine::new(
            EngineSettings::default(),
            Arc::new(store.clone()),
            Arc::new(cpu_provider(&[("host-1", 95.0)])),
            NotificationDispatcher::new(Duration::from_secs(1)).with_channel(channel.clone()),
        )
        .with_publisher(Arc::new(FailingPublisher));
        engine.upsert_alert_config(cpu_config()).await.unwrap();
        engine.add_subject(Subject::host("host-1")).await;

        let report = engine.run_cycle().await;

        assert_eq!(report.admitted, 1);
        assert_eq!(report.persisted, 1);
        assert_eq!(report.dispatch_failures, 0);
        assert_eq!(channel.sent.lock().unwrap().len(), 1);
        assert_eq!(engine.state(), CycleState::Idle);
    }

    #[tokio::test]
    async fn test_failed_persist_skips_dispatch_and_publish() {
        let mut store = MockStore::new();
        store
            .expect_list_alert_configs()
            .returning(|| Ok(vec![cpu_config()]));
        store
            .expect_save_alert()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("disk full")));

        let channel = Arc::new(RecordingChannel::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let engine = AlertEngine::new(
            EngineSettings::default(),
            Arc::new(store),
            Arc::new(cpu_provider(&[("host-1", 95.0)])),
            NotificationDispatcher::new(Duration::from_secs(1)).with_channel(channel.clone()),
        )
        .with_publisher(publisher.clone());
        engine.add_subject(Subject::host("host-1")).await;

        let report = engine.run_cycle().await;

        assert_eq!(report.admitted, 1);
        assert_eq!(report.persisted, 0);
        assert!(channel.sent.lock().unwrap().is_empty());
        assert!(publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_default_rules_alert_on_profile_breach() {
        let position = |entry: f64, current: f64, quantity: f64, margin: f64| PositionSnapshot {
            symbol: None,
            side: PositionSide::Long,
            entry_price: entry,
            current_price: current,
            quantity,
            margin,
        };
        // returns [0.1, -0.6]: drawdown 0.6, leverage 20000x, exposure 200110
        let provider = FakeProvider {
            positions: HashMap::from([(
                "fund-x".to_string(),
                vec![position(100.0, 110.0, 1.0, 100.0), position(100.0, 40.0, 5000.0, 10.0)],
            )]),
            ..Default::default()
        };
        let h = harness(provider).await;
        h.engine.apply_rules(&AlertRules::default()).await.unwrap();
        h.engine.add_subject(Subject::portfolio("fund-x")).await;

        let report = h.engine.run_cycle().await;
        assert_eq!(report.admitted, 3);
        assert_eq!(report.dispatch_failures, 0);

        let alerts = h.store.list_alerts(&AlertFilter::new()).await.unwrap();
        let mut types: Vec<AlertType> = alerts.iter().map(|a| a.alert_type).collect();
        types.sort();
        let mut expected = vec![AlertType::Drawdown, AlertType::Leverage, AlertType::PositionSize];
        expected.sort();
        assert_eq!(types, expected);
        assert!(alerts.iter().all(|a| a.severity == Severity::High));

        let profile = RiskProfile::with_defaults("fund-x");
        let drawdown = alerts.iter().find(|a| a.alert_type == AlertType::Drawdown).unwrap();
        assert_eq!(drawdown.threshold, Some(profile.max_drawdown));
        let leverage = alerts.iter().find(|a| a.alert_type == AlertType::Leverage).unwrap();
        assert_eq!(leverage.threshold, Some(profile.max_leverage));
    }
}
