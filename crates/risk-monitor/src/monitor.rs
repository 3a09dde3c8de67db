//! The periodic risk loop.
//!
//! Each tick lists active configurations and evaluates them concurrently
//! (bounded by a semaphore), one deadline per configuration. Failures are
//! isolated per configuration and per position, logged, and recorded through
//! the audit sink. Ticks never overlap.

use crate::evaluation::evaluate;
use crate::executor::ActionExecutor;
use crate::health::{HealthReporter, HealthStatus};
use crate::price::CachedPriceProvider;
use crate::retrigger::TriggerLedger;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use risk_guard_core::{
    ActionResult, AuditSink, CacheTtls, Clock, ConfigRepository, FreshnessCache, GuardError,
    MarketTick, MonitorConfig, PriceProvider, RetriggerPolicy, RiskConfig, SecretsStore,
    SessionFactory, SystemClock,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

// =============================================================================
// Settings & Reports
// =============================================================================

/// Runtime knobs of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Time between tick starts.
    pub interval: Duration,
    /// Maximum configurations evaluated at once.
    pub max_concurrency: usize,
    /// Deadline for evaluating one configuration.
    pub config_timeout: Duration,
    /// How long shutdown waits for an in-flight tick.
    pub shutdown_grace: Duration,
    /// Repeated-trigger handling.
    pub retrigger: RetriggerPolicy,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for MonitorSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            max_concurrency: config.max_concurrency.max(1),
            config_timeout: Duration::from_secs(config.config_timeout_secs),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
            retrigger: config.retrigger,
        }
    }
}

/// Summary of one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// When the tick started.
    pub started_at: DateTime<Utc>,
    /// Configurations evaluated.
    pub evaluated: usize,
    /// Positions whose threshold condition held.
    pub triggered: usize,
    /// Corrective actions that succeeded.
    pub executed: usize,
    /// Triggers held back by the retrigger policy.
    pub suppressed: usize,
    /// Failures recorded during the tick.
    pub errors: usize,
    /// Configurations skipped because an evaluation with the same id was
    /// already claimed. Ticks never overlap, so this counts ids listed more
    /// than once by the configuration source.
    pub skipped_in_flight: usize,
}

impl TickReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            evaluated: 0,
            triggered: 0,
            executed: 0,
            suppressed: 0,
            errors: 0,
            skipped_in_flight: 0,
        }
    }

    fn absorb(&mut self, outcome: ConfigOutcome) {
        self.evaluated += 1;
        self.triggered += outcome.triggered;
        self.executed += outcome.executed;
        self.suppressed += outcome.suppressed;
        self.errors += outcome.errors;
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ConfigOutcome {
    triggered: usize,
    executed: usize,
    suppressed: usize,
    errors: usize,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// Another tick holds the tick lock.
    #[error("a tick is already in progress")]
    TickInProgress,

    /// The configuration repository could not be read; the tick was skipped.
    #[error("failed to list risk configurations: {0}")]
    ConfigSource(GuardError),
}

// =============================================================================
// RiskMonitor
// =============================================================================

/// Builds a [`RiskMonitor`] from its collaborators.
pub struct RiskMonitorBuilder {
    configs: Arc<dyn ConfigRepository>,
    secrets: Arc<dyn SecretsStore>,
    sessions: Arc<dyn SessionFactory>,
    audit: Arc<dyn AuditSink>,
    settings: MonitorSettings,
    clock: Arc<dyn Clock>,
    cache: Option<Arc<FreshnessCache<MarketTick>>>,
}

impl RiskMonitorBuilder {
    #[must_use]
    pub fn new(
        configs: Arc<dyn ConfigRepository>,
        secrets: Arc<dyn SecretsStore>,
        sessions: Arc<dyn SessionFactory>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            configs,
            secrets,
            sessions,
            audit,
            settings: MonitorSettings::default(),
            clock: Arc::new(SystemClock),
            cache: None,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: MonitorSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Uses a pre-built price cache. Defaults to one with standard TTLs on the
    /// monitor's clock.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<FreshnessCache<MarketTick>>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn build(self) -> RiskMonitor {
        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(FreshnessCache::with_clock(
                CacheTtls::default(),
                self.clock.clone(),
            ))
        });

        RiskMonitor {
            inner: Arc::new(Inner {
                configs: self.configs,
                secrets: self.secrets,
                sessions: self.sessions,
                executor: ActionExecutor::new(self.audit, self.clock.clone()),
                ledger: TriggerLedger::new(self.settings.retrigger),
                health: HealthReporter::new(),
                cache,
                clock: self.clock,
                settings: self.settings,
                tick_lock: tokio::sync::Mutex::new(()),
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }
}

struct Inner {
    configs: Arc<dyn ConfigRepository>,
    secrets: Arc<dyn SecretsStore>,
    sessions: Arc<dyn SessionFactory>,
    executor: ActionExecutor,
    ledger: TriggerLedger,
    health: HealthReporter,
    cache: Arc<FreshnessCache<MarketTick>>,
    clock: Arc<dyn Clock>,
    settings: MonitorSettings,
    tick_lock: tokio::sync::Mutex<()>,
    in_flight: Mutex<HashSet<String>>,
}

/// Liquidation-distance monitor. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct RiskMonitor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RiskMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskMonitor")
            .field("settings", &self.inner.settings)
            .field("health", &self.inner.health.snapshot())
            .finish_non_exhaustive()
    }
}

/// Removes a configuration from the in-flight set when its task ends,
/// including when the task is aborted.
struct InFlightGuard {
    inner: Arc<Inner>,
    config_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight.lock().remove(&self.config_id);
    }
}

impl RiskMonitor {
    #[must_use]
    pub fn settings(&self) -> &MonitorSettings {
        &self.inner.settings
    }

    #[must_use]
    pub fn health(&self) -> HealthReporter {
        self.inner.health.clone()
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<FreshnessCache<MarketTick>> {
        &self.inner.cache
    }

    /// Runs one tick, waiting for any tick already in progress to finish.
    ///
    /// # Errors
    /// Returns [`MonitorError::ConfigSource`] if configurations cannot be listed.
    pub async fn run_tick(&self) -> Result<TickReport, MonitorError> {
        let _tick = self.inner.tick_lock.lock().await;
        self.tick().await
    }

    /// Runs one tick unless another is in progress.
    ///
    /// # Errors
    /// Returns [`MonitorError::TickInProgress`] when a tick is already running,
    /// or [`MonitorError::ConfigSource`] if configurations cannot be listed.
    pub async fn try_run_tick(&self) -> Result<TickReport, MonitorError> {
        let Ok(_tick) = self.inner.tick_lock.try_lock() else {
            return Err(MonitorError::TickInProgress);
        };
        self.tick().await
    }

    async fn tick(&self) -> Result<TickReport, MonitorError> {
        let inner = &self.inner;
        let mut report = TickReport::new(inner.clock.now());

        let configs = inner
            .configs
            .list_active_risk_configs()
            .await
            .map_err(MonitorError::ConfigSource)?;

        let mut active = Vec::with_capacity(configs.len());
        for config in configs {
            if !config.enabled {
                debug!(config_id = %config.id, "skipping disabled config");
                continue;
            }
            if let Err(e) = config.validate() {
                warn!(config_id = %config.id, kind = %e.kind(), error = %e, "skipping invalid config");
                self.record_failure(&config, None, false, &e).await;
                report.errors += 1;
                continue;
            }
            active.push(config);
        }
        let active_count = active.len();

        // Claim every id before spawning anything, so a config listed twice in
        // one listing is evaluated once no matter how fast the first copy ends.
        let mut claimed = Vec::with_capacity(active.len());
        {
            let mut in_flight = inner.in_flight.lock();
            for config in active {
                if !in_flight.insert(config.id.clone()) {
                    warn!(config_id = %config.id, "config still in flight, skipping");
                    report.skipped_in_flight += 1;
                    continue;
                }
                let guard = InFlightGuard {
                    inner: Arc::clone(inner),
                    config_id: config.id.clone(),
                };
                claimed.push((config, guard));
            }
        }

        let semaphore = Arc::new(Semaphore::new(inner.settings.max_concurrency));
        let mut tasks = JoinSet::new();

        for (config, guard) in claimed {
            let monitor = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _guard = guard;
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return ConfigOutcome::default();
                };
                monitor.evaluate_with_deadline(config).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.absorb(outcome),
                Err(e) => {
                    error!(error = %e, "config evaluation task failed");
                    report.evaluated += 1;
                    report.errors += 1;
                }
            }
        }

        let finished_at = inner.clock.now();
        inner.health.record_tick(finished_at, active_count);
        inner.ledger.prune(finished_at);

        info!(
            evaluated = report.evaluated,
            triggered = report.triggered,
            executed = report.executed,
            suppressed = report.suppressed,
            errors = report.errors,
            skipped_in_flight = report.skipped_in_flight,
            "tick complete"
        );

        Ok(report)
    }

    async fn evaluate_with_deadline(&self, config: RiskConfig) -> ConfigOutcome {
        let deadline = self.inner.settings.config_timeout;
        match tokio::time::timeout(deadline, self.evaluate_config(&config)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let err = GuardError::NetworkTimeout(format!(
                    "evaluation exceeded {}ms deadline",
                    deadline.as_millis()
                ));
                error!(config_id = %config.id, kind = %err.kind(), "config evaluation timed out");
                self.record_failure(&config, None, false, &err).await;
                ConfigOutcome {
                    errors: 1,
                    ..Default::default()
                }
            }
        }
    }

    async fn evaluate_config(&self, config: &RiskConfig) -> ConfigOutcome {
        let inner = &self.inner;
        let mut outcome = ConfigOutcome::default();

        let credentials = match inner.secrets.get_credentials(&config.user_id).await {
            Ok(credentials) => credentials,
            Err(e) => {
                self.config_error(config, &e, "failed to load credentials").await;
                outcome.errors += 1;
                return outcome;
            }
        };

        let session = match inner.sessions.open(&credentials) {
            Ok(session) => session,
            Err(e) => {
                self.config_error(config, &e, "failed to open exchange session").await;
                outcome.errors += 1;
                return outcome;
            }
        };

        let snapshot = match session.running_positions().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.config_error(config, &e, "failed to fetch positions").await;
                outcome.errors += 1;
                return outcome;
            }
        };
        for rejected in &snapshot.rejected {
            warn!(
                config_id = %config.id,
                position_id = %rejected.id,
                kind = %rejected.error.kind(),
                error = %rejected.error,
                "position rejected by exchange adapter"
            );
            self.record_failure(config, Some(rejected.id.clone()), false, &rejected.error)
                .await;
            outcome.errors += 1;
        }
        let positions = snapshot.positions;
        if positions.is_empty() {
            debug!(config_id = %config.id, "no running positions");
            return outcome;
        }

        let prices = CachedPriceProvider::new(
            Arc::clone(&inner.cache),
            Arc::clone(&session),
            credentials.network,
        );
        let tick = match prices.current_price().await {
            Ok(tick) => tick,
            Err(e) => {
                self.config_error(config, &e, "no fresh price, skipping config this tick")
                    .await;
                outcome.errors += 1;
                return outcome;
            }
        };

        for position in &positions {
            let evaluation = match evaluate(position, tick.price, config) {
                Ok(evaluation) => evaluation,
                Err(e) => {
                    warn!(
                        config_id = %config.id,
                        position_id = %position.id,
                        kind = %e.kind(),
                        error = %e,
                        "position evaluation failed"
                    );
                    self.record_failure(config, Some(position.id.clone()), false, &e)
                        .await;
                    outcome.errors += 1;
                    continue;
                }
            };

            debug!(
                config_id = %config.id,
                position_id = %position.id,
                ratio = %evaluation.ratio,
                threshold_ratio = %evaluation.threshold_ratio,
                triggered = evaluation.triggered,
                "position evaluated"
            );
            if !evaluation.triggered {
                continue;
            }
            outcome.triggered += 1;

            let now = inner.clock.now();
            if inner.ledger.should_suppress(&config.id, &position.id, now) {
                info!(
                    config_id = %config.id,
                    position_id = %position.id,
                    "trigger suppressed by retrigger cooldown"
                );
                outcome.suppressed += 1;
                continue;
            }

            let result = inner.executor.execute(config, position, session.as_ref()).await;
            if result.is_success() {
                inner.ledger.record_success(&config.id, &position.id, result.timestamp);
                outcome.executed += 1;
            } else {
                outcome.errors += 1;
            }
        }

        outcome
    }

    async fn config_error(&self, config: &RiskConfig, err: &GuardError, message: &'static str) {
        warn!(
            config_id = %config.id,
            user_id = %config.user_id,
            kind = %err.kind(),
            error = %err,
            "{message}"
        );
        self.record_failure(config, None, false, err).await;
    }

    async fn record_failure(
        &self,
        config: &RiskConfig,
        position_id: Option<String>,
        triggered: bool,
        err: &GuardError,
    ) {
        let result =
            ActionResult::failure(config, position_id, triggered, err, self.inner.clock.now());
        self.inner.executor.record(&result).await;
    }

    // =========================================================================
    // Loop
    // =========================================================================

    /// Starts the timer-driven loop on the current runtime.
    #[must_use]
    pub fn spawn(self) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let health = self.inner.health.clone();
        let grace = self.inner.settings.shutdown_grace;
        let task = tokio::spawn(self.run(shutdown_rx));

        MonitorHandle {
            shutdown_tx,
            task,
            health,
            grace,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let settings = self.inner.settings;
        info!(
            interval_secs = settings.interval.as_secs(),
            max_concurrency = settings.max_concurrency,
            retrigger = ?settings.retrigger,
            "risk monitor started"
        );
        self.inner.health.set_running(true);

        let mut interval = tokio::time::interval(settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    match self.try_run_tick().await {
                        Ok(_) => {}
                        Err(MonitorError::TickInProgress) => {
                            warn!("previous tick still running, skipping");
                        }
                        Err(e) => error!(error = %e, "tick failed"),
                    }
                }
            }
        }

        self.inner.health.set_running(false);
        info!("risk monitor stopped");
    }
}

// =============================================================================
// MonitorHandle
// =============================================================================

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The loop finished its in-flight tick and exited.
    Graceful,
    /// The grace period elapsed and the task was aborted.
    Aborted,
}

/// Control handle for a spawned [`RiskMonitor`].
pub struct MonitorHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    health: HealthReporter,
    grace: Duration,
}

impl MonitorHandle {
    #[must_use]
    pub fn health(&self) -> HealthStatus {
        self.health.snapshot()
    }

    #[must_use]
    pub fn subscribe_health(&self) -> watch::Receiver<HealthStatus> {
        self.health.subscribe()
    }

    /// Signals shutdown, waits up to the grace period for the in-flight tick,
    /// then aborts the task. No monitor task survives this call.
    pub async fn shutdown(mut self) -> ShutdownOutcome {
        let _ = self.shutdown_tx.send(true);

        match tokio::time::timeout(self.grace, &mut self.task).await {
            Ok(Ok(())) => ShutdownOutcome::Graceful,
            Ok(Err(e)) => {
                error!(error = %e, "risk monitor task failed");
                self.health.set_running(false);
                ShutdownOutcome::Aborted
            }
            Err(_) => {
                warn!(grace_secs = self.grace.as_secs(), "grace period elapsed, aborting monitor");
                self.task.abort();
                let _ = (&mut self.task).await;
                self.health.set_running(false);
                ShutdownOutcome::Aborted
            }
        }
    }
}
