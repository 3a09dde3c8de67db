//! `risk-guard` subcommands.

pub mod check_config;
pub mod run;
pub mod sign;
pub mod tick;

pub use check_config::{run_check_config, CheckConfigArgs};
pub use run::{run_monitor, RunArgs};
pub use sign::{run_sign, SignArgs};
pub use tick::{run_tick, TickArgs};

use crate::adapters::{
    EnvSecretsStore, FanoutAuditSink, JsonFileConfigRepository, JsonlAuditSink, TracingAuditSink,
};
use anyhow::{Context, Result};
use risk_guard_core::{AppConfig, AuditSink, ConfigLoader, FreshnessCache};
use risk_guard_lnmarkets::LnMarketsSessionFactory;
use risk_guard_monitor::{MonitorSettings, RiskMonitor, RiskMonitorBuilder};
use std::path::Path;
use std::sync::Arc;

/// Loads the application configuration, layering `profile` when given.
///
/// # Errors
/// Returns an error if the configuration cannot be parsed or fails validation.
pub fn load_config(path: &Path, profile: Option<&str>) -> Result<AppConfig> {
    match profile {
        Some(profile) => ConfigLoader::load_with_profile(path, profile),
        None => ConfigLoader::load(path),
    }
}

/// Wires the file/env adapters and the LN Markets session factory into a monitor.
///
/// # Errors
/// Returns an error if the cache TTLs are invalid or the HTTP client cannot
/// be built.
pub fn build_monitor(config: &AppConfig) -> Result<RiskMonitor> {
    let ttls = config.cache.ttls().context("invalid cache TTLs")?;
    let cache =
        Arc::new(FreshnessCache::new(ttls).with_fetch_timeout(config.cache.fetch_timeout()));

    let mut sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(TracingAuditSink)];
    if let Some(path) = &config.sources.audit_log_path {
        sinks.push(Arc::new(JsonlAuditSink::new(path)));
    }

    let sessions = LnMarketsSessionFactory::new(config.exchange.clone())
        .context("failed to build exchange session factory")?;

    let monitor = RiskMonitorBuilder::new(
        Arc::new(JsonFileConfigRepository::new(&config.sources.risk_configs_path)),
        Arc::new(EnvSecretsStore::new(config.sources.credentials_env_prefix.clone())),
        Arc::new(sessions),
        Arc::new(FanoutAuditSink::new(sinks)),
    )
    .with_settings(MonitorSettings::from(&config.monitor))
    .with_cache(cache)
    .build();

    Ok(monitor)
}
