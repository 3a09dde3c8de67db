//! Loads and validates the configuration and the risk configuration file
//! without touching the exchange.

use super::load_config;
use crate::adapters::JsonFileConfigRepository;
use anyhow::{bail, Result};
use clap::Args;
use risk_guard_core::{AppConfig, ConfigRepository};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/risk-guard.toml")]
    pub config: PathBuf,

    /// Profile layered over the config file
    #[arg(long, env = "RISK_GUARD_PROFILE")]
    pub profile: Option<String>,
}

/// Outcome of checking the risk configuration file.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConfigCheck {
    pub enabled: usize,
    pub disabled: usize,
    pub invalid: Vec<String>,
}

/// Validates every risk configuration found at the configured source.
///
/// # Errors
/// Returns an error if the source cannot be read or parsed.
pub async fn check_risk_configs(config: &AppConfig) -> Result<ConfigCheck> {
    let repository = JsonFileConfigRepository::new(&config.sources.risk_configs_path);
    let configs = repository.list_active_risk_configs().await?;

    let mut check = ConfigCheck::default();
    for risk_config in &configs {
        if let Err(e) = risk_config.validate() {
            check.invalid.push(e.to_string());
        } else if risk_config.enabled {
            check.enabled += 1;
        } else {
            check.disabled += 1;
        }
    }
    Ok(check)
}

pub async fn run_check_config(args: CheckConfigArgs) -> Result<()> {
    let config = load_config(&args.config, args.profile.as_deref())?;

    println!("configuration OK: {}", args.config.display());
    println!(
        "  monitor: every {}s, {} concurrent, retrigger {:?}",
        config.monitor.interval_secs, config.monitor.max_concurrency, config.monitor.retrigger
    );
    println!(
        "  cache: market ttl {}s, fetch timeout {}s",
        config.cache.market_ttl_secs, config.cache.fetch_timeout_secs
    );
    println!(
        "  exchange: {} / {} ({} req/min)",
        config.exchange.mainnet_url, config.exchange.testnet_url, config.exchange.requests_per_minute
    );

    let check = check_risk_configs(&config).await?;
    println!(
        "  risk configs: {} enabled, {} disabled, {} invalid",
        check.enabled,
        check.disabled,
        check.invalid.len()
    );
    for problem in &check.invalid {
        println!("    - {problem}");
    }

    if !check.invalid.is_empty() {
        bail!("{} invalid risk configuration(s)", check.invalid.len());
    }
    Ok(())
}
