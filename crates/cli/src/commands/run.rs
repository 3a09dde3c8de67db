//! Long-running monitor with graceful shutdown on Ctrl-C.

use super::{build_monitor, load_config};
use anyhow::{Context, Result};
use clap::Args;
use risk_guard_monitor::ShutdownOutcome;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/risk-guard.toml")]
    pub config: PathBuf,

    /// Profile layered over the config file, e.g. `testnet` reads `risk-guard.testnet.toml`
    #[arg(long, env = "RISK_GUARD_PROFILE")]
    pub profile: Option<String>,
}

pub async fn run_monitor(args: RunArgs) -> Result<()> {
    let config = load_config(&args.config, args.profile.as_deref())?;
    tracing::info!(
        config = %args.config.display(),
        risk_configs = %config.sources.risk_configs_path,
        interval_secs = config.monitor.interval_secs,
        "starting risk guard"
    );

    let handle = build_monitor(&config)?.spawn();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested, waiting for in-flight tick");

    match handle.shutdown().await {
        ShutdownOutcome::Graceful => tracing::info!("risk guard stopped"),
        ShutdownOutcome::Aborted => tracing::warn!("risk guard aborted after grace period"),
    }
    Ok(())
}
