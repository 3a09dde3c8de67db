//! One-shot evaluation of every active configuration.

use super::{build_monitor, load_config};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct TickArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/risk-guard.toml")]
    pub config: PathBuf,

    /// Profile layered over the config file
    #[arg(long, env = "RISK_GUARD_PROFILE")]
    pub profile: Option<String>,
}

/// Runs a single tick and prints its report as JSON on stdout.
pub async fn run_tick(args: TickArgs) -> Result<()> {
    let config = load_config(&args.config, args.profile.as_deref())?;
    let monitor = build_monitor(&config)?;

    let report = monitor.run_tick().await.context("tick failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
