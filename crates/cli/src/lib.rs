//! Standalone runner for the position-risk guard.
//!
//! Wires file and environment adapters around [`risk_guard_monitor::RiskMonitor`]
//! and exposes the `risk-guard` subcommands.

pub mod adapters;
pub mod commands;
pub mod logging;

pub use adapters::{
    EnvSecretsStore, FanoutAuditSink, JsonFileConfigRepository, JsonlAuditSink, TracingAuditSink,
};
pub use commands::build_monitor;
