//! Liquidation-distance monitoring for leveraged futures positions.
//!
//! [`RiskMonitor`] periodically evaluates every active risk configuration:
//! it fetches the user's running positions, obtains a fresh index price
//! through the shared [`FreshnessCache`](risk_guard_core::FreshnessCache),
//! and when the distance to liquidation has shrunk past the configured
//! threshold hands the position to the [`ActionExecutor`].
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use risk_guard_core::{AuditSink, ConfigRepository, SecretsStore, SessionFactory};
//! # use risk_guard_monitor::{MonitorSettings, RiskMonitorBuilder};
//! # async fn demo(
//! #     configs: Arc<dyn ConfigRepository>,
//! #     secrets: Arc<dyn SecretsStore>,
//! #     sessions: Arc<dyn SessionFactory>,
//! #     audit: Arc<dyn AuditSink>,
//! # ) {
//! let handle = RiskMonitorBuilder::new(configs, secrets, sessions, audit)
//!     .with_settings(MonitorSettings::default())
//!     .build()
//!     .spawn();
//!
//! // ...
//! handle.shutdown().await;
//! # }
//! ```

pub mod evaluation;
pub mod executor;
pub mod health;
pub mod monitor;
pub mod price;
pub mod retrigger;

#[cfg(test)]
mod test_support;

pub use evaluation::{evaluate, Evaluation};
pub use executor::{action_amount, ActionExecutor};
pub use health::{HealthReporter, HealthStatus};
pub use monitor::{
    MonitorError, MonitorHandle, MonitorSettings, RiskMonitor, RiskMonitorBuilder,
    ShutdownOutcome, TickReport,
};
pub use price::{ticker_key, CachedPriceProvider};
pub use retrigger::TriggerLedger;
