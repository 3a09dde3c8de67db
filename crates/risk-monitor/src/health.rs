//! Liveness snapshot of the monitor, published over a watch channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Whether the loop task is alive.
    pub is_running: bool,
    /// Completion time of the most recent tick.
    pub last_tick_at: Option<DateTime<Utc>>,
    /// Enabled, valid configurations seen by the most recent tick.
    pub active_config_count: usize,
}

/// Publishes [`HealthStatus`] updates; cheap to clone.
#[derive(Debug, Clone)]
pub struct HealthReporter {
    tx: Arc<watch::Sender<HealthStatus>>,
}

impl Default for HealthReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthReporter {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(HealthStatus::default());
        Self { tx: Arc::new(tx) }
    }

    #[must_use]
    pub fn snapshot(&self) -> HealthStatus {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.tx.subscribe()
    }

    pub fn set_running(&self, running: bool) {
        self.tx.send_modify(|status| status.is_running = running);
    }

    pub fn record_tick(&self, at: DateTime<Utc>, active_config_count: usize) {
        self.tx.send_modify(|status| {
            status.last_tick_at = Some(at);
            status.active_config_count = active_config_count;
        });
    }
}
