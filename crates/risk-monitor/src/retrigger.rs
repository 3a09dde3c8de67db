//! Suppression of repeated corrective actions on the same position.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use risk_guard_core::RetriggerPolicy;
use std::collections::HashMap;

type LedgerKey = (String, String);

/// Remembers successful actions per (config, position) pair.
///
/// Only successful actions arm the ledger; a failed action leaves the
/// position eligible on the next tick.
#[derive(Debug)]
pub struct TriggerLedger {
    policy: RetriggerPolicy,
    last_success: Mutex<HashMap<LedgerKey, DateTime<Utc>>>,
}

impl TriggerLedger {
    #[must_use]
    pub fn new(policy: RetriggerPolicy) -> Self {
        Self {
            policy,
            last_success: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> RetriggerPolicy {
        self.policy
    }

    /// Returns true if an action on this position must be held back at `now`.
    pub fn should_suppress(&self, config_id: &str, position_id: &str, now: DateTime<Utc>) -> bool {
        let RetriggerPolicy::Cooldown { seconds } = self.policy else {
            return false;
        };

        let key = (config_id.to_string(), position_id.to_string());
        self.last_success
            .lock()
            .get(&key)
            .is_some_and(|at| now - *at < cooldown(seconds))
    }

    /// Arms the cooldown for a position after a successful action.
    pub fn record_success(&self, config_id: &str, position_id: &str, at: DateTime<Utc>) {
        if matches!(self.policy, RetriggerPolicy::EveryTick) {
            return;
        }
        self.last_success
            .lock()
            .insert((config_id.to_string(), position_id.to_string()), at);
    }

    /// Drops entries whose cooldown has elapsed. Returns how many were removed.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let RetriggerPolicy::Cooldown { seconds } = self.policy else {
            return 0;
        };

        let mut entries = self.last_success.lock();
        let before = entries.len();
        entries.retain(|_, at| now - *at < cooldown(seconds));
        before - entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.last_success.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cooldown(seconds: u64) -> Duration {
    let seconds = i64::try_from(seconds).unwrap_or(i64::MAX).min(i64::MAX / 1000);
    Duration::seconds(seconds)
}
