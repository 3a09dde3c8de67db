//! In-memory collaborators for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use risk_guard_core::{
    ActionResult, AuditSink, ConfigRepository, Credentials, ExchangeSession, GuardError,
    GuardResult, MarketTick, Network, Position, PositionActions, PositionProvider, PositionSnapshot,
    RejectedPosition, RiskAction, RiskConfig, SecretsStore, SessionFactory, Side, TickerSource,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn config(id: &str, user_id: &str, action: RiskAction) -> RiskConfig {
    RiskConfig {
        id: id.to_string(),
        user_id: user_id.to_string(),
        enabled: true,
        threshold_pct: Decimal::from(25),
        action,
        action_param_pct: Decimal::from(20),
    }
}

pub fn position(id: &str, entry: i64, liquidation: i64, margin: u64) -> Position {
    Position {
        id: id.to_string(),
        entry_price: Decimal::from(entry),
        liquidation_price: Decimal::from(liquidation),
        margin,
        side: if liquidation < entry { Side::Long } else { Side::Short },
    }
}

// =============================================================================
// Collaborators
// =============================================================================

#[derive(Default)]
pub struct StaticConfigs {
    pub configs: Mutex<Vec<RiskConfig>>,
    pub fail: Mutex<Option<GuardError>>,
}

impl StaticConfigs {
    pub fn new(configs: Vec<RiskConfig>) -> Self {
        Self {
            configs: Mutex::new(configs),
            fail: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ConfigRepository for StaticConfigs {
    async fn list_active_risk_configs(&self) -> GuardResult<Vec<RiskConfig>> {
        if let Some(err) = self.fail.lock().clone() {
            return Err(err);
        }
        Ok(self.configs.lock().clone())
    }
}

/// Hands out credentials whose api key is the user id.
#[derive(Default)]
pub struct StaticSecrets {
    pub missing: Mutex<Vec<String>>,
}

#[async_trait]
impl SecretsStore for StaticSecrets {
    async fn get_credentials(&self, user_id: &str) -> GuardResult<Credentials> {
        if self.missing.lock().iter().any(|u| u == user_id) {
            return Err(GuardError::credentials(user_id, "no credentials stored"));
        }
        Ok(Credentials::new(user_id, "secret", "pass", Network::Testnet))
    }
}

#[derive(Default)]
pub struct RecordingAudit {
    pub records: Mutex<Vec<ActionResult>>,
    pub fail: Mutex<bool>,
}

impl RecordingAudit {
    pub fn records(&self) -> Vec<ActionResult> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn record(&self, result: &ActionResult) -> GuardResult<()> {
        if *self.fail.lock() {
            return Err(GuardError::Configuration("audit sink offline".to_string()));
        }
        self.records.lock().push(result.clone());
        Ok(())
    }
}

// =============================================================================
// Exchange
// =============================================================================

/// Mutating call observed by a fake session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AddMargin(String, u64),
    Close(String),
    Reduce(String, u64),
}

/// Scripted exchange shared by every session of one user.
pub struct FakeExchange {
    pub positions: Mutex<GuardResult<Vec<Position>>>,
    pub rejected: Mutex<Vec<RejectedPosition>>,
    pub price: Mutex<Decimal>,
    pub price_time: Mutex<Option<DateTime<Utc>>>,
    pub ticker_error: Mutex<Option<GuardError>>,
    pub action_error: Mutex<Option<GuardError>>,
    pub calls: Mutex<Vec<Call>>,
    pub ticker_fetches: AtomicUsize,
    pub position_delay: Mutex<Option<std::time::Duration>>,
    /// Position fetches currently running, and the most seen at once.
    pub active_fetches: AtomicUsize,
    pub peak_fetches: AtomicUsize,
}

impl FakeExchange {
    pub fn new(positions: Vec<Position>, price: i64, price_time: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            positions: Mutex::new(Ok(positions)),
            rejected: Mutex::new(Vec::new()),
            price: Mutex::new(Decimal::from(price)),
            price_time: Mutex::new(Some(price_time)),
            ticker_error: Mutex::new(None),
            action_error: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            ticker_fetches: AtomicUsize::new(0),
            position_delay: Mutex::new(None),
            active_fetches: AtomicUsize::new(0),
            peak_fetches: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn act(&self, call: Call) -> GuardResult<()> {
        if let Some(err) = self.action_error.lock().clone() {
            return Err(err);
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl PositionProvider for FakeExchange {
    async fn running_positions(&self) -> GuardResult<PositionSnapshot> {
        let active = self.active_fetches.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_fetches.fetch_max(active, Ordering::SeqCst);

        let delay = *self.position_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.active_fetches.fetch_sub(1, Ordering::SeqCst);

        let positions = self.positions.lock().clone()?;
        Ok(PositionSnapshot {
            positions,
            rejected: self.rejected.lock().clone(),
        })
    }
}

#[async_trait]
impl TickerSource for FakeExchange {
    async fn fetch_ticker(&self) -> GuardResult<MarketTick> {
        self.ticker_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.ticker_error.lock().clone() {
            return Err(err);
        }
        Ok(MarketTick {
            price: *self.price.lock(),
            timestamp: *self.price_time.lock(),
            source: "fake".to_string(),
        })
    }
}

#[async_trait]
impl PositionActions for FakeExchange {
    async fn add_margin(&self, position_id: &str, amount_sats: u64) -> GuardResult<()> {
        self.act(Call::AddMargin(position_id.to_string(), amount_sats))
    }

    async fn close_position(&self, position_id: &str) -> GuardResult<()> {
        self.act(Call::Close(position_id.to_string()))
    }

    async fn reduce_position(&self, position_id: &str, amount_sats: u64) -> GuardResult<()> {
        self.act(Call::Reduce(position_id.to_string(), amount_sats))
    }
}

/// Routes sessions to per-user fake exchanges by api key.
#[derive(Default)]
pub struct FakeSessions {
    pub exchanges: Mutex<HashMap<String, Arc<FakeExchange>>>,
}

impl FakeSessions {
    pub fn with(self, user_id: &str, exchange: Arc<FakeExchange>) -> Self {
        self.exchanges.lock().insert(user_id.to_string(), exchange);
        self
    }
}

impl SessionFactory for FakeSessions {
    fn open(&self, credentials: &Credentials) -> GuardResult<Arc<dyn ExchangeSession>> {
        let exchange = self
            .exchanges
            .lock()
            .get(&credentials.api_key)
            .cloned()
            .ok_or_else(|| GuardError::Authentication("unknown api key".to_string()))?;
        Ok(exchange)
    }
}
