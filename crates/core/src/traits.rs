use crate::error::GuardResult;
use crate::types::{ActionResult, Credentials, MarketTick, PositionSnapshot, RiskConfig};
use async_trait::async_trait;
use std::sync::Arc;

/// Source of risk configurations, owned outside the guard.
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn list_active_risk_configs(&self) -> GuardResult<Vec<RiskConfig>>;
}

/// Lookup of per-user exchange credentials.
#[async_trait]
pub trait SecretsStore: Send + Sync {
    async fn get_credentials(&self, user_id: &str) -> GuardResult<Credentials>;
}

/// Destination for action records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, result: &ActionResult) -> GuardResult<()>;
}

#[async_trait]
pub trait PositionProvider: Send + Sync {
    /// Running positions; an absent position list is an empty one. Trades
    /// that cannot be converted are reported in
    /// [`PositionSnapshot::rejected`] rather than failing the call.
    async fn running_positions(&self) -> GuardResult<PositionSnapshot>;
}

#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Current index price, guaranteed fresh.
    async fn current_price(&self) -> GuardResult<MarketTick>;
}

/// Raw ticker access, without any freshness guarantee.
#[async_trait]
pub trait TickerSource: Send + Sync {
    async fn fetch_ticker(&self) -> GuardResult<MarketTick>;
}

/// Mutating calls used by corrective actions.
#[async_trait]
pub trait PositionActions: Send + Sync {
    async fn add_margin(&self, position_id: &str, amount_sats: u64) -> GuardResult<()>;
    async fn close_position(&self, position_id: &str) -> GuardResult<()>;
    async fn reduce_position(&self, position_id: &str, amount_sats: u64) -> GuardResult<()>;
}

/// Everything the monitor needs from one user's exchange connection.
pub trait ExchangeSession: PositionProvider + TickerSource + PositionActions {}

impl<T> ExchangeSession for T where T: PositionProvider + TickerSource + PositionActions {}

/// Opens per-user exchange sessions.
pub trait SessionFactory: Send + Sync {
    fn open(&self, credentials: &Credentials) -> GuardResult<Arc<dyn ExchangeSession>>;
}
