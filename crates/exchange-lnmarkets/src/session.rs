//! Per-user exchange sessions exposing the guard's capability traits.

use crate::client::{
    http_client, rate_limiter, LnMarketsClient, LnMarketsClientConfig, SharedRateLimiter,
};
use crate::error::Result;
use crate::types::TradeStatus;
use crate::LnMarketsSigner;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use risk_guard_core::{
    Credentials, ExchangeConfig, ExchangeSession, GuardError, GuardResult, MarketTick, Network,
    PositionActions, PositionProvider, PositionSnapshot, RejectedPosition, SessionFactory,
    TickerSource,
};
use std::collections::HashMap;
use std::sync::Arc;

/// One user's authenticated connection to LN Markets.
#[derive(Debug)]
pub struct LnMarketsSession {
    client: LnMarketsClient,
}

impl LnMarketsSession {
    #[must_use]
    pub fn new(client: LnMarketsClient) -> Self {
        Self { client }
    }

    /// Underlying client, for calls outside the guard's capability traits.
    #[must_use]
    pub fn client(&self) -> &LnMarketsClient {
        &self.client
    }
}

#[async_trait]
impl PositionProvider for LnMarketsSession {
    async fn running_positions(&self) -> GuardResult<PositionSnapshot> {
        let trades = self.client.get_positions(TradeStatus::Running).await?;

        let mut snapshot = PositionSnapshot::default();
        for trade in &trades {
            match trade.to_position() {
                Ok(position) => snapshot.positions.push(position),
                Err(e) => {
                    tracing::warn!(trade_id = %trade.id, error = %e, "skipping unusable trade");
                    snapshot.rejected.push(RejectedPosition {
                        id: trade.id.clone(),
                        error: GuardError::from(e),
                    });
                }
            }
        }
        Ok(snapshot)
    }
}

#[async_trait]
impl TickerSource for LnMarketsSession {
    async fn fetch_ticker(&self) -> GuardResult<MarketTick> {
        Ok(self.client.get_ticker().await?.to_market_tick())
    }
}

#[async_trait]
impl PositionActions for LnMarketsSession {
    async fn add_margin(&self, position_id: &str, amount_sats: u64) -> GuardResult<()> {
        self.client.add_margin(position_id, amount_sats).await?;
        Ok(())
    }

    async fn close_position(&self, position_id: &str) -> GuardResult<()> {
        self.client.close_position(position_id).await?;
        Ok(())
    }

    async fn reduce_position(&self, position_id: &str, amount_sats: u64) -> GuardResult<()> {
        self.client.reduce_position(position_id, amount_sats).await?;
        Ok(())
    }
}

/// Opens LN Markets sessions on the credential's network.
///
/// Sessions share one HTTP connection pool, and every session of the same
/// account on the same network draws from one request quota, so the limit
/// holds across ticks.
pub struct LnMarketsSessionFactory {
    exchange: ExchangeConfig,
    http: Client,
    limiters: Mutex<HashMap<(Network, String), SharedRateLimiter>>,
}

impl std::fmt::Debug for LnMarketsSessionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LnMarketsSessionFactory")
            .field("exchange", &self.exchange)
            .field("accounts", &self.limiters.lock().len())
            .finish_non_exhaustive()
    }
}

impl LnMarketsSessionFactory {
    /// Creates a factory for the given exchange settings.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(exchange: ExchangeConfig) -> Result<Self> {
        let http = http_client(exchange.timeout_secs)?;
        Ok(Self {
            exchange,
            http,
            limiters: Mutex::new(HashMap::new()),
        })
    }

    fn limiter_for(
        &self,
        config: &LnMarketsClientConfig,
        credentials: &Credentials,
    ) -> SharedRateLimiter {
        self.limiters
            .lock()
            .entry((credentials.network, credentials.api_key.clone()))
            .or_insert_with(|| rate_limiter(config.requests_per_minute))
            .clone()
    }
}

impl SessionFactory for LnMarketsSessionFactory {
    fn open(&self, credentials: &Credentials) -> GuardResult<Arc<dyn ExchangeSession>> {
        let config =
            LnMarketsClientConfig::from_exchange_config(&self.exchange, credentials.network)?;
        let signer = LnMarketsSigner::from_credentials(credentials)?;
        let limiter = self.limiter_for(&config, credentials);
        let client = LnMarketsClient::with_transport(config, signer, self.http.clone(), limiter);
        tracing::debug!(
            network = ?credentials.network,
            base_url = client.base_url(),
            "opened exchange session"
        );
        Ok(Arc::new(LnMarketsSession::new(client)))
    }
}
