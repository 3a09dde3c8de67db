//! Fresh index price for one exchange session, served through the shared cache.

use async_trait::async_trait;
use risk_guard_core::{
    DataClass, ExchangeSession, FreshnessCache, GuardResult, MarketTick, Network, PriceProvider,
};
use std::sync::Arc;

/// [`PriceProvider`] that answers from the market-class cache and falls back
/// to the session's ticker only on a miss.
///
/// Keys are per network, so every configuration on the same network shares
/// one ticker fetch per TTL window.
pub struct CachedPriceProvider {
    cache: Arc<FreshnessCache<MarketTick>>,
    session: Arc<dyn ExchangeSession>,
    key: String,
}

impl CachedPriceProvider {
    #[must_use]
    pub fn new(
        cache: Arc<FreshnessCache<MarketTick>>,
        session: Arc<dyn ExchangeSession>,
        network: Network,
    ) -> Self {
        Self {
            cache,
            session,
            key: ticker_key(network),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl PriceProvider for CachedPriceProvider {
    async fn current_price(&self) -> GuardResult<MarketTick> {
        self.cache
            .get(&self.key, DataClass::Market, || self.session.fetch_ticker())
            .await
    }
}

/// Cache key of the ticker for `network`.
#[must_use]
pub fn ticker_key(network: Network) -> String {
    match network {
        Network::Mainnet => "ticker:mainnet".to_string(),
        Network::Testnet => "ticker:testnet".to_string(),
    }
}
