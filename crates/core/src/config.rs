use crate::cache::{
    CacheTtls, DEFAULT_FETCH_TIMEOUT, DEFAULT_HISTORICAL_TTL, DEFAULT_SYSTEM_TTL,
    DEFAULT_USER_TTL, MARKET_MAX_AGE,
};
use crate::error::{GuardError, GuardResult};
use crate::types::Network;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub cache: CacheConfig,
    pub monitor: MonitorConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub mainnet_url: String,
    pub testnet_url: String,
    pub api_prefix: String,
    pub timeout_secs: u64,
    pub requests_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub market_ttl_secs: u64,
    pub historical_ttl_secs: u64,
    pub user_ttl_secs: u64,
    pub system_ttl_secs: u64,
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    pub max_concurrency: usize,
    pub config_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub retrigger: RetriggerPolicy,
}

/// What happens when a position stays past its threshold across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetriggerPolicy {
    /// Act on every tick the condition holds.
    EveryTick,
    /// After a successful action, suppress further actions on the same
    /// position for `seconds`.
    Cooldown { seconds: u64 },
}

impl Default for RetriggerPolicy {
    fn default() -> Self {
        Self::Cooldown { seconds: 300 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub risk_configs_path: String,
    pub audit_log_path: Option<String>,
    pub credentials_env_prefix: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            mainnet_url: "https://api.lnmarkets.com".to_string(),
            testnet_url: "https://api.testnet4.lnmarkets.com".to_string(),
            api_prefix: "/v2".to_string(),
            timeout_secs: 15,
            requests_per_minute: 60,
        }
    }
}

impl ExchangeConfig {
    #[must_use]
    pub fn base_url(&self, network: Network) -> &str {
        match network {
            Network::Mainnet => &self.mainnet_url,
            Network::Testnet => &self.testnet_url,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            market_ttl_secs: MARKET_MAX_AGE.as_secs(),
            historical_ttl_secs: DEFAULT_HISTORICAL_TTL.as_secs(),
            user_ttl_secs: DEFAULT_USER_TTL.as_secs(),
            system_ttl_secs: DEFAULT_SYSTEM_TTL.as_secs(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
        }
    }
}

impl CacheConfig {
    /// Builds the TTL table, enforcing the market ceiling.
    ///
    /// # Errors
    /// Returns a configuration error for a market TTL above 30s or a zero TTL.
    pub fn ttls(&self) -> GuardResult<CacheTtls> {
        CacheTtls::new(
            Duration::from_secs(self.market_ttl_secs),
            Duration::from_secs(self.historical_ttl_secs),
            Duration::from_secs(self.user_ttl_secs),
            Duration::from_secs(self.system_ttl_secs),
        )
    }

    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 20,
            max_concurrency: 4,
            config_timeout_secs: 30,
            shutdown_grace_secs: 30,
            retrigger: RetriggerPolicy::default(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            risk_configs_path: "config/risk_configs.json".to_string(),
            audit_log_path: None,
            credentials_env_prefix: "RISK_GUARD_CREDS".to_string(),
        }
    }
}

impl AppConfig {
    /// Checks cross-field constraints serde cannot express.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(&self) -> GuardResult<()> {
        self.cache.ttls()?;

        let checks = [
            (self.exchange.timeout_secs == 0, "exchange.timeout_secs must be > 0"),
            (
                self.exchange.requests_per_minute == 0,
                "exchange.requests_per_minute must be > 0",
            ),
            (self.cache.fetch_timeout_secs == 0, "cache.fetch_timeout_secs must be > 0"),
            (self.monitor.interval_secs == 0, "monitor.interval_secs must be > 0"),
            (self.monitor.max_concurrency == 0, "monitor.max_concurrency must be > 0"),
            (
                self.monitor.config_timeout_secs == 0,
                "monitor.config_timeout_secs must be > 0",
            ),
        ];
        if let Some((_, message)) = checks.iter().find(|(failed, _)| *failed) {
            return Err(GuardError::Configuration((*message).to_string()));
        }

        Ok(())
    }
}
