//! Core building blocks of the position-risk guard: domain types, the
//! freshness cache, collaborator traits and configuration.

pub mod cache;
pub mod clock;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod traits;
pub mod types;

pub use cache::{CacheStats, CacheTtls, CacheValue, DataClass, FreshnessCache, MARKET_MAX_AGE};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AppConfig, CacheConfig, ExchangeConfig, MonitorConfig, RetriggerPolicy, SourcesConfig,
};
pub use config_loader::ConfigLoader;
pub use error::{ErrorKind, GuardError, GuardResult};
pub use traits::{
    AuditSink, ConfigRepository, ExchangeSession, PositionActions, PositionProvider,
    PriceProvider, SecretsStore, SessionFactory, TickerSource,
};
pub use types::{
    ActionResult, ActionStatus, Credentials, MarketTick, Network, Position, PositionSnapshot,
    RejectedPosition, RiskAction, RiskConfig, Side,
};
