//! Freshness-enforcing cache for exchange data.
//!
//! Entries are keyed by string and tagged with a [`DataClass`]; each class has
//! its own time-to-live. The market class is capped at [`MARKET_MAX_AGE`]:
//! market data older than the ceiling is never returned, whether it comes from
//! the cache or from a fresh fetch.
//!
//! There is no stale fallback. When a fetch fails or returns data that does
//! not validate, the caller gets an explicit error and the previous entry is
//! dropped.
//!
//! The cache is per process. Separate processes hold independent caches with
//! no coherency between them.
//!
//! # Example
//!
//! ```ignore
//! let cache = FreshnessCache::<MarketTick>::new(CacheTtls::default());
//! let tick = cache
//!     .get("market:btcusd", DataClass::Market, || client.ticker())
//!     .await?;
//! ```

use crate::clock::{Clock, SystemClock};
use crate::error::{GuardError, GuardResult};
use crate::types::MarketTick;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Hard freshness ceiling for market-class data.
pub const MARKET_MAX_AGE: Duration = Duration::from_secs(30);

/// Default time-to-live for historical data.
pub const DEFAULT_HISTORICAL_TTL: Duration = Duration::from_secs(600);

/// Default time-to-live for user data.
pub const DEFAULT_USER_TTL: Duration = Duration::from_secs(300);

/// Default time-to-live for system data.
pub const DEFAULT_SYSTEM_TTL: Duration = Duration::from_secs(300);

/// Default deadline for a fetch on cache miss.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Data Classes & TTLs
// =============================================================================

/// Volatility class of cached data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataClass {
    /// Prices and other volatile market data.
    Market,
    /// Historical series.
    Historical,
    /// Per-user account data.
    User,
    /// Exchange/system metadata.
    System,
}

/// Per-class time-to-live table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    market: Duration,
    historical: Duration,
    user: Duration,
    system: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            market: MARKET_MAX_AGE,
            historical: DEFAULT_HISTORICAL_TTL,
            user: DEFAULT_USER_TTL,
            system: DEFAULT_SYSTEM_TTL,
        }
    }
}

impl CacheTtls {
    /// Creates a TTL table.
    ///
    /// # Errors
    /// Returns a configuration error if the market TTL exceeds
    /// [`MARKET_MAX_AGE`] or any TTL is zero.
    pub fn new(
        market: Duration,
        historical: Duration,
        user: Duration,
        system: Duration,
    ) -> GuardResult<Self> {
        if market > MARKET_MAX_AGE {
            return Err(GuardError::Configuration(format!(
                "market ttl {}ms exceeds the {}ms ceiling",
                market.as_millis(),
                MARKET_MAX_AGE.as_millis()
            )));
        }
        for (name, ttl) in [
            ("market", market),
            ("historical", historical),
            ("user", user),
            ("system", system),
        ] {
            if ttl.is_zero() {
                return Err(GuardError::Configuration(format!(
                    "{name} ttl must be greater than zero"
                )));
            }
        }

        Ok(Self {
            market,
            historical,
            user,
            system,
        })
    }

    /// Returns the TTL for a class.
    #[must_use]
    pub const fn for_class(&self, class: DataClass) -> Duration {
        match class {
            DataClass::Market => self.market,
            DataClass::Historical => self.historical,
            DataClass::User => self.user,
            DataClass::System => self.system,
        }
    }
}

// =============================================================================
// Cache Values & Entries
// =============================================================================

/// Data that can be stored in a [`FreshnessCache`].
pub trait CacheValue: Clone + Send + Sync + 'static {
    /// When the upstream observed this value.
    fn observed_at(&self) -> Option<DateTime<Utc>>;

    /// Checks the value's shape, e.g. that numeric fields are positive.
    ///
    /// # Errors
    /// Returns a description of the first problem found.
    fn validate(&self) -> Result<(), String>;
}

impl CacheValue for MarketTick {
    fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    fn validate(&self) -> Result<(), String> {
        if self.price <= Decimal::ZERO {
            return Err(format!("non-positive price {}", self.price));
        }
        Ok(())
    }
}

/// A cached value with its fetch metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// Cached value.
    pub data: T,
    /// When the value was fetched.
    pub fetched_at: DateTime<Utc>,
    /// Time-to-live applied at insertion.
    pub ttl: Duration,
    /// Class of the value.
    pub class: DataClass,
}

impl<T> CacheEntry<T> {
    /// Returns true while `now - fetched_at < ttl`.
    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        elapsed(self.fetched_at, now) < self.ttl
    }
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    /// Requests served from the cache.
    pub hits: u64,
    /// Requests that required a fetch.
    pub misses: u64,
    /// Entries currently stored, expired or not.
    pub size: usize,
    /// `hits / (hits + misses)`, zero when idle.
    pub hit_rate: f64,
}

fn elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).to_std().unwrap_or(Duration::ZERO)
}

// =============================================================================
// FreshnessCache
// =============================================================================

/// Shared cache that refuses to serve data past its freshness window.
pub struct FreshnessCache<T: CacheValue> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
    ttls: CacheTtls,
    fetch_timeout: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: CacheValue> std::fmt::Debug for FreshnessCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreshnessCache")
            .field("ttls", &self.ttls)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("size", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T: CacheValue> FreshnessCache<T> {
    /// Creates a cache using the system clock.
    #[must_use]
    pub fn new(ttls: CacheTtls) -> Self {
        Self::with_clock(ttls, Arc::new(SystemClock))
    }

    /// Creates a cache reading time from `clock`.
    #[must_use]
    pub fn with_clock(ttls: CacheTtls, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttls,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Sets the deadline applied to fetches.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Returns the TTL table.
    #[must_use]
    pub const fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    /// Returns a fresh value for `key`, fetching it when needed.
    ///
    /// Authentication and rate-limit failures from `fetch` are returned
    /// unchanged; every other fetch failure, including the fetch timeout,
    /// becomes [`GuardError::Unavailable`].
    ///
    /// # Errors
    /// Returns `Unavailable` when no fresh value can be obtained or the
    /// fetched value fails validation, and `StaleData` when a fetched market
    /// value is already past the ceiling.
    pub async fn get<F, Fut>(&self, key: &str, class: DataClass, fetch: F) -> GuardResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GuardResult<T>>,
    {
        if let Some(data) = self.lookup(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key, "cache hit");
            return Ok(data);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // The expired entry must not survive a failed refresh.
        self.invalidate(key);

        let fetched = match tokio::time::timeout(self.fetch_timeout, fetch()).await {
            Ok(Ok(value)) => value,
            Ok(Err(err @ (GuardError::Authentication(_) | GuardError::RateLimited { .. }))) => {
                tracing::warn!(key, kind = %err.kind(), "cache fetch rejected upstream");
                return Err(err);
            }
            Ok(Err(err)) => {
                tracing::warn!(key, kind = %err.kind(), error = %err, "cache fetch failed");
                return Err(GuardError::unavailable(key, err.to_string()));
            }
            Err(_) => {
                tracing::warn!(
                    key,
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "cache fetch timed out"
                );
                return Err(GuardError::unavailable(
                    key,
                    format!("fetch timed out after {}ms", self.fetch_timeout.as_millis()),
                ));
            }
        };

        let now = self.clock.now();
        self.check_fresh(key, class, &fetched, now)?;

        let ttl = self.ttls.for_class(class);
        self.entries.write().insert(
            key.to_string(),
            CacheEntry {
                data: fetched.clone(),
                fetched_at: now,
                ttl,
                class,
            },
        );

        Ok(fetched)
    }

    /// Returns the cached value if it may still be served.
    fn lookup(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        let entries = self.entries.read();
        let entry = entries.get(key)?;

        if !entry.is_valid(now) {
            return None;
        }

        // A market value fetched late in its own life can outgrow the ceiling
        // before its entry expires.
        if entry.class == DataClass::Market {
            let observed = entry.data.observed_at()?;
            if elapsed(observed, now) >= self.ttls.for_class(DataClass::Market) {
                return None;
            }
        }

        Some(entry.data.clone())
    }

    fn check_fresh(
        &self,
        key: &str,
        class: DataClass,
        value: &T,
        now: DateTime<Utc>,
    ) -> GuardResult<()> {
        if let Err(reason) = value.validate() {
            tracing::warn!(key, %reason, "rejected invalid value");
            return Err(GuardError::unavailable(key, format!("invalid value: {reason}")));
        }

        let Some(observed) = value.observed_at() else {
            tracing::warn!(key, "rejected value without timestamp");
            return Err(GuardError::unavailable(key, "value has no timestamp"));
        };

        if class == DataClass::Market {
            let max_age = self.ttls.for_class(DataClass::Market);
            let age = elapsed(observed, now);
            if age >= max_age {
                tracing::warn!(
                    key,
                    age_ms = age.as_millis() as u64,
                    max_age_ms = max_age.as_millis() as u64,
                    "rejected stale market data"
                );
                return Err(GuardError::stale(
                    key,
                    age.as_millis() as i64,
                    max_age.as_millis() as i64,
                ));
            }
        }

        Ok(())
    }

    /// Removes one entry. Returns true if it existed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Removes every entry of a class. Returns the number removed.
    pub fn invalidate_class(&self, class: DataClass) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.class != class);
        before - entries.len()
    }

    /// Removes every entry whose key matches `pattern`. Returns the number removed.
    ///
    /// # Errors
    /// Returns a validation error if `pattern` is not a valid regex.
    pub fn invalidate_pattern(&self, pattern: &str) -> GuardResult<usize> {
        let regex = Regex::new(pattern)
            .map_err(|e| GuardError::Validation(format!("invalid pattern {pattern}: {e}")))?;
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !regex.is_match(key));
        Ok(before - entries.len())
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns hit/miss statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            size: self.len(),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}
