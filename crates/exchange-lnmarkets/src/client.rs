//! LN Markets REST API client with rate limiting.
//!
//! Every request is signed, rate-limited with the governor crate and bounded
//! by the HTTP timeout. Each call emits exactly one tracing event carrying the
//! method, path, latency and outcome; no payloads or secrets are logged.
//!
//! # Example
//!
//! ```ignore
//! use risk_guard_lnmarkets::{LnMarketsClient, LnMarketsClientConfig};
//! use risk_guard_core::{Credentials, Network};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let credentials = Credentials::new("key", "secret", "passphrase", Network::Testnet);
//!     let client = LnMarketsClient::from_credentials(LnMarketsClientConfig::testnet(), &credentials)?;
//!
//!     let ticker = client.get_ticker().await?;
//!     println!("Index: {}", ticker.index);
//!
//!     Ok(())
//! }
//! ```

use crate::auth::LnMarketsSigner;
use crate::error::{LnMarketsError, Result};
use crate::types::{
    AmountRequest, Balance, NewTrade, Ticker, Trade, TradeFilter, TradeList, TradeStatus,
    TradeUpdate, User,
};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, Method};
use risk_guard_core::{Credentials, ExchangeConfig, Network};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

// =============================================================================
// Constants
// =============================================================================

/// LN Markets production API base URL.
pub const LNMARKETS_MAINNET_URL: &str = "https://api.lnmarkets.com";

/// LN Markets test network API base URL.
pub const LNMARKETS_TESTNET_URL: &str = "https://api.testnet4.lnmarkets.com";

/// API version prefix, part of every signed path.
pub const API_PREFIX: &str = "/v2";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the LN Markets client.
#[derive(Debug, Clone)]
pub struct LnMarketsClientConfig {
    /// Base URL for the API, without the version prefix.
    pub base_url: String,

    /// Version prefix prepended to every path.
    pub api_prefix: String,

    /// Requests per minute limit.
    pub requests_per_minute: NonZeroU32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LnMarketsClientConfig {
    fn default() -> Self {
        Self {
            base_url: LNMARKETS_MAINNET_URL.to_string(),
            api_prefix: API_PREFIX.to_string(),
            requests_per_minute: nonzero!(60u32),
            timeout_secs: 15,
        }
    }
}

impl LnMarketsClientConfig {
    /// Creates a configuration for mainnet.
    #[must_use]
    pub fn mainnet() -> Self {
        Self::default()
    }

    /// Creates a configuration for testnet.
    #[must_use]
    pub fn testnet() -> Self {
        Self {
            base_url: LNMARKETS_TESTNET_URL.to_string(),
            ..Default::default()
        }
    }

    /// Builds a configuration from application settings for a network.
    ///
    /// # Errors
    /// Returns error if the configured rate limit is zero.
    pub fn from_exchange_config(exchange: &ExchangeConfig, network: Network) -> Result<Self> {
        let requests_per_minute = NonZeroU32::new(exchange.requests_per_minute).ok_or_else(|| {
            LnMarketsError::Configuration("requests_per_minute must be > 0".to_string())
        })?;

        Ok(Self {
            base_url: exchange.base_url(network).to_string(),
            api_prefix: exchange.api_prefix.clone(),
            requests_per_minute,
            timeout_secs: exchange.timeout_secs,
        })
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the rate limit.
    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_minute: NonZeroU32) -> Self {
        self.requests_per_minute = requests_per_minute;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

// =============================================================================
// LnMarketsClient
// =============================================================================

/// Request quota that can be shared between clients.
pub type SharedRateLimiter = Arc<
    RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
>;

/// Creates a limiter allowing `requests_per_minute` requests.
#[must_use]
pub fn rate_limiter(requests_per_minute: NonZeroU32) -> SharedRateLimiter {
    Arc::new(RateLimiter::direct(Quota::per_minute(requests_per_minute)))
}

/// Builds the HTTP client used for LN Markets calls.
///
/// # Errors
/// Returns error if the TLS backend cannot be initialized.
pub fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LnMarketsError::Network(format!("failed to build HTTP client: {e}")))
}

/// LN Markets REST API client.
///
/// Errors are classified and returned; nothing is retried internally.
pub struct LnMarketsClient {
    /// Configuration.
    config: LnMarketsClientConfig,

    /// HTTP client.
    http: Client,

    /// Rate limiter, possibly shared with other clients of the same account.
    rate_limiter: SharedRateLimiter,

    /// Request signer.
    signer: LnMarketsSigner,
}

impl std::fmt::Debug for LnMarketsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LnMarketsClient")
            .field("base_url", &self.config.base_url)
            .field("requests_per_minute", &self.config.requests_per_minute)
            .finish_non_exhaustive()
    }
}

impl LnMarketsClient {
    /// Creates a new client with the given configuration and signer.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: LnMarketsClientConfig, signer: LnMarketsSigner) -> Result<Self> {
        let http = http_client(config.timeout_secs)?;
        let limiter = rate_limiter(config.requests_per_minute);
        Ok(Self::with_transport(config, signer, http, limiter))
    }

    /// Creates a client on an existing HTTP client and request quota.
    ///
    /// The quota is consumed by every client holding it; the client's own
    /// `requests_per_minute` is ignored.
    #[must_use]
    pub fn with_transport(
        config: LnMarketsClientConfig,
        signer: LnMarketsSigner,
        http: Client,
        rate_limiter: SharedRateLimiter,
    ) -> Self {
        Self {
            config,
            http,
            rate_limiter,
            signer,
        }
    }

    /// Creates a client for a user's credentials.
    ///
    /// # Errors
    /// Returns error if the credentials are unusable or the HTTP client cannot be built.
    pub fn from_credentials(
        config: LnMarketsClientConfig,
        credentials: &Credentials,
    ) -> Result<Self> {
        Self::new(config, LnMarketsSigner::from_credentials(credentials)?)
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Validates an identifier (trade id, etc.) to prevent path traversal attacks.
    fn validate_identifier(id: &str) -> Result<&str> {
        if id.contains("..") || id.contains('/') || id.contains('\\') {
            return Err(LnMarketsError::InvalidRequest(format!(
                "invalid identifier: contains forbidden characters: {id}"
            )));
        }

        if id.is_empty() {
            return Err(LnMarketsError::InvalidRequest(
                "identifier cannot be empty".to_string(),
            ));
        }

        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(LnMarketsError::InvalidRequest(format!(
                "invalid identifier: must contain only alphanumeric, hyphen, or underscore: {id}"
            )));
        }

        if id.len() > 128 {
            return Err(LnMarketsError::InvalidRequest(format!(
                "invalid identifier: exceeds maximum length of 128: {}",
                id.len()
            )));
        }

        Ok(id)
    }

    /// Sends a signed request and logs one event for it.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &str,
        body: Option<String>,
    ) -> Result<T> {
        let started = Instant::now();
        let result = self.send(&method, path, query, body).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(_) => tracing::debug!(
                method = %method,
                path,
                latency_ms,
                outcome = "ok",
                "exchange call"
            ),
            Err(e) => tracing::warn!(
                method = %method,
                path,
                latency_ms,
                outcome = e.outcome(),
                "exchange call failed"
            ),
        }

        result
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &Method,
        path: &str,
        query: &str,
        body: Option<String>,
    ) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let signed_path = format!("{}{}", self.config.api_prefix, path);
        let body = body.unwrap_or_default();
        let headers = self
            .signer
            .sign(method.as_str(), &signed_path, query, &body)?;

        let mut url = format!("{}{}", self.config.base_url, signed_path);
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }

        let mut request = self
            .http
            .request(method.clone(), &url)
            .header("Accept", "application/json");
        for (name, value) in headers.as_tuples() {
            request = request.header(name, value);
        }
        if *method == Method::POST || *method == Method::PUT {
            request = request.header("Content-Type", "application/json").body(body);
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Handles API response, converting errors appropriately.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(LnMarketsError::rate_limit(retry_after));
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LnMarketsError::from_status(status.as_u16(), text));
        }

        let text = response.text().await?;
        let text = if text.trim().is_empty() { "null" } else { &text };
        Ok(serde_json::from_str(text)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &str) -> Result<T> {
        self.request(Method::GET, path, query, None).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let body = serde_json::to_string(body)?;
        self.request(Method::POST, path, "", Some(body)).await
    }

    async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let body = serde_json::to_string(body)?;
        self.request(Method::PUT, path, "", Some(body)).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str, query: &str) -> Result<T> {
        self.request(Method::DELETE, path, query, None).await
    }

    // =========================================================================
    // Account Endpoints
    // =========================================================================

    /// Gets the account summary.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn get_user(&self) -> Result<User> {
        self.get("/user", "").await
    }

    /// Gets the account balance.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn get_balance(&self) -> Result<Balance> {
        let user = self.get_user().await?;
        Ok(Balance::from(&user))
    }

    // =========================================================================
    // Futures Endpoints
    // =========================================================================

    /// Gets trades in the given lifecycle state.
    ///
    /// A 404 from this endpoint means the account has no such trades.
    ///
    /// # Errors
    /// Returns error if the API call fails for any other reason.
    pub async fn get_positions(&self, status: TradeStatus) -> Result<Vec<Trade>> {
        let query = serde_urlencoded::to_string(&[("type", status.as_str())])?;

        match self.get::<TradeList>("/futures", &query).await {
            Ok(list) => Ok(list.into_vec()),
            Err(LnMarketsError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Gets trade history.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn get_trades(&self, filter: &TradeFilter) -> Result<Vec<Trade>> {
        let query = serde_urlencoded::to_string(filter)?;
        let list: TradeList = self.get("/futures/trades", &query).await?;
        Ok(list.into_vec())
    }

    /// Gets the futures market snapshot.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn get_ticker(&self) -> Result<Ticker> {
        self.get("/futures/market", "").await
    }

    /// Adds margin to a running trade.
    ///
    /// # Errors
    /// Returns error if the identifier is invalid or the API call fails.
    pub async fn add_margin(&self, trade_id: &str, amount_sats: u64) -> Result<Trade> {
        let id = Self::validate_identifier(trade_id)?;
        self.post(
            "/futures/add-margin",
            &AmountRequest {
                id,
                amount: amount_sats,
            },
        )
        .await
    }

    /// Closes a single trade.
    ///
    /// # Errors
    /// Returns error if the identifier is invalid or the API call fails.
    pub async fn close_position(&self, trade_id: &str) -> Result<Trade> {
        let id = Self::validate_identifier(trade_id)?;
        let query = serde_urlencoded::to_string(&[("id", id)])?;
        self.delete("/futures", &query).await
    }

    /// Withdraws `amount_sats` from a running trade, reducing its exposure.
    ///
    /// # Errors
    /// Returns error if the identifier is invalid or the API call fails.
    pub async fn reduce_position(&self, trade_id: &str, amount_sats: u64) -> Result<Trade> {
        let id = Self::validate_identifier(trade_id)?;
        self.post(
            "/futures/cash-in",
            &AmountRequest {
                id,
                amount: amount_sats,
            },
        )
        .await
    }

    /// Closes every running trade.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn close_all_trades(&self) -> Result<Vec<Trade>> {
        let list: TradeList = self
            .post("/futures/close-all-trades", &serde_json::json!({}))
            .await?;
        Ok(list.into_vec())
    }

    /// Cancels every open limit order.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn cancel_all_trades(&self) -> Result<Vec<Trade>> {
        let list: TradeList = self
            .post("/futures/cancel-all-trades", &serde_json::json!({}))
            .await?;
        Ok(list.into_vec())
    }

    /// Updates stop-loss, take-profit or leverage of a trade.
    ///
    /// # Errors
    /// Returns error if the update is empty, the identifier is invalid or the API call fails.
    pub async fn update_trade(&self, trade_id: &str, update: &TradeUpdate) -> Result<Trade> {
        if update.is_empty() {
            return Err(LnMarketsError::InvalidRequest(
                "trade update sets no field".to_string(),
            ));
        }
        let id = Self::validate_identifier(trade_id)?;
        self.put(&format!("/futures/trades/{id}"), update).await
    }

    /// Opens a new trade.
    ///
    /// # Errors
    /// Returns error if the order is invalid or the API call fails.
    pub async fn create_trade(&self, order: &NewTrade) -> Result<Trade> {
        order.validate()?;
        self.post("/futures/trades", order).await
    }
}
