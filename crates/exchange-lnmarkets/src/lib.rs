//! LN Markets futures integration for the position-risk guard.
//!
//! This crate provides:
//! - HMAC-SHA256 request signing
//! - REST client with rate limiting for the futures API
//! - Data models for trades, the account and the market ticker
//! - Per-user sessions implementing the guard's capability traits
//!
//! # Authentication
//!
//! Every request carries `ACCESS-KEY`, `ACCESS-SIGNATURE`,
//! `ACCESS-PASSPHRASE` and `ACCESS-TIMESTAMP`. See [`auth`] for the signed
//! payload.
//!
//! # API Endpoints
//!
//! - `GET /user` - Account summary and balance
//! - `GET /futures?type=` - Trades by state (404 means none)
//! - `GET /futures/trades` - Trade history
//! - `GET /futures/market` - Market snapshot
//! - `POST /futures/add-margin` - Add margin
//! - `POST /futures/cash-in` - Reduce a position
//! - `DELETE /futures?id=` - Close one trade
//! - `POST /futures/close-all-trades` - Close every running trade
//! - `POST /futures/cancel-all-trades` - Cancel every open order
//! - `PUT /futures/trades/{id}` - Update stop-loss, take-profit or leverage
//! - `POST /futures/trades` - Open a trade

pub mod auth;
pub mod client;
pub mod error;
pub mod session;
pub mod types;

pub use auth::{signing_payload, LnMarketsSigner, SignedHeaders};
pub use client::{
    http_client, rate_limiter, LnMarketsClient, LnMarketsClientConfig, SharedRateLimiter,
    API_PREFIX, LNMARKETS_MAINNET_URL, LNMARKETS_TESTNET_URL,
};
pub use error::{LnMarketsError, Result};
pub use session::{LnMarketsSession, LnMarketsSessionFactory};
pub use types::{
    Balance, NewTrade, Ticker, Trade, TradeFilter, TradeSide, TradeStatus, TradeType,
    TradeUpdate, User,
};
