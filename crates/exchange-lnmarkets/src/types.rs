//! Data models for the LN Markets futures API.
//!
//! Prices are USD as `rust_decimal::Decimal`; margins, quantities and fees are
//! whole satoshis. Timestamps on the wire are Unix milliseconds.

use crate::error::{LnMarketsError, Result};
use chrono::{DateTime, Utc};
use risk_guard_core::{MarketTick, Position, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Source label attached to ticks built from the exchange ticker.
pub const TICKER_SOURCE: &str = "lnmarkets";

// =============================================================================
// Enums
// =============================================================================

/// Order type of a futures trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeType {
    /// Market order.
    #[serde(rename = "m")]
    Market,
    /// Limit order.
    #[serde(rename = "l")]
    Limit,
}

/// Direction of a futures trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    /// Buy (long).
    #[serde(rename = "b")]
    Buy,
    /// Sell (short).
    #[serde(rename = "s")]
    Sell,
}

impl From<TradeSide> for Side {
    fn from(side: TradeSide) -> Self {
        match side {
            TradeSide::Buy => Self::Long,
            TradeSide::Sell => Self::Short,
        }
    }
}

/// Lifecycle filter for trade listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    /// Limit orders not yet filled.
    Open,
    /// Filled and live.
    #[default]
    Running,
    /// Closed or cancelled.
    Closed,
}

impl TradeStatus {
    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Running => "running",
            Self::Closed => "closed",
        }
    }
}

// =============================================================================
// Trades
// =============================================================================

/// A futures trade as returned by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Trade identifier.
    pub id: String,

    /// Order type.
    #[serde(rename = "type")]
    pub trade_type: TradeType,

    /// Trade direction.
    pub side: TradeSide,

    /// Order price in USD.
    pub price: Decimal,

    /// Fill price in USD, once running.
    #[serde(default)]
    pub entry_price: Option<Decimal>,

    /// Liquidation price in USD.
    pub liquidation: Decimal,

    /// Margin in satoshis.
    pub margin: u64,

    /// Notional quantity in USD.
    #[serde(default)]
    pub quantity: Decimal,

    /// Leverage multiplier.
    #[serde(default)]
    pub leverage: Decimal,

    /// Stop-loss price, zero when unset.
    #[serde(default)]
    pub stoploss: Decimal,

    /// Take-profit price, zero when unset.
    #[serde(default)]
    pub takeprofit: Decimal,

    /// Profit and loss in satoshis.
    #[serde(default)]
    pub pl: i64,

    /// Whether the trade is filled and live.
    #[serde(default)]
    pub running: bool,

    /// Whether the trade is closed.
    #[serde(default)]
    pub closed: bool,

    /// Whether the order was cancelled.
    #[serde(default)]
    pub canceled: bool,

    /// Creation time in Unix milliseconds.
    #[serde(default)]
    pub creation_ts: Option<i64>,
}

impl Trade {
    /// Converts a running trade into the guard's position view.
    ///
    /// # Errors
    /// Returns a serialization error if the prices cannot describe a position.
    pub fn to_position(&self) -> Result<Position> {
        let entry_price = self.entry_price.unwrap_or(self.price);
        if entry_price <= Decimal::ZERO || self.liquidation <= Decimal::ZERO {
            return Err(LnMarketsError::Serialization(format!(
                "trade {} has non-positive entry or liquidation price",
                self.id
            )));
        }

        Ok(Position {
            id: self.id.clone(),
            entry_price,
            liquidation_price: self.liquidation,
            margin: self.margin,
            side: self.side.into(),
        })
    }
}

/// Trade listings come back either bare or wrapped depending on the endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum TradeList {
    Bare(Vec<Trade>),
    Wrapped { trades: Vec<Trade> },
}

impl TradeList {
    pub(crate) fn into_vec(self) -> Vec<Trade> {
        match self {
            Self::Bare(trades) | Self::Wrapped { trades } => trades,
        }
    }
}

/// Query for the trade history endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TradeFilter {
    /// Lifecycle filter.
    #[serde(rename = "type")]
    pub status: TradeStatus,

    /// Lower bound, Unix milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<i64>,

    /// Upper bound, Unix milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<i64>,

    /// Maximum number of trades.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl TradeFilter {
    /// Creates a filter for the given status.
    #[must_use]
    pub fn new(status: TradeStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Sets the time window.
    #[must_use]
    pub fn with_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from.timestamp_millis());
        self.to = Some(to.timestamp_millis());
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Fields that can be changed on a running trade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TradeUpdate {
    /// New stop-loss price.
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub stoploss: Option<Decimal>,

    /// New take-profit price.
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub takeprofit: Option<Decimal>,

    /// New leverage.
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub leverage: Option<Decimal>,
}

impl TradeUpdate {
    /// Returns true if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stoploss.is_none() && self.takeprofit.is_none() && self.leverage.is_none()
    }
}

/// Order for a new futures trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTrade {
    /// Order type.
    #[serde(rename = "type")]
    pub trade_type: TradeType,

    /// Trade direction.
    pub side: TradeSide,

    /// Leverage multiplier.
    #[serde(with = "rust_decimal::serde::float")]
    pub leverage: Decimal,

    /// Margin in satoshis; exclusive with `quantity`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin: Option<u64>,

    /// Notional in USD; exclusive with `margin`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u64>,

    /// Limit price; required for limit orders.
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub price: Option<Decimal>,

    /// Stop-loss price.
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub stoploss: Option<Decimal>,

    /// Take-profit price.
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub takeprofit: Option<Decimal>,
}

impl NewTrade {
    /// Creates a market order sized by margin.
    #[must_use]
    pub fn market(side: TradeSide, margin_sats: u64, leverage: Decimal) -> Self {
        Self {
            trade_type: TradeType::Market,
            side,
            leverage,
            margin: Some(margin_sats),
            quantity: None,
            price: None,
            stoploss: None,
            takeprofit: None,
        }
    }

    /// Creates a limit order sized by margin.
    #[must_use]
    pub fn limit(side: TradeSide, margin_sats: u64, leverage: Decimal, price: Decimal) -> Self {
        Self {
            trade_type: TradeType::Limit,
            price: Some(price),
            ..Self::market(side, margin_sats, leverage)
        }
    }

    /// Sets the stop-loss.
    #[must_use]
    pub fn with_stoploss(mut self, price: Decimal) -> Self {
        self.stoploss = Some(price);
        self
    }

    /// Sets the take-profit.
    #[must_use]
    pub fn with_takeprofit(mut self, price: Decimal) -> Self {
        self.takeprofit = Some(price);
        self
    }

    /// Validates the order before submission.
    ///
    /// # Errors
    /// Returns an invalid-request error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.margin.is_some() == self.quantity.is_some() {
            return Err(LnMarketsError::InvalidRequest(
                "exactly one of margin or quantity must be set".to_string(),
            ));
        }
        if self.margin == Some(0) || self.quantity == Some(0) {
            return Err(LnMarketsError::InvalidRequest(
                "order size must be positive".to_string(),
            ));
        }
        if self.leverage <= Decimal::ZERO {
            return Err(LnMarketsError::InvalidRequest(
                "leverage must be positive".to_string(),
            ));
        }
        match (self.trade_type, self.price) {
            (TradeType::Limit, None) => Err(LnMarketsError::InvalidRequest(
                "limit order requires a price".to_string(),
            )),
            (_, Some(price)) if price <= Decimal::ZERO => Err(LnMarketsError::InvalidRequest(
                "price must be positive".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Body for margin and cash-in requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct AmountRequest<'a> {
    pub id: &'a str,
    pub amount: u64,
}

// =============================================================================
// Account & Market
// =============================================================================

/// Account summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Account identifier.
    pub uid: String,

    /// Display name.
    #[serde(default)]
    pub username: Option<String>,

    /// Available balance in satoshis.
    #[serde(default)]
    pub balance: u64,

    /// Synthetic USD balance.
    #[serde(default)]
    pub synthetic_usd_balance: Option<Decimal>,
}

/// Balance view derived from the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Available balance in satoshis.
    pub balance_sats: u64,

    /// Synthetic USD balance.
    pub synthetic_usd: Option<Decimal>,
}

impl From<&User> for Balance {
    fn from(user: &User) -> Self {
        Self {
            balance_sats: user.balance,
            synthetic_usd: user.synthetic_usd_balance,
        }
    }
}

/// Futures market snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    /// Index price in USD; the reference for liquidation.
    pub index: Decimal,

    /// Last traded price.
    #[serde(default)]
    pub last_price: Option<Decimal>,

    /// Best bid.
    #[serde(default)]
    pub bid_price: Option<Decimal>,

    /// Best ask.
    #[serde(default)]
    pub ask_price: Option<Decimal>,

    /// Observation time in Unix milliseconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl Ticker {
    /// Converts into a tick; a missing or unparseable timestamp stays absent.
    #[must_use]
    pub fn to_market_tick(&self) -> MarketTick {
        MarketTick {
            price: self.index,
            timestamp: self.timestamp.and_then(DateTime::from_timestamp_millis),
            source: TICKER_SOURCE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade_json() -> serde_json::Value {
        serde_json::json!({
            "id": "b7a4c1f2-0d3e-4a55-9c0e-2f1d7e1c8a90",
            "uid": "user-1",
            "type": "m",
            "side": "b",
            "price": 50000,
            "entry_price": 50000.5,
            "liquidation": 45000,
            "margin": 100000,
            "quantity": 500,
            "leverage": 10,
            "stoploss": 0,
            "takeprofit": 0,
            "pl": -1200,
            "running": true,
            "closed": false,
            "canceled": false,
            "creation_ts": 1700000000000_i64
        })
    }

    // ==================== Trade Tests ====================

    #[test]
    fn test_trade_deserializes_from_wire_format() {
        let trade: Trade = serde_json::from_value(trade_json()).unwrap();
        assert_eq!(trade.trade_type, TradeType::Market);
        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.margin, 100_000);
        assert_eq!(trade.liquidation, dec!(45000));
        assert!(trade.running);
    }

    #[test]
    fn test_trade_to_position() {
        let trade: Trade = serde_json::from_value(trade_json()).unwrap();
        let position = trade.to_position().unwrap();
        assert_eq!(position.entry_price, dec!(50000.5));
        assert_eq!(position.liquidation_price, dec!(45000));
        assert_eq!(position.margin, 100_000);
        assert_eq!(position.side, Side::Long);
    }

    #[test]
    fn test_trade_without_entry_price_uses_order_price() {
        let mut json = trade_json();
        json.as_object_mut().unwrap().remove("entry_price");
        let trade: Trade = serde_json::from_value(json).unwrap();
        assert_eq!(trade.to_position().unwrap().entry_price, dec!(50000));
    }

    #[test]
    fn test_trade_with_zero_liquidation_is_rejected() {
        let mut json = trade_json();
        json["liquidation"] = serde_json::json!(0);
        let trade: Trade = serde_json::from_value(json).unwrap();
        assert!(trade.to_position().is_err());
    }

    #[test]
    fn test_trade_list_accepts_both_shapes() {
        let bare: TradeList =
            serde_json::from_value(serde_json::json!([trade_json()])).unwrap();
        assert_eq!(bare.into_vec().len(), 1);

        let wrapped: TradeList =
            serde_json::from_value(serde_json::json!({ "trades": [trade_json(), trade_json()] }))
                .unwrap();
        assert_eq!(wrapped.into_vec().len(), 2);
    }

    // ==================== Request Body Tests ====================

    #[test]
    fn test_trade_filter_query() {
        let filter = TradeFilter::new(TradeStatus::Closed).with_limit(50);
        let query = serde_urlencoded::to_string(&filter).unwrap();
        assert_eq!(query, "type=closed&limit=50");
    }

    #[test]
    fn test_trade_update_skips_unset_fields() {
        let update = TradeUpdate {
            stoploss: Some(dec!(42000)),
            ..Default::default()
        };
        assert!(!update.is_empty());
        let json = serde_json::to_value(&update).unwrap();
        assert!(json.get("stoploss").is_some());
        assert!(json.get("takeprofit").is_none());
        assert!(TradeUpdate::default().is_empty());
    }

    #[test]
    fn test_new_trade_validation() {
        assert!(NewTrade::market(TradeSide::Buy, 10_000, dec!(10)).validate().is_ok());
        assert!(NewTrade::limit(TradeSide::Sell, 10_000, dec!(5), dec!(60000))
            .validate()
            .is_ok());

        let mut missing_price = NewTrade::limit(TradeSide::Sell, 10_000, dec!(5), dec!(60000));
        missing_price.price = None;
        assert!(missing_price.validate().is_err());

        assert!(NewTrade::market(TradeSide::Buy, 0, dec!(10)).validate().is_err());
        assert!(NewTrade::market(TradeSide::Buy, 10_000, dec!(0)).validate().is_err());

        let mut both = NewTrade::market(TradeSide::Buy, 10_000, dec!(10));
        both.quantity = Some(100);
        assert!(both.validate().is_err());
    }

    #[test]
    fn test_new_trade_wire_format() {
        let order = NewTrade::market(TradeSide::Sell, 25_000, dec!(20)).with_stoploss(dec!(70000));
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["type"], "m");
        assert_eq!(json["side"], "s");
        assert_eq!(json["margin"], 25_000);
        assert!(json.get("quantity").is_none());
    }

    // ==================== Market Tests ====================

    #[test]
    fn test_ticker_to_market_tick() {
        let ticker: Ticker = serde_json::from_value(serde_json::json!({
            "index": 48000.5,
            "lastPrice": 48001,
            "timestamp": 1700000000000_i64
        }))
        .unwrap();

        let tick = ticker.to_market_tick();
        assert_eq!(tick.price, dec!(48000.5));
        assert_eq!(tick.source, TICKER_SOURCE);
        assert_eq!(tick.timestamp.unwrap().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_ticker_without_timestamp() {
        let ticker: Ticker = serde_json::from_value(serde_json::json!({ "index": 48000 })).unwrap();
        assert!(ticker.to_market_tick().timestamp.is_none());
    }

    #[test]
    fn test_balance_from_user() {
        let user: User = serde_json::from_value(serde_json::json!({
            "uid": "u-1",
            "username": "satoshi",
            "balance": 1_500_000,
            "synthetic_usd_balance": 12.5
        }))
        .unwrap();
        let balance = Balance::from(&user);
        assert_eq!(balance.balance_sats, 1_500_000);
        assert_eq!(balance.synthetic_usd, Some(dec!(12.5)));
    }
}
