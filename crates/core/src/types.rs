//! Domain types for the position-risk guard.
//!
//! Prices use `rust_decimal::Decimal`; margins and action sizes are whole
//! satoshis.

use crate::error::{ErrorKind, GuardError, GuardResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Credentials
// =============================================================================

/// Exchange network a credential set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production exchange.
    #[default]
    Mainnet,
    /// Test exchange.
    Testnet,
}

impl FromStr for Network {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            other => Err(GuardError::Configuration(format!(
                "unknown network: {other}"
            ))),
        }
    }
}

/// API credentials for one user. Owned by the secrets store.
pub struct Credentials {
    /// API key identifier.
    pub api_key: String,
    /// HMAC secret.
    pub api_secret: SecretString,
    /// Passphrase bound to the key.
    pub passphrase: SecretString,
    /// Network the key is valid on.
    pub network: Network,
}

impl Credentials {
    /// Creates a credential set.
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        passphrase: impl Into<String>,
        network: Network,
    ) -> Self {
        let api_secret: String = api_secret.into();
        let passphrase: String = passphrase.into();
        Self {
            api_key: api_key.into(),
            api_secret: SecretString::from(api_secret),
            passphrase: SecretString::from(passphrase),
            network,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("passphrase", &"[REDACTED]")
            .field("network", &self.network)
            .finish()
    }
}

// =============================================================================
// Risk Configuration
// =============================================================================

/// Corrective action taken when a position crosses its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskAction {
    /// Add margin to the position.
    AddMargin,
    /// Close the position.
    ClosePosition,
    /// Reduce the position's exposure.
    ReducePosition,
}

impl RiskAction {
    /// Returns the snake_case label used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AddMargin => "add_margin",
            Self::ClosePosition => "close_position",
            Self::ReducePosition => "reduce_position",
        }
    }
}

/// Per-user automation settings, created and updated outside the guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Configuration identifier.
    pub id: String,
    /// Owner of the configuration.
    pub user_id: String,
    /// Whether the automation is active.
    pub enabled: bool,
    /// Percentage of the entry distance lost before triggering, in (0, 100].
    pub threshold_pct: Decimal,
    /// Action to take on trigger.
    pub action: RiskAction,
    /// Sizing parameter as a percentage of the position margin, in [0, 100].
    pub action_param_pct: Decimal,
}

impl RiskConfig {
    /// Validates the configured ranges.
    ///
    /// # Errors
    /// Returns a validation error if a percentage is out of range.
    pub fn validate(&self) -> GuardResult<()> {
        if self.threshold_pct <= Decimal::ZERO || self.threshold_pct > Decimal::ONE_HUNDRED {
            return Err(GuardError::Validation(format!(
                "config {}: threshold_pct {} outside (0, 100]",
                self.id, self.threshold_pct
            )));
        }
        if self.action_param_pct < Decimal::ZERO || self.action_param_pct > Decimal::ONE_HUNDRED
        {
            return Err(GuardError::Validation(format!(
                "config {}: action_param_pct {} outside [0, 100]",
                self.id, self.action_param_pct
            )));
        }
        Ok(())
    }

    /// Ratio of current to entry distance at or below which the config triggers.
    #[must_use]
    pub fn threshold_ratio(&self) -> Decimal {
        Decimal::ONE - self.threshold_pct / Decimal::ONE_HUNDRED
    }
}

// =============================================================================
// Positions & Market Data
// =============================================================================

/// Direction of a futures position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Long (buy) position.
    Long,
    /// Short (sell) position.
    Short,
}

/// A running futures position as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Exchange trade identifier.
    pub id: String,
    /// Entry price in USD.
    pub entry_price: Decimal,
    /// Liquidation price in USD.
    pub liquidation_price: Decimal,
    /// Margin in satoshis.
    pub margin: u64,
    /// Position direction.
    pub side: Side,
}

/// A position the exchange reported that could not be turned into a [`Position`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedPosition {
    /// Exchange trade identifier.
    pub id: String,
    /// Why the trade was rejected.
    pub error: GuardError,
}

/// Running positions of one account.
///
/// Trades that fail conversion are kept apart in `rejected` so the remaining
/// positions are still evaluated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionSnapshot {
    /// Positions ready for evaluation.
    pub positions: Vec<Position>,
    /// Trades that could not be converted.
    pub rejected: Vec<RejectedPosition>,
}

impl PositionSnapshot {
    /// Returns true when the exchange reported nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.rejected.is_empty()
    }
}

impl From<Vec<Position>> for PositionSnapshot {
    fn from(positions: Vec<Position>) -> Self {
        Self {
            positions,
            rejected: Vec::new(),
        }
    }
}

/// A price observation for the traded index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketTick {
    /// Last price in USD.
    pub price: Decimal,
    /// When the exchange observed the price.
    pub timestamp: Option<DateTime<Utc>>,
    /// Where the observation came from.
    pub source: String,
}

impl MarketTick {
    /// Creates a tick observed at `timestamp`.
    pub fn new(price: Decimal, timestamp: DateTime<Utc>, source: impl Into<String>) -> Self {
        Self {
            price,
            timestamp: Some(timestamp),
            source: source.into(),
        }
    }
}

// =============================================================================
// Action Results
// =============================================================================

/// Outcome of processing a config or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    /// The action (if any) completed.
    Success,
    /// Processing failed.
    Error,
}

/// Record handed to the audit sink. Never held past one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Unique record identifier.
    pub id: Uuid,
    /// Configuration that produced the record.
    pub config_id: String,
    /// Position concerned, when the failure or action was position-scoped.
    pub position_id: Option<String>,
    /// Whether the threshold condition held.
    pub triggered: bool,
    /// Configured action.
    pub action: RiskAction,
    /// Sized amount in satoshis, when applicable.
    pub amount_sats: Option<u64>,
    /// Final status.
    pub status: ActionStatus,
    /// Error classification when `status` is `Error`.
    pub error_kind: Option<ErrorKind>,
    /// Error message when `status` is `Error`.
    pub message: Option<String>,
    /// When the record was produced.
    pub timestamp: DateTime<Utc>,
}

impl ActionResult {
    /// Creates a successful action record.
    pub fn success(
        config: &RiskConfig,
        position_id: impl Into<String>,
        amount_sats: Option<u64>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            config_id: config.id.clone(),
            position_id: Some(position_id.into()),
            triggered: true,
            action: config.action,
            amount_sats,
            status: ActionStatus::Success,
            error_kind: None,
            message: None,
            timestamp,
        }
    }

    /// Creates an error record.
    pub fn failure(
        config: &RiskConfig,
        position_id: Option<String>,
        triggered: bool,
        error: &GuardError,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            config_id: config.id.clone(),
            position_id,
            triggered,
            action: config.action,
            amount_sats: None,
            status: ActionStatus::Error,
            error_kind: Some(error.kind()),
            message: Some(error.to_string()),
            timestamp,
        }
    }

    /// Sets the sized amount.
    #[must_use]
    pub fn with_amount(mut self, amount_sats: Option<u64>) -> Self {
        self.amount_sats = amount_sats;
        self
    }

    /// Returns true when the record reports success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }
}
