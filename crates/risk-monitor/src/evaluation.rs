//! Distance-to-liquidation math.

use risk_guard_core::{GuardError, GuardResult, Position, RiskConfig};
use rust_decimal::Decimal;

/// Result of checking one position against one configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Position evaluated.
    pub position_id: String,
    /// `|entry - liquidation|`.
    pub entry_distance: Decimal,
    /// `|price - liquidation|`.
    pub current_distance: Decimal,
    /// `current_distance / entry_distance`.
    pub ratio: Decimal,
    /// Ratio at or below which the configuration triggers.
    pub threshold_ratio: Decimal,
    /// Whether the corrective action should run.
    pub triggered: bool,
}

/// Evaluates `position` at `price` against `config`.
///
/// Distances are absolute and [`Position::side`] is not consulted. A price
/// already beyond the liquidation price (below it for a long, above it for
/// a short) is measured like a price on the safe side, so once the overshoot
/// exceeds the entry distance the ratio passes 1 and nothing triggers. The
/// exchange liquidates such positions itself.
///
/// # Errors
/// Returns a validation error when the entry and liquidation prices coincide.
pub fn evaluate(position: &Position, price: Decimal, config: &RiskConfig) -> GuardResult<Evaluation> {
    let entry_distance = (position.entry_price - position.liquidation_price).abs();
    if entry_distance.is_zero() {
        return Err(GuardError::Validation(format!(
            "position {} has zero distance between entry and liquidation",
            position.id
        )));
    }

    let current_distance = (price - position.liquidation_price).abs();
    let ratio = current_distance / entry_distance;
    let threshold_ratio = config.threshold_ratio();

    Ok(Evaluation {
        position_id: position.id.clone(),
        entry_distance,
        current_distance,
        ratio,
        threshold_ratio,
        triggered: ratio <= threshold_ratio,
    })
}
