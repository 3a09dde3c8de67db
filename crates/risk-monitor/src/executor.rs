//! Turns a triggered decision into exactly one exchange call.

use risk_guard_core::{
    ActionResult, AuditSink, Clock, GuardError, GuardResult, Position, PositionActions,
    RiskAction, RiskConfig,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Sizes an action as `floor(margin * pct / 100)` satoshis.
#[must_use]
pub fn action_amount(margin_sats: u64, pct: Decimal) -> u64 {
    (Decimal::from(margin_sats) * pct / Decimal::ONE_HUNDRED)
        .floor()
        .to_u64()
        .unwrap_or(0)
}

/// Executes corrective actions and records their outcome.
pub struct ActionExecutor {
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl ActionExecutor {
    #[must_use]
    pub fn new(audit: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Self {
        Self { audit, clock }
    }

    /// Runs the configured action on `position` and records the result.
    ///
    /// Failures are logged and reported in the returned record; they never
    /// propagate as errors.
    pub async fn execute<A>(
        &self,
        config: &RiskConfig,
        position: &Position,
        actions: &A,
    ) -> ActionResult
    where
        A: PositionActions + ?Sized,
    {
        let amount = match config.action {
            RiskAction::ClosePosition => None,
            RiskAction::AddMargin | RiskAction::ReducePosition => {
                Some(action_amount(position.margin, config.action_param_pct))
            }
        };

        let outcome = self.dispatch(config.action, &position.id, amount, actions).await;
        let now = self.clock.now();

        let result = match outcome {
            Ok(()) => {
                info!(
                    config_id = %config.id,
                    position_id = %position.id,
                    action = config.action.as_str(),
                    amount_sats = ?amount,
                    "corrective action executed"
                );
                ActionResult::success(config, position.id.clone(), amount, now)
            }
            Err(e) => {
                error!(
                    config_id = %config.id,
                    position_id = %position.id,
                    action = config.action.as_str(),
                    kind = %e.kind(),
                    error = %e,
                    "corrective action failed"
                );
                ActionResult::failure(config, Some(position.id.clone()), true, &e, now)
                    .with_amount(amount)
            }
        };

        self.record(&result).await;
        result
    }

    async fn dispatch<A>(
        &self,
        action: RiskAction,
        position_id: &str,
        amount: Option<u64>,
        actions: &A,
    ) -> GuardResult<()>
    where
        A: PositionActions + ?Sized,
    {
        match (action, amount) {
            (RiskAction::ClosePosition, _) => actions.close_position(position_id).await,
            (_, None | Some(0)) => Err(GuardError::Validation(format!(
                "{} on position {position_id} sized to zero sats",
                action.as_str()
            ))),
            (RiskAction::AddMargin, Some(sats)) => actions.add_margin(position_id, sats).await,
            (RiskAction::ReducePosition, Some(sats)) => {
                actions.reduce_position(position_id, sats).await
            }
        }
    }

    /// Hands a record to the audit sink. Sink failures are logged only.
    pub async fn record(&self, result: &ActionResult) {
        if let Err(e) = self.audit.record(result).await {
            warn!(
                config_id = %result.config_id,
                record_id = %result.id,
                error = %e,
                "audit sink rejected record"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config, position, Call, FakeExchange, RecordingAudit};
    use risk_guard_core::{ActionStatus, ErrorKind, ManualClock};
    use rust_decimal_macros::dec;

    fn executor(audit: Arc<RecordingAudit>) -> ActionExecutor {
        ActionExecutor::new(audit, Arc::new(ManualClock::default()))
    }

    fn exchange() -> Arc<FakeExchange> {
        FakeExchange::new(Vec::new(), 48_000, chrono::Utc::now())
    }

    #[test]
    fn amount_is_floor_of_margin_share() {
        assert_eq!(action_amount(100_000, dec!(20)), 20_000);
        assert_eq!(action_amount(99_999, dec!(33.3)), 33_299);
        assert_eq!(action_amount(1, dec!(50)), 0);
        assert_eq!(action_amount(100_000, dec!(100)), 100_000);
        assert_eq!(action_amount(100_000, dec!(0)), 0);
    }

    #[tokio::test]
    async fn add_margin_sized_from_margin() {
        let audit = Arc::new(RecordingAudit::default());
        let exchange = exchange();
        let cfg = config("cfg-1", "user-1", RiskAction::AddMargin);

        let result = executor(audit.clone())
            .execute(&cfg, &position("pos-1", 50_000, 45_000, 100_000), exchange.as_ref())
            .await;

        assert!(result.is_success());
        assert_eq!(result.amount_sats, Some(20_000));
        assert_eq!(exchange.calls(), vec![Call::AddMargin("pos-1".into(), 20_000)]);
        assert_eq!(audit.records(), vec![result]);
    }

    #[tokio::test]
    async fn reduce_position_uses_single_position_call() {
        let audit = Arc::new(RecordingAudit::default());
        let exchange = exchange();
        let cfg = config("cfg-1", "user-1", RiskAction::ReducePosition);

        executor(audit)
            .execute(&cfg, &position("pos-2", 50_000, 45_000, 50_000), exchange.as_ref())
            .await;

        assert_eq!(exchange.calls(), vec![Call::Reduce("pos-2".into(), 10_000)]);
    }

    #[tokio::test]
    async fn close_position_closes_only_that_position() {
        let audit = Arc::new(RecordingAudit::default());
        let exchange = exchange();
        let cfg = config("cfg-1", "user-1", RiskAction::ClosePosition);

        let result = executor(audit)
            .execute(&cfg, &position("pos-3", 50_000, 45_000, 100_000), exchange.as_ref())
            .await;

        assert!(result.is_success());
        assert_eq!(result.amount_sats, None);
        assert_eq!(exchange.calls(), vec![Call::Close("pos-3".into())]);
    }

    #[tokio::test]
    async fn zero_amount_is_rejected_without_call() {
        let audit = Arc::new(RecordingAudit::default());
        let exchange = exchange();
        let mut cfg = config("cfg-1", "user-1", RiskAction::AddMargin);
        cfg.action_param_pct = dec!(0);

        let result = executor(audit.clone())
            .execute(&cfg, &position("pos-1", 50_000, 45_000, 100_000), exchange.as_ref())
            .await;

        assert_eq!(result.status, ActionStatus::Error);
        assert_eq!(result.error_kind, Some(ErrorKind::Validation));
        assert!(exchange.calls().is_empty());
        assert_eq!(audit.records().len(), 1);
    }

    #[tokio::test]
    async fn exchange_failure_is_recorded_not_raised() {
        let audit = Arc::new(RecordingAudit::default());
        let exchange = exchange();
        *exchange.action_error.lock() = Some(GuardError::upstream(500, "boom"));
        let cfg = config("cfg-1", "user-1", RiskAction::AddMargin);

        let result = executor(audit.clone())
            .execute(&cfg, &position("pos-1", 50_000, 45_000, 100_000), exchange.as_ref())
            .await;

        assert_eq!(result.status, ActionStatus::Error);
        assert_eq!(result.error_kind, Some(ErrorKind::Upstream));
        assert_eq!(result.amount_sats, Some(20_000));
        assert!(result.triggered);
        assert_eq!(audit.records().len(), 1);
    }

    #[tokio::test]
    async fn audit_failure_does_not_change_result() {
        let audit = Arc::new(RecordingAudit::default());
        *audit.fail.lock() = true;
        let exchange = exchange();
        let cfg = config("cfg-1", "user-1", RiskAction::ClosePosition);

        let result = executor(audit)
            .execute(&cfg, &position("pos-1", 50_000, 45_000, 100_000), exchange.as_ref())
            .await;

        assert!(result.is_success());
        assert_eq!(exchange.calls().len(), 1);
    }
}
