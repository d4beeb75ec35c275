//! Position lifecycle management.
//!
//! Every position is a small state machine: Open, then exactly one of
//! Closed{stop_loss | take_profit | max_hold | signal_reversal} or
//! Expired, all terminal. Exit evaluation is a pure function of the
//! position, the latest mark, the fresh signal, and the clock, so the
//! decision phase stays read-only; mutations happen in the write-back.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::warn;
use uuid::Uuid;

use optrade_core::error::{Result, TradeError};
use optrade_core::types::{CloseReason, Position, Signal, SignalDirection};

/// What to do with an open position this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    Close(CloseReason),
    /// Legs ran past expiration; retire the position without orders.
    Expire,
}

/// Owns the set of positions and enforces the open-position cap.
pub struct PositionManager {
    max_positions: usize,
    positions: Vec<Position>,
}

impl PositionManager {
    #[must_use]
    pub fn new(max_positions: usize) -> Self {
        Self {
            max_positions,
            positions: Vec::new(),
        }
    }

    /// Rebuilds the manager from a persisted snapshot; open positions
    /// resume monitoring without being re-entered.
    #[must_use]
    pub fn with_positions(max_positions: usize, positions: Vec<Position>) -> Self {
        Self {
            max_positions,
            positions,
        }
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.positions.iter().filter(|p| p.is_open()).count()
    }

    /// Whether a new entry may be admitted this cycle. At the cap, new
    /// signals are dropped, never queued.
    #[must_use]
    pub fn can_enter(&self) -> bool {
        self.open_count() < self.max_positions
    }

    #[must_use]
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| p.is_open())
    }

    /// True when the symbol already has an open position.
    #[must_use]
    pub fn has_open_for(&self, symbol: &str) -> bool {
        self.open_positions().any(|p| p.plan.symbol == symbol)
    }

    /// Admits a freshly-opened position, re-checking the cap so the
    /// invariant holds even if the caller raced.
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::ExecutionFailed`] at the cap.
    pub fn admit(&mut self, position: Position) -> Result<()> {
        if !self.can_enter() {
            warn!(
                symbol = position.plan.symbol,
                open = self.open_count(),
                max = self.max_positions,
                "position cap reached, dropping entry"
            );
            return Err(TradeError::execution(format!(
                "max positions ({}) reached",
                self.max_positions
            )));
        }
        self.positions.push(position);
        Ok(())
    }

    /// Evaluates the exit rules for one open position.
    ///
    /// Order matters: P&L rules first, so a simultaneous stop/target hit
    /// takes precedence over a same-cycle time expiry; then the holding
    /// deadline (closing regardless of P&L); then leg expiration; then
    /// signal reversal for directional structures.
    #[must_use]
    pub fn evaluate_exit(
        position: &Position,
        mark: Option<Decimal>,
        signal: Option<&Signal>,
        now: DateTime<Utc>,
    ) -> Option<ExitDecision> {
        if !position.is_open() {
            return None;
        }
        let plan = &position.plan;

        if let Some(mark) = mark {
            if !plan.entry_price.is_zero() {
                let change = (mark - plan.entry_price) / plan.entry_price.abs();
                if let (Some(stop), Some(take)) = (
                    Decimal::from_f64(plan.stop_loss_pct),
                    Decimal::from_f64(plan.take_profit_pct),
                ) {
                    if change <= -stop {
                        return Some(ExitDecision::Close(CloseReason::StopLoss));
                    }
                    if change >= take {
                        return Some(ExitDecision::Close(CloseReason::TakeProfit));
                    }
                }
            }
        }

        if now >= plan.max_hold_until {
            return Some(ExitDecision::Close(CloseReason::MaxHold));
        }

        if plan
            .earliest_expiry()
            .is_some_and(|expiry| expiry < now.date_naive())
        {
            return Some(ExitDecision::Expire);
        }

        if let (Some(signal), Some(bias)) = (signal, plan.kind.directional_bias()) {
            if signal.direction != SignalDirection::Neutral && signal.direction == bias.opposite()
            {
                return Some(ExitDecision::Close(CloseReason::SignalReversal));
            }
        }

        None
    }

    /// Applies a computed exit to the owned position. Returns false when
    /// the id is unknown or already terminal.
    pub fn apply_exit(&mut self, id: Uuid, decision: ExitDecision, realized_pnl: Decimal) -> bool {
        let Some(position) = self.positions.iter_mut().find(|p| p.id == id) else {
            return false;
        };
        if !position.is_open() {
            return false;
        }
        match decision {
            ExitDecision::Close(reason) => position.close(reason, realized_pnl),
            ExitDecision::Expire => position.expire(realized_pnl),
        }
        true
    }

    /// Drops terminal positions older than the retention window, keeping
    /// the snapshot bounded.
    pub fn prune_closed(&mut self, keep: usize) {
        let terminal: Vec<Uuid> = self
            .positions
            .iter()
            .filter(|p| !p.is_open())
            .map(|p| p.id)
            .collect();
        if terminal.len() > keep {
            let drop_count = terminal.len() - keep;
            let drop_ids: Vec<Uuid> = terminal.into_iter().take(drop_count).collect();
            self.positions.retain(|p| !drop_ids.contains(&p.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use optrade_core::types::{
        FamilyScores, LegSide, OptionContract, OptionRight, PlanLeg, StrategyPlan, StructureKind,
    };
    use rust_decimal_macros::dec;

    fn contract(right: OptionRight, expiry_days: i64) -> OptionContract {
        let expiry = (Utc::now() + Duration::days(expiry_days)).date_naive();
        OptionContract {
            symbol: "AAPL".to_string(),
            expiry,
            strike: dec!(190),
            right,
            bid: dec!(1.90),
            ask: dec!(2.10),
            last: dec!(2.00),
            volume: 500,
            open_interest: 1000,
            implied_volatility: 0.3,
            greeks: None,
        }
    }

    fn position(kind: StructureKind, entry: Decimal, opened_days_ago: i64) -> Position {
        let opened_at = Utc::now() - Duration::days(opened_days_ago);
        let plan = StrategyPlan::new(
            "AAPL",
            kind,
            match kind.leg_count() {
                1 => vec![PlanLeg {
                    contract: contract(OptionRight::Call, 30),
                    side: LegSide::Buy,
                    quantity: 1,
                }],
                2 => vec![
                    PlanLeg {
                        contract: contract(OptionRight::Put, 30),
                        side: LegSide::Sell,
                        quantity: 1,
                    },
                    PlanLeg {
                        contract: contract(OptionRight::Put, 30),
                        side: LegSide::Buy,
                        quantity: 1,
                    },
                ],
                _ => panic!("unused in tests"),
            },
            entry,
            0.5,
            1.0,
            opened_at + Duration::days(14),
            opened_at,
        )
        .unwrap();
        Position::open(plan, opened_at)
    }

    fn bearish_signal() -> Signal {
        Signal {
            symbol: "AAPL".to_string(),
            direction: SignalDirection::Bearish,
            strength: -0.6,
            timestamp: Utc::now(),
            scores: FamilyScores::default(),
        }
    }

    #[test]
    fn stop_loss_take_profit_and_neither() {
        let pos = position(StructureKind::LongCall, dec!(100), 1);

        // Half the entry value: stop loss.
        assert_eq!(
            PositionManager::evaluate_exit(&pos, Some(dec!(50)), None, Utc::now()),
            Some(ExitDecision::Close(CloseReason::StopLoss))
        );
        // Doubled: take profit.
        assert_eq!(
            PositionManager::evaluate_exit(&pos, Some(dec!(200)), None, Utc::now()),
            Some(ExitDecision::Close(CloseReason::TakeProfit))
        );
        // +20%: holds.
        assert_eq!(
            PositionManager::evaluate_exit(&pos, Some(dec!(120)), None, Utc::now()),
            None
        );
    }

    #[test]
    fn max_hold_closes_regardless_of_pnl() {
        // Opened 15 days ago with a 14-day holding limit.
        let pos = position(StructureKind::LongCall, dec!(100), 15);
        assert_eq!(
            PositionManager::evaluate_exit(&pos, Some(dec!(120)), None, Utc::now()),
            Some(ExitDecision::Close(CloseReason::MaxHold))
        );
        // A mark the P&L rules would act on still wins over the clock.
        assert_eq!(
            PositionManager::evaluate_exit(&pos, Some(dec!(200)), None, Utc::now()),
            Some(ExitDecision::Close(CloseReason::TakeProfit))
        );
    }

    #[test]
    fn missing_mark_still_honors_the_clock() {
        let pos = position(StructureKind::LongCall, dec!(100), 15);
        assert_eq!(
            PositionManager::evaluate_exit(&pos, None, None, Utc::now()),
            Some(ExitDecision::Close(CloseReason::MaxHold))
        );
    }

    #[test]
    fn signal_reversal_closes_directional_only() {
        let long_call = position(StructureKind::LongCall, dec!(100), 1);
        assert_eq!(
            PositionManager::evaluate_exit(
                &long_call,
                Some(dec!(110)),
                Some(&bearish_signal()),
                Utc::now()
            ),
            Some(ExitDecision::Close(CloseReason::SignalReversal))
        );

        // A credit spread opened on a bullish signal also carries bias.
        let spread = position(StructureKind::BullPutSpread, dec!(-100), 1);
        assert_eq!(
            PositionManager::evaluate_exit(
                &spread,
                Some(dec!(-100)),
                Some(&bearish_signal()),
                Utc::now()
            ),
            Some(ExitDecision::Close(CloseReason::SignalReversal))
        );
    }

    #[test]
    fn credit_entry_uses_symmetric_thresholds() {
        // Net credit of 100 (entry -100). Mark decaying toward zero is
        // profit; the position value rising to -250 is a deep loss.
        let pos = position(StructureKind::BullPutSpread, dec!(-100), 1);
        assert_eq!(
            PositionManager::evaluate_exit(&pos, Some(dec!(0)), None, Utc::now()),
            Some(ExitDecision::Close(CloseReason::TakeProfit))
        );
        assert_eq!(
            PositionManager::evaluate_exit(&pos, Some(dec!(-250)), None, Utc::now()),
            Some(ExitDecision::Close(CloseReason::StopLoss))
        );
    }

    #[test]
    fn expired_legs_expire_the_position() {
        let opened_at = Utc::now() - Duration::days(3);
        let plan = StrategyPlan::new(
            "AAPL",
            StructureKind::LongCall,
            vec![PlanLeg {
                contract: contract(OptionRight::Call, -1),
                side: LegSide::Buy,
                quantity: 1,
            }],
            dec!(2.00),
            0.5,
            1.0,
            opened_at + Duration::days(14),
            opened_at,
        )
        .unwrap();
        let pos = Position::open(plan, opened_at);
        assert_eq!(
            PositionManager::evaluate_exit(&pos, Some(dec!(2.10)), None, Utc::now()),
            Some(ExitDecision::Expire)
        );
    }

    #[test]
    fn cap_is_enforced_and_entries_drop() {
        let mut manager = PositionManager::new(2);
        manager
            .admit(position(StructureKind::LongCall, dec!(100), 1))
            .unwrap();
        manager
            .admit(position(StructureKind::LongCall, dec!(100), 1))
            .unwrap();
        assert!(!manager.can_enter());

        let err = manager
            .admit(position(StructureKind::LongCall, dec!(100), 1))
            .unwrap_err();
        assert!(matches!(err, TradeError::ExecutionFailed(_)));
        assert_eq!(manager.open_count(), 2);
    }

    #[test]
    fn closing_frees_a_slot() {
        let mut manager = PositionManager::new(1);
        let pos = position(StructureKind::LongCall, dec!(100), 1);
        let id = pos.id;
        manager.admit(pos).unwrap();
        assert!(!manager.can_enter());

        assert!(manager.apply_exit(
            id,
            ExitDecision::Close(CloseReason::StopLoss),
            dec!(-5000)
        ));
        assert!(manager.can_enter());
        assert_eq!(manager.open_count(), 0);

        // Terminal positions never reopen.
        assert!(!manager.apply_exit(id, ExitDecision::Expire, dec!(0)));
    }

    #[test]
    fn recovery_resumes_without_reentry() {
        let open = position(StructureKind::LongCall, dec!(100), 1);
        let mut closed = position(StructureKind::LongCall, dec!(100), 1);
        closed.close(CloseReason::TakeProfit, dec!(900));

        let manager = PositionManager::with_positions(5, vec![open, closed]);
        assert_eq!(manager.positions().len(), 2);
        assert_eq!(manager.open_count(), 1);
        assert!(manager.has_open_for("AAPL"));
    }
}
