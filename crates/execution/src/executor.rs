//! Multi-leg order execution.
//!
//! A plan opens all-or-nothing: every leg must confirm filled before a
//! Position exists. On any rejection or timeout the already-filled legs
//! are unwound with best-effort offsetting orders and the attempt reports
//! `ExecutionFailed`, leaving position state exactly as it was.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use optrade_core::error::{Result, TradeError};
use optrade_core::traits::{OptionOrder, OrderFill, OrderSide, TradingPlatform};
use optrade_core::types::{LegSide, Position, StrategyPlan};

const fn open_side(side: LegSide) -> OrderSide {
    match side {
        LegSide::Buy => OrderSide::BuyToOpen,
        LegSide::Sell => OrderSide::SellToOpen,
    }
}

/// Submits plans and close instructions against a trading platform.
pub struct OrderExecutor<P: TradingPlatform> {
    platform: P,
    order_timeout: Duration,
}

impl<P: TradingPlatform> OrderExecutor<P> {
    #[must_use]
    pub fn new(platform: P, order_timeout: Duration) -> Self {
        Self {
            platform,
            order_timeout,
        }
    }

    #[must_use]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Opens a plan. The returned Position exists only if every leg
    /// filled.
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::ExecutionFailed`] after unwinding any filled
    /// legs when a leg is rejected or times out.
    pub async fn open_plan(&self, plan: &StrategyPlan, now: DateTime<Utc>) -> Result<Position> {
        let orders: Vec<OptionOrder> = plan
            .legs
            .iter()
            .map(|leg| OptionOrder {
                contract: leg.contract.clone(),
                side: open_side(leg.side),
                quantity: leg.quantity,
                limit: None,
            })
            .collect();

        let fills = self.execute_all(&orders, "open").await?;
        info!(
            symbol = plan.symbol,
            structure = %plan.kind,
            legs = fills.len(),
            "plan filled, position open"
        );
        Ok(Position::open(plan.clone(), now))
    }

    /// Closes an open position with offsetting orders and returns the
    /// realized PnL (net of closing commissions).
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::ExecutionFailed`] after unwinding the legs
    /// that did close; the position is left open for the next cycle.
    pub async fn close_position(&self, position: &Position) -> Result<Decimal> {
        let plan = &position.plan;
        let orders: Vec<OptionOrder> = plan
            .legs
            .iter()
            .map(|leg| OptionOrder {
                contract: leg.contract.clone(),
                side: open_side(leg.side).offsetting(),
                quantity: leg.quantity,
                limit: None,
            })
            .collect();

        let fills = self.execute_all(&orders, "close").await?;

        let mut closing_net = Decimal::ZERO;
        let mut commissions = Decimal::ZERO;
        for (leg, fill) in plan.legs.iter().zip(&fills) {
            closing_net += leg.side.sign() * fill.price;
            commissions += fill.commission;
        }
        let contracts = Decimal::from(plan.contracts());
        let multiplier = Decimal::from(100);
        let realized = (closing_net - plan.entry_price) * contracts * multiplier - commissions;

        info!(
            symbol = plan.symbol,
            structure = %plan.kind,
            realized = %realized,
            "position closed"
        );
        Ok(realized)
    }

    /// Submits orders sequentially; on the first failure, unwinds every
    /// fill so far and reports the failure.
    async fn execute_all(&self, orders: &[OptionOrder], action: &str) -> Result<Vec<OrderFill>> {
        let mut fills: Vec<OrderFill> = Vec::with_capacity(orders.len());
        for order in orders {
            match self.place(order).await {
                Ok(fill) => fills.push(fill),
                Err(e) => {
                    warn!(
                        action,
                        filled = fills.len(),
                        total = orders.len(),
                        error = %e,
                        "leg failed, unwinding filled legs"
                    );
                    self.unwind(&fills).await;
                    return Err(TradeError::execution(format!(
                        "{action} leg {} of {} failed: {e}",
                        fills.len() + 1,
                        orders.len()
                    )));
                }
            }
        }
        Ok(fills)
    }

    async fn place(&self, order: &OptionOrder) -> Result<OrderFill> {
        match tokio::time::timeout(self.order_timeout, self.platform.place_order(order)).await {
            Ok(result) => result,
            Err(_) => Err(TradeError::execution(format!(
                "order for {} timed out",
                order.contract.display_name()
            ))),
        }
    }

    /// Best-effort offsetting close of filled legs, newest first. Unwind
    /// failures are logged, never propagated.
    async fn unwind(&self, fills: &[OrderFill]) {
        for fill in fills.iter().rev() {
            let order = OptionOrder {
                contract: fill.contract.clone(),
                side: fill.side.offsetting(),
                quantity: fill.quantity,
                limit: None,
            };
            if let Err(e) = self.place(&order).await {
                warn!(
                    contract = fill.contract.display_name(),
                    error = %e,
                    "unwind order failed"
                );
            }
        }
    }
}
