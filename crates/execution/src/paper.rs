//! Paper trading platform.
//!
//! Fills orders at the limit price (or the contract mid) with a
//! per-contract commission, without touching a brokerage. The default
//! no-credential platform, and the test double for executor behavior:
//! rejections can be scripted per order index.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::info;

use optrade_core::error::{Result, TradeError};
use optrade_core::traits::{
    Credentials, OptionOrder, OrderFill, PlatformPosition, TradingPlatform,
};

/// In-memory platform simulating immediate fills.
pub struct PaperPlatform {
    commission_per_contract: Decimal,
    order_seq: AtomicU64,
    /// 0-based order indices that will be rejected (testing hook).
    reject_orders: Mutex<HashSet<u64>>,
    positions: Mutex<Vec<PlatformPosition>>,
}

impl PaperPlatform {
    #[must_use]
    pub fn new(commission_per_contract: f64) -> Self {
        Self {
            commission_per_contract: Decimal::from_f64(commission_per_contract)
                .unwrap_or(Decimal::ZERO),
            order_seq: AtomicU64::new(0),
            reject_orders: Mutex::new(HashSet::new()),
            positions: Mutex::new(Vec::new()),
        }
    }

    /// Scripts a rejection for the order with the given 0-based sequence
    /// number.
    pub fn reject_order(&self, index: u64) {
        self.reject_orders.lock().insert(index);
    }

    /// Number of orders submitted so far.
    #[must_use]
    pub fn orders_placed(&self) -> u64 {
        self.order_seq.load(Ordering::SeqCst)
    }

    fn fill_price(order: &OptionOrder) -> Decimal {
        order.limit.unwrap_or_else(|| order.contract.mid())
    }

    fn record_position(&self, order: &OptionOrder, price: Decimal) {
        let signed = if order.side.is_buy() {
            i64::from(order.quantity)
        } else {
            -i64::from(order.quantity)
        };
        let mut positions = self.positions.lock();
        if let Some(existing) = positions
            .iter_mut()
            .find(|p| p.contract.same_listing(&order.contract))
        {
            existing.quantity += signed;
        } else {
            positions.push(PlatformPosition {
                contract: order.contract.clone(),
                quantity: signed,
                avg_price: price,
            });
        }
        positions.retain(|p| p.quantity != 0);
    }
}

impl Default for PaperPlatform {
    fn default() -> Self {
        Self::new(0.65)
    }
}

#[async_trait]
impl TradingPlatform for PaperPlatform {
    fn name(&self) -> &str {
        "paper"
    }

    async fn authenticate(&self, _credentials: &Credentials) -> Result<()> {
        Ok(())
    }

    async fn place_order(&self, order: &OptionOrder) -> Result<OrderFill> {
        let index = self.order_seq.fetch_add(1, Ordering::SeqCst);
        if self.reject_orders.lock().remove(&index) {
            return Err(TradeError::execution(format!(
                "paper order {index} rejected (scripted)"
            )));
        }

        let price = Self::fill_price(order);
        let commission = self.commission_per_contract * Decimal::from(order.quantity);
        self.record_position(order, price);

        let fill = OrderFill {
            order_id: format!("PAPER-{index}"),
            contract: order.contract.clone(),
            side: order.side,
            quantity: order.quantity,
            price,
            commission,
            filled_at: Utc::now(),
        };
        info!(
            order_id = fill.order_id,
            contract = fill.contract.display_name(),
            side = ?fill.side,
            quantity = fill.quantity,
            price = %fill.price,
            "paper fill simulated"
        );
        Ok(fill)
    }

    async fn positions(&self) -> Result<Vec<PlatformPosition>> {
        Ok(self.positions.lock().clone())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        info!(order_id, "paper cancel is a no-op");
        Ok(())
    }
}
