//! Capability interfaces for market data vendors and trading platforms.
//!
//! Implementations are selected by name at startup from configuration;
//! nothing downcasts or inspects concrete types at runtime.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{MarketBar, OptionContract, OptionsChain};

/// A market data vendor for one or more asset classes.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Provider name used for limiter registration and log fields.
    fn name(&self) -> &str;

    /// Historical OHLCV bars, oldest first.
    async fn historical(&self, symbol: &str, period: &str, interval: &str)
        -> Result<Vec<MarketBar>>;

    /// Latest bar for a symbol.
    async fn realtime(&self, symbol: &str) -> Result<MarketBar>;

    /// Current options chain snapshot. Entries carry greeks when the
    /// vendor supports them.
    async fn options_chain(&self, symbol: &str) -> Result<OptionsChain>;
}

/// Credentials accepted by trading platforms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credentials {
    /// No authentication (paper trading).
    None,
    UserPass { username: String, password: String },
    Bearer { token: String },
}

/// Order side, open/close aware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    BuyToOpen,
    SellToOpen,
    BuyToClose,
    SellToClose,
}

impl OrderSide {
    /// The side that offsets a fill on this side.
    #[must_use]
    pub const fn offsetting(self) -> Self {
        match self {
            Self::BuyToOpen => Self::SellToClose,
            Self::SellToOpen => Self::BuyToClose,
            Self::BuyToClose => Self::SellToOpen,
            Self::SellToClose => Self::BuyToOpen,
        }
    }

    #[must_use]
    pub const fn is_buy(self) -> bool {
        matches!(self, Self::BuyToOpen | Self::BuyToClose)
    }
}

/// A single-leg option order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionOrder {
    pub contract: OptionContract,
    pub side: OrderSide,
    pub quantity: u32,
    /// Limit price; `None` places a market order.
    pub limit: Option<Decimal>,
}

/// A confirmed fill from the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFill {
    pub order_id: String,
    pub contract: OptionContract,
    pub side: OrderSide,
    pub quantity: u32,
    pub price: Decimal,
    pub commission: Decimal,
    pub filled_at: DateTime<Utc>,
}

/// A position as the platform reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformPosition {
    pub contract: OptionContract,
    /// Signed contract count: positive long, negative short.
    pub quantity: i64,
    pub avg_price: Decimal,
}

/// A brokerage/trading venue.
#[async_trait]
pub trait TradingPlatform: Send + Sync {
    /// Platform name for log fields.
    fn name(&self) -> &str;

    /// Authenticates the session. Must be called before placing orders.
    async fn authenticate(&self, credentials: &Credentials) -> Result<()>;

    /// Submits one leg order and waits for the fill confirmation.
    async fn place_order(&self, order: &OptionOrder) -> Result<OrderFill>;

    /// Positions currently held at the platform.
    async fn positions(&self) -> Result<Vec<PlatformPosition>>;

    /// Cancels a pending order.
    async fn cancel_order(&self, order_id: &str) -> Result<()>;
}
