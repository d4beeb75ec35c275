//! Core types, error taxonomy, configuration, and capability traits for
//! the optrade options trading system.

pub mod config;
pub mod config_loader;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{ConfigProfile, ExpirationPolicy, VolatilityBias};
pub use config_loader::ConfigLoader;
pub use error::{Result, TradeError};
pub use traits::{
    Credentials, MarketDataSource, OptionOrder, OrderFill, OrderSide, PlatformPosition,
    TradingPlatform,
};
pub use types::{
    CloseReason, FamilyScores, Greeks, LegSide, MarketBar, OptionContract, OptionRight,
    OptionsChain, PlanLeg, Position, PositionStatus, Signal, SignalDirection, StrategyPlan,
    StructureKind,
};
