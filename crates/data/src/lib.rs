//! Data routing for the optrade trading system.
//!
//! This crate provides:
//! - `DataRouter`: provider fallback chains with timeouts and retries
//! - `LimiterRegistry`: per-provider non-blocking token buckets
//! - `ReplayProvider`: the no-credential CSV/JSON terminal provider

use std::sync::Arc;

use optrade_core::config::DataConfig;
use optrade_core::error::{Result, TradeError};
use optrade_core::traits::MarketDataSource;

pub mod limiter;
pub mod replay;
pub mod router;

pub use limiter::LimiterRegistry;
pub use replay::ReplayProvider;
pub use router::{DataRouter, RouterConfig};

/// Constructs a provider by configured name.
///
/// Providers are selected here, once, at startup; nothing inspects
/// concrete types afterwards. Vendor HTTP clients plug in by adding an
/// arm.
///
/// # Errors
///
/// Returns [`TradeError::InvalidConfig`] for a name with no registered
/// implementation.
pub fn build_provider(name: &str, config: &DataConfig) -> Result<Arc<dyn MarketDataSource>> {
    match name {
        "replay" => Ok(Arc::new(ReplayProvider::new(&config.replay_dir))),
        other => Err(TradeError::InvalidConfig(format!(
            "unknown data provider '{other}'"
        ))),
    }
}

/// Builds the router described by the `data` config section.
///
/// # Errors
///
/// Returns [`TradeError::InvalidConfig`] for unknown provider names, zero
/// rate limits, or empty chains.
pub fn build_router(config: &DataConfig) -> Result<DataRouter> {
    let stock = config
        .stock_providers
        .iter()
        .map(|name| build_provider(name, config))
        .collect::<Result<Vec<_>>>()?;
    let options = config
        .options_providers
        .iter()
        .map(|name| build_provider(name, config))
        .collect::<Result<Vec<_>>>()?;
    let limiters = LimiterRegistry::from_config(config.rate_limits.iter())?;
    DataRouter::new(
        stock,
        options,
        limiters,
        RouterConfig::from_data_config(config),
    )
}
