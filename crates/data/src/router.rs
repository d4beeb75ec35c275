//! Provider routing with rate limiting, timeouts, and fallback.
//!
//! Stock and options requests walk independently configured provider
//! priority lists. Each hop takes a non-blocking token from the provider's
//! bucket, runs the call under a timeout, and falls through to the next
//! provider on any failure. A fully exhausted chain surfaces as
//! `DataUnavailable`, which callers treat as "no update this cycle" for
//! that symbol — never as a fatal error.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::{debug, warn};

use optrade_core::config::DataConfig;
use optrade_core::error::{Result, TradeError};
use optrade_core::traits::MarketDataSource;
use optrade_core::types::{MarketBar, OptionsChain};

use crate::limiter::LimiterRegistry;

/// Routing knobs, derived from the `data` config section.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub request_timeout: Duration,
    /// Attempts per provider per call (at least one).
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl RouterConfig {
    #[must_use]
    pub fn from_data_config(config: &DataConfig) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_retries: config.max_retries.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::from_data_config(&DataConfig::default())
    }
}

/// Routes data requests to per-asset-class provider chains.
pub struct DataRouter {
    stock_providers: Vec<Arc<dyn MarketDataSource>>,
    options_providers: Vec<Arc<dyn MarketDataSource>>,
    limiters: LimiterRegistry,
    config: RouterConfig,
}

impl DataRouter {
    /// Builds a router over pre-constructed provider chains.
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::InvalidConfig`] when either chain is empty.
    pub fn new(
        stock_providers: Vec<Arc<dyn MarketDataSource>>,
        options_providers: Vec<Arc<dyn MarketDataSource>>,
        limiters: LimiterRegistry,
        config: RouterConfig,
    ) -> Result<Self> {
        if stock_providers.is_empty() {
            return Err(TradeError::InvalidConfig(
                "stock provider chain must not be empty".to_string(),
            ));
        }
        if options_providers.is_empty() {
            return Err(TradeError::InvalidConfig(
                "options provider chain must not be empty".to_string(),
            ));
        }
        Ok(Self {
            stock_providers,
            options_providers,
            limiters,
            config,
        })
    }

    /// Historical OHLCV bars via the stock chain.
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::DataUnavailable`] once every provider has
    /// failed, timed out, or been rate limited.
    pub async fn historical(
        &self,
        symbol: &str,
        period: &str,
        interval: &str,
    ) -> Result<Vec<MarketBar>> {
        self.route(&self.stock_providers, symbol, "historical", |p| {
            p.historical(symbol, period, interval)
        })
        .await
    }

    /// Latest bar via the stock chain.
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::DataUnavailable`] once the chain is exhausted.
    pub async fn realtime(&self, symbol: &str) -> Result<MarketBar> {
        self.route(&self.stock_providers, symbol, "realtime", |p| {
            p.realtime(symbol)
        })
        .await
    }

    /// Options chain snapshot via the options chain providers.
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::DataUnavailable`] once the chain is exhausted.
    pub async fn options_chain(&self, symbol: &str) -> Result<OptionsChain> {
        self.route(&self.options_providers, symbol, "options_chain", |p| {
            p.options_chain(symbol)
        })
        .await
    }

    async fn route<'s, T>(
        &'s self,
        providers: &'s [Arc<dyn MarketDataSource>],
        symbol: &str,
        op: &'static str,
        call: impl Fn(&'s dyn MarketDataSource) -> BoxFuture<'s, Result<T>>,
    ) -> Result<T> {
        'providers: for provider in providers {
            let name = provider.name().to_string();
            for attempt in 1..=self.config.max_retries {
                if let Err(e) = self.limiters.try_acquire(&name) {
                    warn!(provider = %name, op, symbol, error = %e, "rate limited, trying next provider");
                    continue 'providers;
                }

                match tokio::time::timeout(self.config.request_timeout, call(provider.as_ref()))
                    .await
                {
                    Ok(Ok(value)) => {
                        debug!(provider = %name, op, symbol, "request served");
                        return Ok(value);
                    }
                    Ok(Err(e)) => {
                        warn!(provider = %name, op, symbol, attempt, error = %e, "provider call failed");
                    }
                    Err(_) => {
                        warn!(
                            provider = %name,
                            op,
                            symbol,
                            attempt,
                            timeout_ms = self.config.request_timeout.as_millis() as u64,
                            "provider call timed out"
                        );
                    }
                }

                if attempt < self.config.max_retries {
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
            }
        }

        warn!(symbol, op, "all providers exhausted");
        Err(TradeError::data_unavailable(symbol))
    }
}
