//! Per-provider rate limiting.
//!
//! One `governor` token bucket per provider, built once from configuration
//! and shared across every symbol routed through that provider. Acquisition
//! is non-blocking: an empty bucket reports `RateLimitExceeded` so the
//! router can fall through to the next provider instead of stalling the
//! cycle.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

use optrade_core::error::{Result, TradeError};

/// Type alias for the governor rate limiter.
type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Registry of provider token buckets.
///
/// Constructed once at startup and handed to the router; providers without
/// an entry are treated as unlimited.
#[derive(Clone, Default)]
pub struct LimiterRegistry {
    limiters: HashMap<String, Arc<DirectLimiter>>,
}

impl LimiterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from per-provider requests-per-minute budgets.
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::InvalidConfig`] for a zero budget.
    pub fn from_config<'a, I>(rate_limits: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a String, &'a u32)>,
    {
        let mut registry = Self::new();
        for (provider, rpm) in rate_limits {
            registry.register(provider, *rpm)?;
        }
        Ok(registry)
    }

    /// Registers (or replaces) a provider's token bucket.
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::InvalidConfig`] when `requests_per_minute` is
    /// zero.
    pub fn register(&mut self, provider: &str, requests_per_minute: u32) -> Result<()> {
        let rpm = NonZeroU32::new(requests_per_minute).ok_or_else(|| {
            TradeError::InvalidConfig(format!(
                "rate limit for provider {provider} must be non-zero"
            ))
        })?;
        let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));
        self.limiters.insert(provider.to_string(), limiter);
        Ok(())
    }

    /// Tries to take one token from a provider's bucket without waiting.
    ///
    /// Providers with no registered bucket are unlimited and always
    /// succeed.
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::RateLimitExceeded`] when the bucket is empty.
    pub fn try_acquire(&self, provider: &str) -> Result<()> {
        match self.limiters.get(provider) {
            Some(limiter) => limiter
                .check()
                .map_err(|_| TradeError::rate_limited(provider)),
            None => Ok(()),
        }
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}

impl std::fmt::Debug for LimiterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterRegistry")
            .field("providers", &self.limiters.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_provider_is_unlimited() {
        let registry = LimiterRegistry::new();
        for _ in 0..100 {
            assert!(registry.try_acquire("anything").is_ok());
        }
    }

    #[test]
    fn zero_budget_is_invalid() {
        let mut registry = LimiterRegistry::new();
        assert!(matches!(
            registry.register("polygon", 0),
            Err(TradeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn empty_bucket_reports_rate_limit() {
        let mut registry = LimiterRegistry::new();
        registry.register("polygon", 1).unwrap();

        assert!(registry.try_acquire("polygon").is_ok());
        assert!(matches!(
            registry.try_acquire("polygon"),
            Err(TradeError::RateLimitExceeded { .. })
        ));
    }

    #[test]
    fn buckets_are_per_provider() {
        let mut registry = LimiterRegistry::new();
        registry.register("polygon", 1).unwrap();
        registry.register("finnhub", 1).unwrap();

        assert!(registry.try_acquire("polygon").is_ok());
        // Draining polygon leaves finnhub untouched.
        assert!(registry.try_acquire("finnhub").is_ok());
    }

    #[test]
    fn from_config_registers_every_entry() {
        let limits = [("a".to_string(), 10_u32), ("b".to_string(), 20_u32)];
        let map: std::collections::BTreeMap<String, u32> = limits.into_iter().collect();
        let registry = LimiterRegistry::from_config(map.iter()).unwrap();
        assert_eq!(registry.len(), 2);
    }
}
