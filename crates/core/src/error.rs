//! Error taxonomy for the trading system.
//!
//! Only `InvalidConfig` is fatal; every other category is handled locally
//! (symbol skipped for the cycle, provider fallback, or retry on the next
//! cycle) and must never bring the decision loop down.

use thiserror::Error;

/// Errors produced by the decision-and-lifecycle core.
#[derive(Debug, Error)]
pub enum TradeError {
    /// Every configured provider failed or timed out for a symbol this
    /// cycle. Callers treat this as "no update", never as fatal.
    #[error("data unavailable for {symbol}")]
    DataUnavailable { symbol: String },

    /// An indicator window has not finished warming up; the symbol is
    /// skipped silently for the cycle.
    #[error("insufficient data for {indicator}: have {have} bars, need {need}")]
    InsufficientData {
        indicator: String,
        need: usize,
        have: usize,
    },

    /// Malformed or out-of-range configuration. Fatal at startup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A provider's token bucket is empty. Internal signal that triggers
    /// fallback; escalates to `DataUnavailable` only once the whole chain
    /// is exhausted.
    #[error("rate limit exceeded for provider {provider}")]
    RateLimitExceeded { provider: String },

    /// The trading platform rejected, timed out, or partially filled an
    /// order. Filled legs have been unwound; position state is unchanged.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// A strategy plan whose legs do not match its structure template.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

impl TradeError {
    /// Creates a data-unavailable error for a symbol.
    pub fn data_unavailable(symbol: impl Into<String>) -> Self {
        Self::DataUnavailable {
            symbol: symbol.into(),
        }
    }

    /// Creates an insufficient-data error for a warming-up indicator.
    pub fn insufficient_data(indicator: impl Into<String>, need: usize, have: usize) -> Self {
        Self::InsufficientData {
            indicator: indicator.into(),
            need,
            have,
        }
    }

    /// Creates a rate-limit error for a provider.
    pub fn rate_limited(provider: impl Into<String>) -> Self {
        Self::RateLimitExceeded {
            provider: provider.into(),
        }
    }

    /// Creates an execution-failure error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::ExecutionFailed(message.into())
    }

    /// True for errors that may succeed on a later cycle without any
    /// intervention.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::DataUnavailable { .. }
                | Self::RateLimitExceeded { .. }
                | Self::InsufficientData { .. }
                | Self::ExecutionFailed(_)
        )
    }

    /// True for errors that must abort startup.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }
}

/// Result type alias for trading operations.
pub type Result<T> = std::result::Result<T, TradeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_unavailable_names_the_symbol() {
        let err = TradeError::data_unavailable("AAPL");
        assert!(err.to_string().contains("AAPL"));
        assert!(err.is_transient());
        assert!(!err.is_fatal());
    }

    #[test]
    fn insufficient_data_reports_progress() {
        let err = TradeError::insufficient_data("SMA200", 200, 57);
        let display = err.to_string();
        assert!(display.contains("SMA200"));
        assert!(display.contains("200"));
        assert!(display.contains("57"));
        assert!(err.is_transient());
    }

    #[test]
    fn invalid_config_is_fatal() {
        let err = TradeError::InvalidConfig("signal_threshold out of range".to_string());
        assert!(err.is_fatal());
        assert!(!err.is_transient());
    }

    #[test]
    fn rate_limit_is_transient() {
        let err = TradeError::rate_limited("polygon");
        assert!(err.to_string().contains("polygon"));
        assert!(err.is_transient());
    }

    #[test]
    fn execution_failure_is_retried_next_cycle() {
        let err = TradeError::execution("leg 3 rejected");
        assert!(err.to_string().contains("leg 3 rejected"));
        assert!(err.is_transient());
    }
}
