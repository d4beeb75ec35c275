//! Signal generation from indicator snapshots.
//!
//! Trend, momentum, and volatility families produce integer sub-scores;
//! a weighted composite compared against the signal threshold yields the
//! direction. With confirmation required, at least two families must agree
//! with the composite's sign or the signal is forced neutral.

use chrono::{DateTime, Utc};
use tracing::debug;

use optrade_core::config::{IndicatorConfig, SignalConfig};
use optrade_core::error::Result;
use optrade_core::types::{FamilyScores, Signal, SignalDirection};

use crate::indicators::IndicatorSet;

/// Deterministic signal generator: identical indicator sets and
/// configuration always produce identical signals.
pub struct SignalGenerator {
    signals: SignalConfig,
    indicators: IndicatorConfig,
}

impl SignalGenerator {
    #[must_use]
    pub fn new(signals: SignalConfig, indicators: IndicatorConfig) -> Self {
        Self {
            signals,
            indicators,
        }
    }

    /// Evaluates one symbol's indicator snapshot into a signal.
    ///
    /// # Errors
    ///
    /// Returns [`optrade_core::TradeError::InsufficientData`] while any
    /// enabled family's indicators are warming up; the caller skips the
    /// symbol for this cycle.
    pub fn evaluate(&self, set: &IndicatorSet, timestamp: DateTime<Utc>) -> Result<Signal> {
        let scores = FamilyScores {
            trend: self.trend_score(set)?,
            momentum: self.momentum_score(set)?,
            volatility: self.volatility_score(set)?,
        };

        let composite = self.signals.trend_weight * scores.trend
            + self.signals.momentum_weight * scores.momentum
            + self.signals.volatility_weight * scores.volatility;
        let strength = composite.clamp(-1.0, 1.0);

        let mut direction = if composite > self.signals.signal_threshold {
            SignalDirection::Bullish
        } else if composite < -self.signals.signal_threshold {
            SignalDirection::Bearish
        } else {
            SignalDirection::Neutral
        };

        if self.signals.confirmation_required && direction != SignalDirection::Neutral {
            let sign = if direction == SignalDirection::Bullish {
                1.0
            } else {
                -1.0
            };
            let agreeing = [scores.trend, scores.momentum, scores.volatility]
                .iter()
                .filter(|score| **score * sign > 0.0)
                .count();
            if agreeing < 2 {
                debug!(
                    symbol = set.symbol,
                    agreeing, "confirmation failed, forcing neutral"
                );
                direction = SignalDirection::Neutral;
            }
        }

        Ok(Signal {
            symbol: set.symbol.clone(),
            direction,
            strength,
            timestamp,
            scores,
        })
    }

    /// Short SMA above long SMA is bullish trend, below is bearish.
    fn trend_score(&self, set: &IndicatorSet) -> Result<f64> {
        if !self.indicators.use_sma {
            return Ok(0.0);
        }
        let mut periods = self.indicators.sma_periods.clone();
        periods.sort_unstable();
        let short = set.sma(periods[0])?;
        let long = set.sma(periods[1])?;
        Ok(if short > long {
            1.0
        } else if short < long {
            -1.0
        } else {
            0.0
        })
    }

    /// RSI extremes plus MACD line vs signal line; each contributes ±1.
    fn momentum_score(&self, set: &IndicatorSet) -> Result<f64> {
        let mut score = 0.0;
        if self.indicators.use_rsi {
            let rsi = *set.rsi.require("RSI")?;
            if rsi < 30.0 {
                score += 1.0; // oversold
            } else if rsi > 70.0 {
                score -= 1.0; // overbought
            }
        }
        if self.indicators.use_macd {
            let macd = set.macd.require("MACD")?;
            if macd.line > macd.signal {
                score += 1.0;
            } else if macd.line < macd.signal {
                score -= 1.0;
            }
        }
        Ok(score)
    }

    /// Bollinger band width expanding (+1) or contracting (-1).
    fn volatility_score(&self, set: &IndicatorSet) -> Result<f64> {
        if !self.indicators.use_bollinger {
            return Ok(0.0);
        }
        let bands = set.bollinger.require("Bollinger")?;
        Ok(if bands.width > bands.prev_width {
            1.0
        } else {
            -1.0
        })
    }
}
