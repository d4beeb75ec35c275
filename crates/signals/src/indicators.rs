//! Incremental technical indicators.
//!
//! Each symbol keeps the minimal trailing window per indicator (rolling
//! sums, recursive EMAs); appending one bar updates every indicator in
//! O(1) without touching earlier history. An indicator short of its window
//! publishes `Warmup`, never zero, so callers skip the symbol instead of
//! trading on garbage.

use std::collections::{BTreeMap, HashMap, VecDeque};

use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use optrade_core::config::IndicatorConfig;
use optrade_core::error::{Result, TradeError};
use optrade_core::types::MarketBar;

/// A published indicator value, or its warm-up progress.
#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue<T> {
    Ready(T),
    Warmup { need: usize, have: usize },
}

impl<T> IndicatorValue<T> {
    /// The value when ready.
    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Warmup { .. } => None,
        }
    }

    /// The value, or `InsufficientData` naming the indicator.
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::InsufficientData`] while warming up.
    pub fn require(&self, name: &str) -> Result<&T> {
        match self {
            Self::Ready(value) => Ok(value),
            Self::Warmup { need, have } => {
                Err(TradeError::insufficient_data(name, *need, *have))
            }
        }
    }
}

/// MACD line, signal line, and histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValue {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Bollinger bands with band-width history for expansion detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerValue {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// (upper - lower) / middle for the current bar.
    pub width: f64,
    /// Band width one bar earlier.
    pub prev_width: f64,
}

/// Latest indicator values for one symbol.
///
/// Owned and mutated only by [`IndicatorEngine`]; everything else reads
/// snapshots.
#[derive(Debug, Clone)]
pub struct IndicatorSet {
    pub symbol: String,
    pub bars_seen: usize,
    pub sma: BTreeMap<usize, IndicatorValue<f64>>,
    pub ema: BTreeMap<usize, IndicatorValue<f64>>,
    pub macd: IndicatorValue<MacdValue>,
    pub rsi: IndicatorValue<f64>,
    pub bollinger: IndicatorValue<BollingerValue>,
}

impl IndicatorSet {
    /// SMA for a configured period.
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::InsufficientData`] while the window fills (or
    /// for an unconfigured period).
    pub fn sma(&self, period: usize) -> Result<f64> {
        match self.sma.get(&period) {
            Some(value) => value.require(&format!("SMA{period}")).copied(),
            None => Err(TradeError::insufficient_data(
                format!("SMA{period}"),
                period,
                0,
            )),
        }
    }

    /// EMA for a configured period.
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::InsufficientData`] while the window fills.
    pub fn ema(&self, period: usize) -> Result<f64> {
        match self.ema.get(&period) {
            Some(value) => value.require(&format!("EMA{period}")).copied(),
            None => Err(TradeError::insufficient_data(
                format!("EMA{period}"),
                period,
                0,
            )),
        }
    }
}

/// Rolling mean over a fixed window, maintained with a running sum.
#[derive(Debug, Clone)]
struct RollingMean {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
}

impl RollingMean {
    fn new(period: usize) -> Self {
        Self {
            period,
            window: VecDeque::with_capacity(period + 1),
            sum: 0.0,
        }
    }

    fn push(&mut self, value: f64) {
        self.window.push_back(value);
        self.sum += value;
        if self.window.len() > self.period {
            if let Some(evicted) = self.window.pop_front() {
                self.sum -= evicted;
            }
        }
    }

    fn value(&self) -> Option<f64> {
        if self.window.len() >= self.period {
            Some(self.sum / self.period as f64)
        } else {
            None
        }
    }
}

/// Recursive EMA seeded from the first sample; published only once
/// `period` samples have arrived.
#[derive(Debug, Clone)]
struct Ema {
    period: usize,
    k: f64,
    value: Option<f64>,
    count: usize,
}

impl Ema {
    fn new(period: usize) -> Self {
        Self {
            period,
            k: 2.0 / (period as f64 + 1.0),
            value: None,
            count: 0,
        }
    }

    fn push(&mut self, sample: f64) {
        self.count += 1;
        self.value = Some(match self.value {
            None => sample,
            Some(prev) => sample * self.k + prev * (1.0 - self.k),
        });
    }

    fn current(&self) -> Option<f64> {
        self.value
    }

    fn published(&self) -> Option<f64> {
        if self.count >= self.period {
            self.value
        } else {
            None
        }
    }
}

/// RSI using the simple rolling-mean gain/loss formulation. Needs
/// `period + 1` closes (one for the first diff).
#[derive(Debug, Clone)]
struct Rsi {
    prev_close: Option<f64>,
    gains: RollingMean,
    losses: RollingMean,
}

impl Rsi {
    fn new(period: usize) -> Self {
        Self {
            prev_close: None,
            gains: RollingMean::new(period),
            losses: RollingMean::new(period),
        }
    }

    fn push(&mut self, close: f64) {
        if let Some(prev) = self.prev_close {
            let delta = close - prev;
            self.gains.push(delta.max(0.0));
            self.losses.push((-delta).max(0.0));
        }
        self.prev_close = Some(close);
    }

    fn value(&self) -> Option<f64> {
        let avg_gain = self.gains.value()?;
        let avg_loss = self.losses.value()?;
        if avg_loss == 0.0 {
            return Some(100.0);
        }
        let rs = avg_gain / avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }
}

/// Bollinger bands over a rolling window with running sum-of-squares,
/// sample standard deviation.
#[derive(Debug, Clone)]
struct Bollinger {
    period: usize,
    std_mult: f64,
    window: VecDeque<f64>,
    sum: f64,
    sum_sq: f64,
    width: Option<f64>,
    prev_width: Option<f64>,
}

impl Bollinger {
    fn new(period: usize, std_mult: f64) -> Self {
        Self {
            period,
            std_mult,
            window: VecDeque::with_capacity(period + 1),
            sum: 0.0,
            sum_sq: 0.0,
            width: None,
            prev_width: None,
        }
    }

    fn push(&mut self, close: f64) {
        self.window.push_back(close);
        self.sum += close;
        self.sum_sq += close * close;
        if self.window.len() > self.period {
            if let Some(evicted) = self.window.pop_front() {
                self.sum -= evicted;
                self.sum_sq -= evicted * evicted;
            }
        }
        if let Some((_, _, _, width)) = self.bands() {
            self.prev_width = self.width;
            self.width = Some(width);
        }
    }

    fn bands(&self) -> Option<(f64, f64, f64, f64)> {
        if self.window.len() < self.period {
            return None;
        }
        let n = self.period as f64;
        let mean = self.sum / n;
        let variance = ((self.sum_sq - self.sum * self.sum / n) / (n - 1.0)).max(0.0);
        let std = variance.sqrt();
        let upper = mean + self.std_mult * std;
        let lower = mean - self.std_mult * std;
        let width = if mean.abs() > f64::EPSILON {
            (upper - lower) / mean
        } else {
            0.0
        };
        Some((upper, mean, lower, width))
    }

    fn value(&self) -> Option<BollingerValue> {
        let (upper, middle, lower, width) = self.bands()?;
        Some(BollingerValue {
            upper,
            middle,
            lower,
            width,
            prev_width: self.prev_width?,
        })
    }
}

#[derive(Debug, Clone)]
struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
}

impl Macd {
    fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
        }
    }

    fn push(&mut self, close: f64) {
        self.fast.push(close);
        self.slow.push(close);
        if let (Some(fast), Some(slow)) = (self.fast.current(), self.slow.current()) {
            self.signal.push(fast - slow);
        }
    }

    fn value(&self) -> Option<MacdValue> {
        // Published once the slow window has filled; the signal EMA has
        // been fed since the first bar.
        self.slow.published()?;
        let line = self.fast.current()? - self.slow.current()?;
        let signal = self.signal.published()?;
        Some(MacdValue {
            line,
            signal,
            histogram: line - signal,
        })
    }

    fn need(&self) -> usize {
        self.slow.period.max(self.signal.period)
    }
}

#[derive(Debug, Clone)]
struct SymbolState {
    bars_seen: usize,
    sma: BTreeMap<usize, RollingMean>,
    ema: BTreeMap<usize, Ema>,
    macd: Macd,
    rsi: Rsi,
    bollinger: Bollinger,
}

impl SymbolState {
    fn new(config: &IndicatorConfig) -> Self {
        Self {
            bars_seen: 0,
            sma: config
                .sma_periods
                .iter()
                .map(|p| (*p, RollingMean::new(*p)))
                .collect(),
            ema: config
                .ema_periods
                .iter()
                .map(|p| (*p, Ema::new(*p)))
                .collect(),
            macd: Macd::new(
                config.macd.fast_period,
                config.macd.slow_period,
                config.macd.signal_period,
            ),
            rsi: Rsi::new(config.rsi_period),
            bollinger: Bollinger::new(config.bollinger_period, config.bollinger_std),
        }
    }
}

/// Computes indicators for every tracked symbol, one bar at a time.
pub struct IndicatorEngine {
    config: IndicatorConfig,
    states: HashMap<String, SymbolState>,
}

impl IndicatorEngine {
    #[must_use]
    pub fn new(config: IndicatorConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    /// Appends one bar for its symbol, updating every indicator
    /// incrementally.
    pub fn apply_bar(&mut self, bar: &MarketBar) {
        let Some(close) = bar.close.to_f64() else {
            debug!(symbol = bar.symbol, "bar close not representable, skipped");
            return;
        };
        let state = self
            .states
            .entry(bar.symbol.clone())
            .or_insert_with(|| SymbolState::new(&self.config));

        state.bars_seen += 1;
        for mean in state.sma.values_mut() {
            mean.push(close);
        }
        for ema in state.ema.values_mut() {
            ema.push(close);
        }
        state.macd.push(close);
        state.rsi.push(close);
        state.bollinger.push(close);
    }

    /// Snapshot of the latest indicator values for a symbol. `None` until
    /// the first bar arrives.
    #[must_use]
    pub fn snapshot(&self, symbol: &str) -> Option<IndicatorSet> {
        let state = self.states.get(symbol)?;
        let have = state.bars_seen;

        let publish = |need: usize, value: Option<f64>| match value {
            Some(v) => IndicatorValue::Ready(v),
            None => IndicatorValue::Warmup { need, have },
        };

        Some(IndicatorSet {
            symbol: symbol.to_string(),
            bars_seen: have,
            sma: state
                .sma
                .iter()
                .map(|(period, mean)| (*period, publish(*period, mean.value())))
                .collect(),
            ema: state
                .ema
                .iter()
                .map(|(period, ema)| (*period, publish(*period, ema.published())))
                .collect(),
            macd: match state.macd.value() {
                Some(v) => IndicatorValue::Ready(v),
                None => IndicatorValue::Warmup {
                    need: state.macd.need(),
                    have,
                },
            },
            rsi: publish(self.config.rsi_period + 1, state.rsi.value()),
            bollinger: match state.bollinger.value() {
                Some(v) => IndicatorValue::Ready(v),
                // One extra bar for the band-width history.
                None => IndicatorValue::Warmup {
                    need: self.config.bollinger_period + 1,
                    have,
                },
            },
        })
    }

    /// Bars consumed for a symbol so far.
    #[must_use]
    pub fn bars_seen(&self, symbol: &str) -> usize {
        self.states.get(symbol).map_or(0, |s| s.bars_seen)
    }
}
