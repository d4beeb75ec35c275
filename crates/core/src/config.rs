//! Versioned configuration profile.
//!
//! Every field except `version` is optional and defaulted; `validate`
//! rejects out-of-range values with `InvalidConfig` before the engine
//! starts. A loaded profile is an immutable snapshot for the cycles it
//! governs — plans snapshot their exit thresholds from it at creation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TradeError};
use crate::types::StructureKind;

/// Top-level configuration profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigProfile {
    /// Document version identifier. The only required field.
    pub version: String,
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub technical_indicators: IndicatorConfig,
    #[serde(default)]
    pub signals: SignalConfig,
    #[serde(default)]
    pub options: OptionsConfig,
    #[serde(default)]
    pub greeks: GreekConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

impl Default for ConfigProfile {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            general: GeneralConfig::default(),
            technical_indicators: IndicatorConfig::default(),
            signals: SignalConfig::default(),
            options: OptionsConfig::default(),
            greeks: GreekConfig::default(),
            data: DataConfig::default(),
            engine: EngineConfig::default(),
            backtest: BacktestConfig::default(),
        }
    }
}

/// Account-level risk settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Fraction of capital risked per trade.
    pub risk_per_trade: f64,
    /// Hard cap on concurrently open positions.
    pub max_positions: usize,
    /// Fraction of buying power allocated per position.
    pub position_size: f64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            risk_per_trade: 0.02,
            max_positions: 5,
            position_size: 0.1,
        }
    }
}

/// MACD window parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MacdParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
        }
    }
}

/// Technical-indicator windows and switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub use_sma: bool,
    pub use_ema: bool,
    pub use_macd: bool,
    pub use_rsi: bool,
    pub use_bollinger: bool,
    pub sma_periods: Vec<usize>,
    pub ema_periods: Vec<usize>,
    pub macd: MacdParams,
    pub rsi_period: usize,
    pub bollinger_period: usize,
    pub bollinger_std: f64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            use_sma: true,
            use_ema: true,
            use_macd: true,
            use_rsi: true,
            use_bollinger: true,
            sma_periods: vec![20, 50, 200],
            ema_periods: vec![12, 26],
            macd: MacdParams::default(),
            rsi_period: 14,
            bollinger_period: 20,
            bollinger_std: 2.0,
        }
    }
}

/// Signal combination weights and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub trend_weight: f64,
    pub momentum_weight: f64,
    pub volatility_weight: f64,
    /// Composite score magnitude required for a non-neutral direction.
    pub signal_threshold: f64,
    /// Require two indicator families to agree before emitting direction.
    pub confirmation_required: bool,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            trend_weight: 0.4,
            momentum_weight: 0.3,
            volatility_weight: 0.3,
            signal_threshold: 0.2,
            confirmation_required: true,
        }
    }
}

/// Either the automatic strategy table or a forced structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultStrategy {
    Auto,
    LongCall,
    LongPut,
    BullPutSpread,
    BearCallSpread,
    CallCreditSpread,
    PutCreditSpread,
    IronCondor,
    LongStraddle,
}

impl DefaultStrategy {
    /// The structure this override forces, or `None` for automatic
    /// table-driven selection.
    #[must_use]
    pub const fn forced(self) -> Option<StructureKind> {
        match self {
            Self::Auto => None,
            Self::LongCall => Some(StructureKind::LongCall),
            Self::LongPut => Some(StructureKind::LongPut),
            Self::BullPutSpread => Some(StructureKind::BullPutSpread),
            Self::BearCallSpread => Some(StructureKind::BearCallSpread),
            Self::CallCreditSpread => Some(StructureKind::CallCreditSpread),
            Self::PutCreditSpread => Some(StructureKind::PutCreditSpread),
            Self::IronCondor => Some(StructureKind::IronCondor),
            Self::LongStraddle => Some(StructureKind::LongStraddle),
        }
    }
}

/// One directional row of the strategy table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionalRow {
    pub low_iv: StructureKind,
    pub high_iv: StructureKind,
    pub iv_threshold: f64,
}

impl Default for DirectionalRow {
    fn default() -> Self {
        Self {
            low_iv: StructureKind::LongCall,
            high_iv: StructureKind::BullPutSpread,
            iv_threshold: 0.5,
        }
    }
}

/// The neutral row of the strategy table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct NeutralRow {
    pub default: StructureKind,
}

impl Default for NeutralRow {
    fn default() -> Self {
        Self {
            default: StructureKind::IronCondor,
        }
    }
}

/// Closed (direction, IV regime) -> structure mapping. Unknown structure
/// names fail deserialization, so a bad table dies at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyTable {
    pub bullish: DirectionalRow,
    pub bearish: DirectionalRow,
    pub neutral: NeutralRow,
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self {
            bullish: DirectionalRow {
                low_iv: StructureKind::LongCall,
                high_iv: StructureKind::BullPutSpread,
                iv_threshold: 0.5,
            },
            bearish: DirectionalRow {
                low_iv: StructureKind::LongPut,
                high_iv: StructureKind::BearCallSpread,
                iv_threshold: 0.5,
            },
            neutral: NeutralRow::default(),
        }
    }
}

/// Expiration selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationPolicy {
    /// Nearest upcoming expiration.
    Nearest,
    /// Nearest monthly-cycle (third Friday) expiration.
    Monthly,
    /// Nearest expiration within a week, falling back to nearest.
    Weekly,
}

/// ITM/OTM strike offsets as fractions of the underlying price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct StrikeSelection {
    pub call_itm_pct: f64,
    pub call_otm_pct: f64,
    pub put_itm_pct: f64,
    pub put_otm_pct: f64,
}

impl Default for StrikeSelection {
    fn default() -> Self {
        Self {
            call_itm_pct: 0.03,
            call_otm_pct: 0.05,
            put_itm_pct: 0.03,
            put_otm_pct: 0.05,
        }
    }
}

/// Options structure selection and exit rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsConfig {
    pub default_strategy: DefaultStrategy,
    /// Close when the position loses this fraction of its entry value.
    pub stop_loss_pct: f64,
    /// Close when the position gains this fraction of its entry value.
    pub take_profit_pct: f64,
    /// Maximum holding period in days, snapshotted into each plan.
    pub max_days_to_hold: i64,
    pub strategy_selection: StrategyTable,
    pub expiration_selection: ExpirationPolicy,
    pub strike_selection: StrikeSelection,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            default_strategy: DefaultStrategy::Auto,
            stop_loss_pct: 0.5,
            take_profit_pct: 1.0,
            max_days_to_hold: 14,
            strategy_selection: StrategyTable::default(),
            expiration_selection: ExpirationPolicy::Nearest,
            strike_selection: StrikeSelection::default(),
        }
    }
}

/// Directional bias on implied volatility, steering neutral structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityBias {
    Increasing,
    Decreasing,
    Neutral,
}

/// The greeks a scorer may consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GreekKind {
    Delta,
    Gamma,
    Theta,
    Vega,
}

/// How per-greek component scores combine into a ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CombinationRule {
    /// Weighted sum of component scores.
    Weighted {
        #[serde(default)]
        delta: f64,
        #[serde(default)]
        gamma: f64,
        #[serde(default)]
        theta: f64,
        #[serde(default)]
        vega: f64,
    },
    /// Strict lexicographic priority over component scores.
    Priority { order: Vec<GreekKind> },
}

impl CombinationRule {
    /// The classic directional blend: delta 0.5, gamma 0.3, theta 0.2.
    #[must_use]
    pub const fn directional_default() -> Self {
        Self::Weighted {
            delta: 0.5,
            gamma: 0.3,
            theta: 0.2,
            vega: 0.0,
        }
    }
}

/// Per-structure-class combination rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GreekScoring {
    pub directional: CombinationRule,
    pub long_premium: CombinationRule,
    pub credit: CombinationRule,
}

impl Default for GreekScoring {
    fn default() -> Self {
        Self {
            directional: CombinationRule::directional_default(),
            long_premium: CombinationRule::Weighted {
                delta: 0.0,
                gamma: 0.1,
                theta: 0.3,
                vega: 0.6,
            },
            credit: CombinationRule::Weighted {
                delta: 0.4,
                gamma: 0.0,
                theta: 0.4,
                vega: 0.2,
            },
        }
    }
}

/// Greek-optimization thresholds and liquidity floors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GreekConfig {
    /// Enables greek-optimized contract selection when chain data carries
    /// greeks; static strike offsets are used otherwise.
    pub enabled: bool,
    /// Target |delta| for directional legs.
    pub delta_target: f64,
    /// Target |delta| for short legs of credit structures.
    pub short_delta_target: f64,
    /// Gamma at or above this level scores full marks.
    pub gamma_floor: f64,
    /// Theta at or above this level (less decay) favors long premium.
    pub theta_floor: f64,
    /// Theta at or below this level (more decay) favors credit structures.
    pub theta_ceiling: f64,
    /// Vega at or above this level scores full marks when bias is
    /// increasing.
    pub vega_floor: f64,
    pub min_open_interest: u64,
    pub min_volume: u64,
    /// Maximum bid-ask spread as a fraction of mid price.
    pub max_spread_fraction: f64,
    pub volatility_bias: VolatilityBias,
    pub scoring: GreekScoring,
}

impl Default for GreekConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delta_target: 0.5,
            short_delta_target: 0.25,
            gamma_floor: 0.1,
            theta_floor: -0.1,
            theta_ceiling: -0.05,
            vega_floor: 0.2,
            min_open_interest: 100,
            min_volume: 10,
            max_spread_fraction: 0.1,
            volatility_bias: VolatilityBias::Neutral,
            scoring: GreekScoring::default(),
        }
    }
}

/// Data routing: provider priority lists and rate limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Stock data providers, in fallback priority order. The last entry
    /// should be a no-credential provider so the chain always terminates.
    pub stock_providers: Vec<String>,
    /// Options chain providers, in fallback priority order.
    pub options_providers: Vec<String>,
    /// Requests per minute allowed per provider.
    pub rate_limits: BTreeMap<String, u32>,
    pub request_timeout_secs: u64,
    /// Attempts per provider per call before falling through.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Vendor-convention history period (e.g., "3mo").
    pub history_period: String,
    /// Vendor-convention bar interval (e.g., "1d").
    pub history_interval: String,
    /// Directory the replay provider reads bars and chain snapshots from.
    pub replay_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        let mut rate_limits = BTreeMap::new();
        rate_limits.insert("replay".to_string(), 120);
        Self {
            stock_providers: vec!["replay".to_string()],
            options_providers: vec!["replay".to_string()],
            rate_limits,
            request_timeout_secs: 10,
            max_retries: 1,
            retry_backoff_ms: 250,
            history_period: "3mo".to_string(),
            history_interval: "1d".to_string(),
            replay_dir: PathBuf::from("data"),
        }
    }
}

/// Decision-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub symbols: Vec<String>,
    pub cycle_interval_secs: u64,
    /// Directory for the atomic state snapshot (system of record).
    pub state_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: vec![
                "AAPL".to_string(),
                "MSFT".to_string(),
                "GOOGL".to_string(),
                "AMZN".to_string(),
                "TSLA".to_string(),
            ],
            cycle_interval_secs: 60,
            state_dir: PathBuf::from("state"),
        }
    }
}

/// Capital and friction assumptions; feeds risk-based position sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub commission_per_contract: f64,
    pub slippage_pct: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            commission_per_contract: 0.65,
            slippage_pct: 0.01,
        }
    }
}

fn check(condition: bool, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(TradeError::InvalidConfig(message.to_string()))
    }
}

fn check_fraction(value: f64, name: &str) -> Result<()> {
    check(
        value.is_finite() && value > 0.0 && value <= 1.0,
        &format!("{name} must be in (0, 1], got {value}"),
    )
}

impl ConfigProfile {
    /// Validates every section, returning `InvalidConfig` on the first
    /// out-of-range value. A profile that fails here aborts startup with a
    /// non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        check(!self.version.trim().is_empty(), "version must not be empty")?;

        check_fraction(self.general.risk_per_trade, "general.risk_per_trade")?;
        check_fraction(self.general.position_size, "general.position_size")?;
        check(
            self.general.max_positions >= 1,
            "general.max_positions must be at least 1",
        )?;

        let ind = &self.technical_indicators;
        if ind.use_sma {
            check(
                ind.sma_periods.len() >= 2,
                "technical_indicators.sma_periods needs at least two periods",
            )?;
            check(
                ind.sma_periods.iter().all(|p| *p >= 2),
                "technical_indicators.sma_periods must all be >= 2",
            )?;
        }
        if ind.use_ema {
            check(
                !ind.ema_periods.is_empty() && ind.ema_periods.iter().all(|p| *p >= 2),
                "technical_indicators.ema_periods must be non-empty with periods >= 2",
            )?;
        }
        if ind.use_macd {
            check(
                ind.macd.fast_period >= 2 && ind.macd.fast_period < ind.macd.slow_period,
                "technical_indicators.macd fast_period must be >= 2 and below slow_period",
            )?;
            check(
                ind.macd.signal_period >= 1,
                "technical_indicators.macd signal_period must be >= 1",
            )?;
        }
        if ind.use_rsi {
            check(
                ind.rsi_period >= 2,
                "technical_indicators.rsi_period must be >= 2",
            )?;
        }
        if ind.use_bollinger {
            check(
                ind.bollinger_period >= 2,
                "technical_indicators.bollinger_period must be >= 2",
            )?;
            check(
                ind.bollinger_std.is_finite() && ind.bollinger_std > 0.0,
                "technical_indicators.bollinger_std must be positive",
            )?;
        }

        let sig = &self.signals;
        for (value, name) in [
            (sig.trend_weight, "signals.trend_weight"),
            (sig.momentum_weight, "signals.momentum_weight"),
            (sig.volatility_weight, "signals.volatility_weight"),
        ] {
            check(
                value.is_finite() && (0.0..=1.0).contains(&value),
                &format!("{name} must be in [0, 1], got {value}"),
            )?;
        }
        check(
            sig.trend_weight + sig.momentum_weight + sig.volatility_weight > 0.0,
            "signals weights must not all be zero",
        )?;
        check_fraction(sig.signal_threshold, "signals.signal_threshold")?;

        let opt = &self.options;
        check(
            opt.stop_loss_pct.is_finite() && opt.stop_loss_pct > 0.0,
            "options.stop_loss_pct must be positive",
        )?;
        check(
            opt.take_profit_pct.is_finite() && opt.take_profit_pct > 0.0,
            "options.take_profit_pct must be positive",
        )?;
        check(
            opt.max_days_to_hold >= 1,
            "options.max_days_to_hold must be at least 1 day",
        )?;
        for (value, name) in [
            (opt.strike_selection.call_itm_pct, "call_itm_pct"),
            (opt.strike_selection.call_otm_pct, "call_otm_pct"),
            (opt.strike_selection.put_itm_pct, "put_itm_pct"),
            (opt.strike_selection.put_otm_pct, "put_otm_pct"),
        ] {
            check(
                value.is_finite() && value > 0.0 && value < 1.0,
                &format!("options.strike_selection.{name} must be in (0, 1), got {value}"),
            )?;
        }
        for (row, name) in [
            (&opt.strategy_selection.bullish, "bullish"),
            (&opt.strategy_selection.bearish, "bearish"),
        ] {
            check(
                row.iv_threshold.is_finite() && row.iv_threshold > 0.0,
                &format!("options.strategy_selection.{name}.iv_threshold must be positive"),
            )?;
        }

        let greeks = &self.greeks;
        check_fraction(greeks.max_spread_fraction, "greeks.max_spread_fraction")?;
        check(
            greeks.delta_target > 0.0 && greeks.delta_target <= 1.0,
            "greeks.delta_target must be in (0, 1]",
        )?;
        check(
            greeks.short_delta_target > 0.0 && greeks.short_delta_target <= 1.0,
            "greeks.short_delta_target must be in (0, 1]",
        )?;
        check(
            greeks.gamma_floor > 0.0,
            "greeks.gamma_floor must be positive",
        )?;
        check(
            greeks.theta_floor < 0.0,
            "greeks.theta_floor must be negative",
        )?;
        check(
            greeks.theta_ceiling < 0.0,
            "greeks.theta_ceiling must be negative",
        )?;
        check(greeks.vega_floor > 0.0, "greeks.vega_floor must be positive")?;
        for (rule, name) in [
            (&greeks.scoring.directional, "directional"),
            (&greeks.scoring.long_premium, "long_premium"),
            (&greeks.scoring.credit, "credit"),
        ] {
            match rule {
                CombinationRule::Weighted {
                    delta,
                    gamma,
                    theta,
                    vega,
                } => {
                    check(
                        [*delta, *gamma, *theta, *vega]
                            .iter()
                            .all(|w| w.is_finite() && *w >= 0.0),
                        &format!("greeks.scoring.{name} weights must be non-negative"),
                    )?;
                    check(
                        delta + gamma + theta + vega > 0.0,
                        &format!("greeks.scoring.{name} weights must not all be zero"),
                    )?;
                }
                CombinationRule::Priority { order } => {
                    check(
                        !order.is_empty(),
                        &format!("greeks.scoring.{name} priority order must not be empty"),
                    )?;
                    let mut seen = order.clone();
                    seen.sort_by_key(|g| *g as usize);
                    seen.dedup();
                    check(
                        seen.len() == order.len(),
                        &format!("greeks.scoring.{name} priority order must not repeat greeks"),
                    )?;
                }
            }
        }

        let data = &self.data;
        check(
            !data.stock_providers.is_empty(),
            "data.stock_providers must not be empty",
        )?;
        check(
            !data.options_providers.is_empty(),
            "data.options_providers must not be empty",
        )?;
        check(
            data.request_timeout_secs >= 1,
            "data.request_timeout_secs must be at least 1",
        )?;
        for (provider, rpm) in &data.rate_limits {
            check(
                *rpm >= 1,
                &format!("data.rate_limits.{provider} must be at least 1 request/minute"),
            )?;
        }
        check(
            period_days(&data.history_period).is_some(),
            &format!(
                "data.history_period '{}' is not a valid period",
                data.history_period
            ),
        )?;
        check(
            interval_minutes(&data.history_interval).is_some(),
            &format!(
                "data.history_interval '{}' is not a valid interval",
                data.history_interval
            ),
        )?;

        check(
            !self.engine.symbols.is_empty(),
            "engine.symbols must not be empty",
        )?;
        check(
            self.engine.cycle_interval_secs >= 1,
            "engine.cycle_interval_secs must be at least 1",
        )?;

        check(
            self.backtest.initial_capital.is_finite() && self.backtest.initial_capital > 0.0,
            "backtest.initial_capital must be positive",
        )?;
        check(
            self.backtest.commission_per_contract.is_finite()
                && self.backtest.commission_per_contract >= 0.0,
            "backtest.commission_per_contract must be non-negative",
        )?;

        Ok(())
    }

    /// Capital risked per trade, in account currency.
    #[must_use]
    pub fn risk_capital(&self) -> f64 {
        self.backtest.initial_capital * self.general.risk_per_trade
    }
}

/// Parses a vendor-convention period string ("5d", "3mo", "1y") into days.
#[must_use]
pub fn period_days(period: &str) -> Option<u32> {
    if let Some(months) = period.strip_suffix("mo") {
        return months.parse::<u32>().ok().map(|n| n * 30);
    }
    if let Some(days) = period.strip_suffix('d') {
        return days.parse::<u32>().ok();
    }
    if let Some(years) = period.strip_suffix('y') {
        return years.parse::<u32>().ok().map(|n| n * 365);
    }
    None
}

/// Parses a vendor-convention interval string ("1m", "1h", "1d") into
/// minutes.
#[must_use]
pub fn interval_minutes(interval: &str) -> Option<u32> {
    if let Some(minutes) = interval.strip_suffix('m') {
        return minutes.parse::<u32>().ok();
    }
    if let Some(hours) = interval.strip_suffix('h') {
        return hours.parse::<u32>().ok().map(|n| n * 60);
    }
    if let Some(days) = interval.strip_suffix('d') {
        return days.parse::<u32>().ok().map(|n| n * 1440);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_validates() {
        let profile = ConfigProfile::default();
        assert!(profile.validate().is_ok());
        assert_eq!(profile.version, "1.0.0");
        assert_eq!(profile.general.max_positions, 5);
    }

    #[test]
    fn partial_document_fills_defaults() {
        let profile: ConfigProfile = toml::from_str(
            r#"
            version = "2.1.0"

            [signals]
            signal_threshold = 0.3
            "#,
        )
        .unwrap();
        assert_eq!(profile.version, "2.1.0");
        assert!((profile.signals.signal_threshold - 0.3).abs() < f64::EPSILON);
        // Untouched sections keep their defaults.
        assert!((profile.signals.trend_weight - 0.4).abs() < f64::EPSILON);
        assert_eq!(profile.options.max_days_to_hold, 14);
    }

    #[test]
    fn missing_version_is_rejected() {
        assert!(toml::from_str::<ConfigProfile>("[general]\n").is_err());
    }

    #[test]
    fn unknown_structure_name_fails_at_load() {
        let result = toml::from_str::<ConfigProfile>(
            r#"
            version = "1.0.0"

            [options.strategy_selection.bullish]
            low_iv = "covered_strangle_butterfly"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn out_of_range_threshold_is_invalid() {
        let mut profile = ConfigProfile::default();
        profile.signals.signal_threshold = 1.5;
        assert!(matches!(
            profile.validate(),
            Err(TradeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn macd_fast_must_be_below_slow() {
        let mut profile = ConfigProfile::default();
        profile.technical_indicators.macd.fast_period = 30;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn zero_max_positions_is_invalid() {
        let mut profile = ConfigProfile::default();
        profile.general.max_positions = 0;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn priority_rule_must_not_repeat_greeks() {
        let mut profile = ConfigProfile::default();
        profile.greeks.scoring.directional = CombinationRule::Priority {
            order: vec![GreekKind::Delta, GreekKind::Delta],
        };
        assert!(profile.validate().is_err());
    }

    #[test]
    fn period_and_interval_parsing() {
        assert_eq!(period_days("3mo"), Some(90));
        assert_eq!(period_days("5d"), Some(5));
        assert_eq!(period_days("1y"), Some(365));
        assert_eq!(period_days("fortnight"), None);
        assert_eq!(interval_minutes("15m"), Some(15));
        assert_eq!(interval_minutes("1h"), Some(60));
        assert_eq!(interval_minutes("1d"), Some(1440));
        assert_eq!(interval_minutes("1w"), None);
    }

    #[test]
    fn expiration_policy_round_trips() {
        let profile: ConfigProfile = toml::from_str(
            r#"
            version = "1.0.0"

            [options]
            expiration_selection = "monthly"
            "#,
        )
        .unwrap();
        assert_eq!(
            profile.options.expiration_selection,
            ExpirationPolicy::Monthly
        );
    }
}
