//! Core market, options, and position types shared across the workspace.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TradeError;

/// A single OHLCV bar for one symbol. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketBar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Directional reading of a symbol for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl SignalDirection {
    /// The opposite directional reading. Neutral has no opposite.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Bullish => Self::Bearish,
            Self::Bearish => Self::Bullish,
            Self::Neutral => Self::Neutral,
        }
    }
}

/// Per-family sub-scores that produced a signal.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FamilyScores {
    pub trend: f64,
    pub momentum: f64,
    pub volatility: f64,
}

/// One trading signal per symbol per cycle.
///
/// A pure function of the indicator set and the config profile: replaying
/// the same inputs always reproduces the same signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: SignalDirection,
    /// Composite score, clamped to [-1, 1].
    pub strength: f64,
    pub timestamp: DateTime<Utc>,
    pub scores: FamilyScores,
}

/// Option right (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRight {
    Call,
    Put,
}

impl std::fmt::Display for OptionRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "C"),
            Self::Put => write!(f, "P"),
        }
    }
}

/// Standard option price sensitivities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

/// A quoted option contract from a chain snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionContract {
    pub symbol: String,
    pub expiry: NaiveDate,
    pub strike: Decimal,
    pub right: OptionRight,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub volume: u64,
    pub open_interest: u64,
    pub implied_volatility: f64,
    /// Present only when the providing vendor supports greeks.
    pub greeks: Option<Greeks>,
}

impl OptionContract {
    /// Midpoint of the quoted spread, falling back to the last trade when
    /// the book is empty.
    #[must_use]
    pub fn mid(&self) -> Decimal {
        if self.ask > Decimal::ZERO {
            (self.bid + self.ask) / Decimal::from(2)
        } else {
            self.last
        }
    }

    /// Bid-ask spread as a fraction of the mid price. Infinite when the
    /// contract has no usable mid, so liquidity filters reject it.
    #[must_use]
    pub fn spread_fraction(&self) -> f64 {
        let mid = self.mid();
        if mid <= Decimal::ZERO {
            return f64::INFINITY;
        }
        let spread = self.ask - self.bid;
        (spread / mid).to_f64().unwrap_or(f64::INFINITY)
    }

    /// Human-readable contract description (e.g., "AAPL 190C 2026-09-18").
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}{} {}", self.symbol, self.strike, self.right, self.expiry)
    }

    /// Whether two contract records refer to the same listed option.
    #[must_use]
    pub fn same_listing(&self, other: &Self) -> bool {
        self.symbol == other.symbol
            && self.expiry == other.expiry
            && self.strike == other.strike
            && self.right == other.right
    }
}

/// A full chain snapshot for one underlying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsChain {
    pub underlying: String,
    pub underlying_price: Decimal,
    /// Sorted, deduplicated expiration dates present in the chain.
    pub expirations: Vec<NaiveDate>,
    pub contracts: Vec<OptionContract>,
}

impl OptionsChain {
    /// Builds a chain from a contract list, deriving the expiration index.
    #[must_use]
    pub fn new(
        underlying: impl Into<String>,
        underlying_price: Decimal,
        contracts: Vec<OptionContract>,
    ) -> Self {
        let mut expirations: Vec<NaiveDate> = contracts.iter().map(|c| c.expiry).collect();
        expirations.sort_unstable();
        expirations.dedup();
        Self {
            underlying: underlying.into(),
            underlying_price,
            expirations,
            contracts,
        }
    }

    /// Contracts of one right at one expiration, sorted by strike.
    #[must_use]
    pub fn slice(&self, expiry: NaiveDate, right: OptionRight) -> Vec<&OptionContract> {
        let mut out: Vec<&OptionContract> = self
            .contracts
            .iter()
            .filter(|c| c.expiry == expiry && c.right == right)
            .collect();
        out.sort_by_key(|c| c.strike);
        out
    }

    /// Looks up the current quote for a specific listing, if present.
    #[must_use]
    pub fn find(&self, listing: &OptionContract) -> Option<&OptionContract> {
        self.contracts.iter().find(|c| c.same_listing(listing))
    }

    /// True when at least one contract carries greeks.
    #[must_use]
    pub fn has_greeks(&self) -> bool {
        self.contracts.iter().any(|c| c.greeks.is_some())
    }
}

/// Named options structure with fixed construction rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    LongCall,
    LongPut,
    BullPutSpread,
    BearCallSpread,
    CallCreditSpread,
    PutCreditSpread,
    IronCondor,
    LongStraddle,
}

impl StructureKind {
    /// Number of legs the structure's template produces.
    #[must_use]
    pub const fn leg_count(self) -> usize {
        match self {
            Self::LongCall | Self::LongPut => 1,
            Self::BullPutSpread
            | Self::BearCallSpread
            | Self::CallCreditSpread
            | Self::PutCreditSpread
            | Self::LongStraddle => 2,
            Self::IronCondor => 4,
        }
    }

    /// Net-credit structures are sized by structural risk rather than debit.
    #[must_use]
    pub const fn is_credit(self) -> bool {
        matches!(
            self,
            Self::BullPutSpread
                | Self::BearCallSpread
                | Self::CallCreditSpread
                | Self::PutCreditSpread
                | Self::IronCondor
        )
    }

    /// Market direction the structure profits from, if it has one.
    /// Income structures opened on a neutral signal carry no bias.
    #[must_use]
    pub const fn directional_bias(self) -> Option<SignalDirection> {
        match self {
            Self::LongCall | Self::BullPutSpread => Some(SignalDirection::Bullish),
            Self::LongPut | Self::BearCallSpread => Some(SignalDirection::Bearish),
            _ => None,
        }
    }
}

impl std::fmt::Display for StructureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::LongCall => "long_call",
            Self::LongPut => "long_put",
            Self::BullPutSpread => "bull_put_spread",
            Self::BearCallSpread => "bear_call_spread",
            Self::CallCreditSpread => "call_credit_spread",
            Self::PutCreditSpread => "put_credit_spread",
            Self::IronCondor => "iron_condor",
            Self::LongStraddle => "long_straddle",
        };
        write!(f, "{name}")
    }
}

/// Side of a plan leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegSide {
    Buy,
    Sell,
}

impl LegSide {
    /// Sign used when netting leg values: bought legs are paid for.
    #[must_use]
    pub const fn sign(self) -> Decimal {
        match self {
            Self::Buy => Decimal::ONE,
            Self::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

/// One leg of a strategy plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanLeg {
    pub contract: OptionContract,
    pub side: LegSide,
    pub quantity: u32,
}

/// A concrete options structure ready for execution.
///
/// Exit thresholds and the holding deadline are snapshotted from the config
/// profile at creation time; later profile changes never touch an existing
/// plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyPlan {
    pub symbol: String,
    pub kind: StructureKind,
    pub legs: Vec<PlanLeg>,
    /// Net debit per contract set. Negative for net-credit structures.
    pub entry_price: Decimal,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_hold_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl StrategyPlan {
    /// Assembles a plan, enforcing that the legs match the structure
    /// template.
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::InvalidPlan`] when the leg count does not match
    /// the structure.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        kind: StructureKind,
        legs: Vec<PlanLeg>,
        entry_price: Decimal,
        stop_loss_pct: f64,
        take_profit_pct: f64,
        max_hold_until: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, TradeError> {
        if legs.len() != kind.leg_count() {
            return Err(TradeError::InvalidPlan(format!(
                "{kind} requires {} legs, got {}",
                kind.leg_count(),
                legs.len()
            )));
        }
        Ok(Self {
            symbol: symbol.into(),
            kind,
            legs,
            entry_price,
            stop_loss_pct,
            take_profit_pct,
            max_hold_until,
            created_at,
        })
    }

    /// Net value of one contract set at the given per-leg prices
    /// (positive = debit). `None` when any leg is missing a price.
    pub fn net_value<F>(&self, price_of: F) -> Option<Decimal>
    where
        F: Fn(&OptionContract) -> Option<Decimal>,
    {
        let mut total = Decimal::ZERO;
        for leg in &self.legs {
            total += leg.side.sign() * price_of(&leg.contract)?;
        }
        Some(total)
    }

    /// Per-leg contract count (identical across legs by construction).
    #[must_use]
    pub fn contracts(&self) -> u32 {
        self.legs.first().map_or(0, |leg| leg.quantity)
    }

    /// Earliest expiration among the plan's legs.
    #[must_use]
    pub fn earliest_expiry(&self) -> Option<NaiveDate> {
        self.legs.iter().map(|leg| leg.contract.expiry).min()
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    MaxHold,
    SignalReversal,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => write!(f, "stop_loss"),
            Self::TakeProfit => write!(f, "take_profit"),
            Self::MaxHold => write!(f, "max_hold"),
            Self::SignalReversal => write!(f, "signal_reversal"),
        }
    }
}

/// Lifecycle state of a position. Open is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed { reason: CloseReason },
    Expired,
}

/// A live (or historical) position created by a fully-filled plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub plan: StrategyPlan,
    pub opened_at: DateTime<Utc>,
    pub status: PositionStatus,
    pub realized_pnl: Decimal,
}

impl Position {
    /// Creates a freshly-opened position for a filled plan.
    #[must_use]
    pub fn open(plan: StrategyPlan, opened_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            plan,
            opened_at,
            status: PositionStatus::Open,
            realized_pnl: Decimal::ZERO,
        }
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.status, PositionStatus::Open)
    }

    /// Transitions open -> closed. Terminal states are never left.
    pub fn close(&mut self, reason: CloseReason, realized_pnl: Decimal) {
        if self.is_open() {
            self.status = PositionStatus::Closed { reason };
            self.realized_pnl = realized_pnl;
        }
    }

    /// Transitions open -> expired (legs ran past their expiration).
    pub fn expire(&mut self, realized_pnl: Decimal) {
        if self.is_open() {
            self.status = PositionStatus::Expired;
            self.realized_pnl = realized_pnl;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn contract(strike: Decimal, right: OptionRight) -> OptionContract {
        OptionContract {
            symbol: "AAPL".to_string(),
            expiry: NaiveDate::from_ymd_opt(2026, 9, 18).unwrap(),
            strike,
            right,
            bid: dec!(1.90),
            ask: dec!(2.10),
            last: dec!(2.00),
            volume: 500,
            open_interest: 1200,
            implied_volatility: 0.35,
            greeks: None,
        }
    }

    #[test]
    fn mid_uses_quote_midpoint() {
        let c = contract(dec!(190), OptionRight::Call);
        assert_eq!(c.mid(), dec!(2.00));
    }

    #[test]
    fn mid_falls_back_to_last_without_quotes() {
        let mut c = contract(dec!(190), OptionRight::Call);
        c.bid = Decimal::ZERO;
        c.ask = Decimal::ZERO;
        assert_eq!(c.mid(), dec!(2.00));
    }

    #[test]
    fn spread_fraction_is_infinite_without_prices() {
        let mut c = contract(dec!(190), OptionRight::Call);
        c.bid = Decimal::ZERO;
        c.ask = Decimal::ZERO;
        c.last = Decimal::ZERO;
        assert!(c.spread_fraction().is_infinite());
    }

    #[test]
    fn chain_slice_sorts_by_strike() {
        let chain = OptionsChain::new(
            "AAPL",
            dec!(190),
            vec![
                contract(dec!(200), OptionRight::Call),
                contract(dec!(180), OptionRight::Call),
                contract(dec!(190), OptionRight::Put),
            ],
        );
        let calls = chain.slice(
            NaiveDate::from_ymd_opt(2026, 9, 18).unwrap(),
            OptionRight::Call,
        );
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].strike, dec!(180));
        assert_eq!(calls[1].strike, dec!(200));
    }

    #[test]
    fn plan_rejects_wrong_leg_count() {
        let now = Utc::now();
        let legs = vec![PlanLeg {
            contract: contract(dec!(190), OptionRight::Call),
            side: LegSide::Buy,
            quantity: 1,
        }];
        let result = StrategyPlan::new(
            "AAPL",
            StructureKind::IronCondor,
            legs,
            dec!(2.00),
            0.5,
            1.0,
            now,
            now,
        );
        assert!(matches!(result, Err(TradeError::InvalidPlan(_))));
    }

    #[test]
    fn net_value_respects_leg_signs() {
        let now = Utc::now();
        let legs = vec![
            PlanLeg {
                contract: contract(dec!(185), OptionRight::Put),
                side: LegSide::Sell,
                quantity: 1,
            },
            PlanLeg {
                contract: contract(dec!(175), OptionRight::Put),
                side: LegSide::Buy,
                quantity: 1,
            },
        ];
        let plan = StrategyPlan::new(
            "AAPL",
            StructureKind::BullPutSpread,
            legs,
            dec!(-1.00),
            0.5,
            1.0,
            now,
            now,
        )
        .unwrap();
        // Sell leg at 3.00, buy leg at 2.00 -> net credit of 1.00.
        let value = plan.net_value(|c| {
            Some(if c.strike == dec!(185) {
                dec!(3.00)
            } else {
                dec!(2.00)
            })
        });
        assert_eq!(value, Some(dec!(-1.00)));
    }

    #[test]
    fn position_transitions_are_terminal() {
        let now = Utc::now();
        let legs = vec![PlanLeg {
            contract: contract(dec!(190), OptionRight::Call),
            side: LegSide::Buy,
            quantity: 1,
        }];
        let plan = StrategyPlan::new(
            "AAPL",
            StructureKind::LongCall,
            legs,
            dec!(2.00),
            0.5,
            1.0,
            now,
            now,
        )
        .unwrap();
        let mut position = Position::open(plan, now);
        assert!(position.is_open());

        position.close(CloseReason::StopLoss, dec!(-100));
        assert_eq!(
            position.status,
            PositionStatus::Closed {
                reason: CloseReason::StopLoss
            }
        );

        // Terminal: a later expire call must not change the state.
        position.expire(dec!(0));
        assert_eq!(
            position.status,
            PositionStatus::Closed {
                reason: CloseReason::StopLoss
            }
        );
        assert_eq!(position.realized_pnl, dec!(-100));
    }

    #[test]
    fn structure_templates_are_consistent() {
        assert_eq!(StructureKind::LongCall.leg_count(), 1);
        assert_eq!(StructureKind::BullPutSpread.leg_count(), 2);
        assert_eq!(StructureKind::IronCondor.leg_count(), 4);
        assert!(StructureKind::IronCondor.is_credit());
        assert!(!StructureKind::LongStraddle.is_credit());
        assert_eq!(
            StructureKind::LongCall.directional_bias(),
            Some(SignalDirection::Bullish)
        );
        assert_eq!(StructureKind::IronCondor.directional_bias(), None);
    }
}
