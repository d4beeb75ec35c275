//! Strategy selection and plan assembly.
//!
//! A signal plus a chain snapshot maps to a structure through the closed
//! strategy table keyed by (direction, IV regime), then legs are chosen
//! either by static ITM/OTM strike offsets or by the greek optimizer.
//! Selection is deterministic: identical (signal, chain, profile) inputs
//! always produce an identical plan.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tracing::debug;

use optrade_core::config::ConfigProfile;
use optrade_core::error::Result;
use optrade_core::types::{
    LegSide, OptionContract, OptionRight, OptionsChain, PlanLeg, Signal, SignalDirection,
    StrategyPlan, StructureKind,
};
use optrade_core::VolatilityBias;

use crate::expiry::choose_expiration;
use crate::greeks::{is_liquid, pick_best, StructureClass};

/// Implied-volatility regime relative to the configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IvRegime {
    High,
    Low,
}

/// Maps signals to executable strategy plans.
pub struct StrategySelector {
    profile: ConfigProfile,
}

/// A leg before quantity assignment.
struct LegSpec {
    contract: OptionContract,
    side: LegSide,
}

impl LegSpec {
    fn buy(contract: &OptionContract) -> Self {
        Self {
            contract: contract.clone(),
            side: LegSide::Buy,
        }
    }

    fn sell(contract: &OptionContract) -> Self {
        Self {
            contract: contract.clone(),
            side: LegSide::Sell,
        }
    }
}

impl StrategySelector {
    #[must_use]
    pub fn new(profile: ConfigProfile) -> Self {
        Self { profile }
    }

    /// Builds a plan for a signal, or `None` when the chain cannot support
    /// one (no upcoming expiry, missing strikes, no scorable candidates).
    ///
    /// # Errors
    ///
    /// Propagates plan-assembly invariant violations; chain shortfalls are
    /// `Ok(None)`, not errors.
    pub fn build_plan(
        &self,
        signal: &Signal,
        chain: &OptionsChain,
        now: DateTime<Utc>,
    ) -> Result<Option<StrategyPlan>> {
        let options = &self.profile.options;
        let Some(expiry) = choose_expiration(
            &chain.expirations,
            options.expiration_selection,
            now.date_naive(),
        ) else {
            debug!(symbol = signal.symbol, "no upcoming expiration in chain");
            return Ok(None);
        };

        let calls = chain.slice(expiry, OptionRight::Call);
        let puts = chain.slice(expiry, OptionRight::Put);
        if calls.is_empty() || puts.is_empty() {
            debug!(symbol = signal.symbol, %expiry, "one-sided chain, skipping");
            return Ok(None);
        }
        let price = chain.underlying_price;

        let kind = match options.default_strategy.forced() {
            Some(kind) => kind,
            None => self.table_lookup(signal.direction, price, &calls, &puts),
        };

        let greek_mode = self.profile.greeks.enabled && chain.has_greeks();
        let Some(legs) = self.assemble_legs(kind, price, &calls, &puts, greek_mode) else {
            debug!(symbol = signal.symbol, structure = %kind, "no viable legs");
            return Ok(None);
        };

        let Some(entry_price) = net_debit(&legs) else {
            return Ok(None);
        };
        let quantity = self.position_quantity(kind, &legs, entry_price);

        let legs = legs
            .into_iter()
            .map(|spec| PlanLeg {
                contract: spec.contract,
                side: spec.side,
                quantity,
            })
            .collect();

        let plan = StrategyPlan::new(
            signal.symbol.clone(),
            kind,
            legs,
            entry_price,
            options.stop_loss_pct,
            options.take_profit_pct,
            now + Duration::days(options.max_days_to_hold),
            now,
        )?;
        debug!(
            symbol = plan.symbol,
            structure = %plan.kind,
            contracts = quantity,
            entry = %plan.entry_price,
            "plan assembled"
        );
        Ok(Some(plan))
    }

    /// Classifies the IV regime from the ATM call/put average.
    #[must_use]
    pub fn classify_regime(
        price: Decimal,
        calls: &[&OptionContract],
        puts: &[&OptionContract],
        threshold: f64,
    ) -> Option<IvRegime> {
        let atm_call = nearest_to(calls, price)?;
        let atm_put = nearest_to(puts, price)?;
        let mid_iv = (atm_call.implied_volatility + atm_put.implied_volatility) / 2.0;
        Some(if mid_iv > threshold {
            IvRegime::High
        } else {
            IvRegime::Low
        })
    }

    fn table_lookup(
        &self,
        direction: SignalDirection,
        price: Decimal,
        calls: &[&OptionContract],
        puts: &[&OptionContract],
    ) -> StructureKind {
        let table = &self.profile.options.strategy_selection;
        match direction {
            SignalDirection::Bullish => {
                let row = &table.bullish;
                match Self::classify_regime(price, calls, puts, row.iv_threshold) {
                    Some(IvRegime::High) => row.high_iv,
                    _ => row.low_iv,
                }
            }
            SignalDirection::Bearish => {
                let row = &table.bearish;
                match Self::classify_regime(price, calls, puts, row.iv_threshold) {
                    Some(IvRegime::High) => row.high_iv,
                    _ => row.low_iv,
                }
            }
            SignalDirection::Neutral => {
                // An increasing-volatility bias flips the neutral default
                // to long premium when the optimizer is on.
                if self.profile.greeks.enabled
                    && self.profile.greeks.volatility_bias == VolatilityBias::Increasing
                {
                    StructureKind::LongStraddle
                } else {
                    table.neutral.default
                }
            }
        }
    }

    fn assemble_legs(
        &self,
        kind: StructureKind,
        price: Decimal,
        calls: &[&OptionContract],
        puts: &[&OptionContract],
        greek_mode: bool,
    ) -> Option<Vec<LegSpec>> {
        let strikes = &self.profile.options.strike_selection;
        let otm_call_target = offset_strike(price, 1.0 + strikes.call_otm_pct);
        let otm_put_target = offset_strike(price, 1.0 - strikes.put_otm_pct);
        // ITM offsets sit on the far side of the money from the OTM ones.
        let itm_call_target = offset_strike(price, 1.0 - strikes.call_itm_pct);
        let itm_put_target = offset_strike(price, 1.0 + strikes.put_itm_pct);

        match kind {
            StructureKind::LongCall => {
                let contract = if greek_mode {
                    self.directional_pick(calls)?
                } else {
                    nearest_to(calls, itm_call_target)?
                };
                Some(vec![LegSpec::buy(contract)])
            }
            StructureKind::LongPut => {
                let contract = if greek_mode {
                    self.directional_pick(puts)?
                } else {
                    nearest_to(puts, itm_put_target)?
                };
                Some(vec![LegSpec::buy(contract)])
            }
            StructureKind::BullPutSpread => {
                let short = if greek_mode {
                    self.short_leg_pick(puts, |c| c.strike < price)?
                } else {
                    nearest_to(puts, price)?
                };
                let long = if greek_mode {
                    next_below(puts, short.strike)?
                } else {
                    spread_wing_below(puts, short.strike, otm_put_target)?
                };
                Some(vec![LegSpec::sell(short), LegSpec::buy(long)])
            }
            StructureKind::BearCallSpread => {
                let short = if greek_mode {
                    self.short_leg_pick(calls, |c| c.strike > price)?
                } else {
                    nearest_to(calls, price)?
                };
                let long = if greek_mode {
                    next_above(calls, short.strike)?
                } else {
                    spread_wing_above(calls, short.strike, otm_call_target)?
                };
                Some(vec![LegSpec::sell(short), LegSpec::buy(long)])
            }
            StructureKind::CallCreditSpread => {
                let short = if greek_mode {
                    self.short_leg_pick(calls, |c| c.strike > price)?
                } else {
                    nearest_to(calls, otm_call_target)?
                };
                let long = next_above(calls, short.strike)?;
                Some(vec![LegSpec::sell(short), LegSpec::buy(long)])
            }
            StructureKind::PutCreditSpread => {
                let short = if greek_mode {
                    self.short_leg_pick(puts, |c| c.strike < price)?
                } else {
                    nearest_to(puts, otm_put_target)?
                };
                let long = next_below(puts, short.strike)?;
                Some(vec![LegSpec::sell(short), LegSpec::buy(long)])
            }
            StructureKind::IronCondor => {
                let short_call = if greek_mode {
                    self.short_leg_pick(calls, |c| c.strike > price)?
                } else {
                    nearest_to(calls, otm_call_target)?
                };
                let short_put = if greek_mode {
                    self.short_leg_pick(puts, |c| c.strike < price)?
                } else {
                    nearest_to(puts, otm_put_target)?
                };
                let long_call = next_above(calls, short_call.strike)?;
                let long_put = next_below(puts, short_put.strike)?;
                Some(vec![
                    LegSpec::sell(short_call),
                    LegSpec::buy(long_call),
                    LegSpec::sell(short_put),
                    LegSpec::buy(long_put),
                ])
            }
            StructureKind::LongStraddle => {
                let atm_call = nearest_to(calls, price)?;
                let atm_put = nearest_to(puts, price)?;
                Some(vec![LegSpec::buy(atm_call), LegSpec::buy(atm_put)])
            }
        }
    }

    /// Directional single-leg pick: liquidity filter with fallback to the
    /// whole side, then greek scoring.
    fn directional_pick<'a>(&self, side: &[&'a OptionContract]) -> Option<&'a OptionContract> {
        let config = &self.profile.greeks;
        let liquid: Vec<&OptionContract> = side
            .iter()
            .copied()
            .filter(|c| is_liquid(c, config))
            .collect();
        let candidates: &[&OptionContract] = if liquid.is_empty() { side } else { &liquid };
        pick_best(
            candidates,
            StructureClass::Directional,
            config,
            config.delta_target,
        )
    }

    /// Short-leg pick for credit structures, restricted to OTM strikes.
    fn short_leg_pick<'a>(
        &self,
        side: &[&'a OptionContract],
        otm: impl Fn(&OptionContract) -> bool,
    ) -> Option<&'a OptionContract> {
        let config = &self.profile.greeks;
        let otm_side: Vec<&OptionContract> = side.iter().copied().filter(|c| otm(c)).collect();
        if otm_side.is_empty() {
            return None;
        }
        let liquid: Vec<&OptionContract> = otm_side
            .iter()
            .copied()
            .filter(|c| is_liquid(c, config))
            .collect();
        let candidates: &[&OptionContract] = if liquid.is_empty() { &otm_side } else { &liquid };
        pick_best(
            candidates,
            StructureClass::Credit,
            config,
            config.short_delta_target,
        )
    }

    /// Contracts per leg: risk capital over per-contract cost, floored at
    /// one. Debit structures cost their net debit; credit structures are
    /// sized by maximum structural risk.
    fn position_quantity(&self, kind: StructureKind, legs: &[LegSpec], entry: Decimal) -> u32 {
        let unit_cost = if kind.is_credit() {
            let credit = -entry; // entry is negative for net credit
            max_spread_width(legs)
                .map(|w| w - credit)
                .and_then(|risk| risk.to_f64())
                .unwrap_or(0.0)
        } else {
            entry.to_f64().unwrap_or(0.0)
        };

        if unit_cost <= 0.0 {
            return 1;
        }
        let contracts = (self.profile.risk_capital() / (unit_cost * 100.0)).floor();
        if contracts < 1.0 {
            1
        } else {
            contracts as u32
        }
    }
}

/// Net debit of one contract set (negative for credit structures).
fn net_debit(legs: &[LegSpec]) -> Option<Decimal> {
    let mut total = Decimal::ZERO;
    for leg in legs {
        total += leg.side.sign() * leg.contract.mid();
    }
    Some(total)
}

/// Widest short/long strike distance across the structure's wings.
fn max_spread_width(legs: &[LegSpec]) -> Option<Decimal> {
    let mut widest: Option<Decimal> = None;
    for short in legs.iter().filter(|l| l.side == LegSide::Sell) {
        for long in legs
            .iter()
            .filter(|l| l.side == LegSide::Buy && l.contract.right == short.contract.right)
        {
            let width = (long.contract.strike - short.contract.strike).abs();
            widest = Some(widest.map_or(width, |w| w.max(width)));
        }
    }
    widest
}

fn offset_strike(price: Decimal, factor: f64) -> Decimal {
    price * Decimal::from_f64(factor).unwrap_or(Decimal::ONE)
}

/// Contract with strike closest to the target; ties go to the lower
/// strike (candidates are sorted).
fn nearest_to<'a>(candidates: &[&'a OptionContract], target: Decimal) -> Option<&'a OptionContract> {
    candidates
        .iter()
        .copied()
        .min_by_key(|c| (c.strike - target).abs())
}

fn next_above<'a>(candidates: &[&'a OptionContract], strike: Decimal) -> Option<&'a OptionContract> {
    candidates.iter().copied().find(|c| c.strike > strike)
}

fn next_below<'a>(candidates: &[&'a OptionContract], strike: Decimal) -> Option<&'a OptionContract> {
    candidates.iter().rev().copied().find(|c| c.strike < strike)
}

/// Static-mode spread wing: the strike nearest the OTM target, pushed one
/// strike out when it collides with the short leg.
fn spread_wing_below<'a>(
    candidates: &[&'a OptionContract],
    short_strike: Decimal,
    target: Decimal,
) -> Option<&'a OptionContract> {
    let wing = nearest_to(candidates, target)?;
    if wing.strike < short_strike {
        Some(wing)
    } else {
        next_below(candidates, short_strike)
    }
}

fn spread_wing_above<'a>(
    candidates: &[&'a OptionContract],
    short_strike: Decimal,
    target: Decimal,
) -> Option<&'a OptionContract> {
    let wing = nearest_to(candidates, target)?;
    if wing.strike > short_strike {
        Some(wing)
    } else {
        next_above(candidates, short_strike)
    }
}
