//! Greek-based contract scoring.
//!
//! Candidates that pass the liquidity floor are scored per structure
//! class against the configured per-greek targets. The combination rule
//! (weighted sum or strict priority) is configuration, scoped per class.
//! Ranking is fully deterministic: ties break by tightest spread, then
//! highest volume, then lowest strike.

use std::cmp::Ordering;

use optrade_core::config::{CombinationRule, GreekConfig, GreekKind, VolatilityBias};
use optrade_core::types::OptionContract;

/// Scoring profile implied by the structure being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureClass {
    /// Single-leg directional exposure.
    Directional,
    /// Net-debit premium (straddles): wants decay slow, vega long.
    LongPremium,
    /// Net-credit income: wants decay fast on the short leg.
    Credit,
}

/// Liquidity floor: open interest, volume, and relative spread.
#[must_use]
pub fn is_liquid(contract: &OptionContract, config: &GreekConfig) -> bool {
    contract.open_interest >= config.min_open_interest
        && contract.volume >= config.min_volume
        && contract.spread_fraction() <= config.max_spread_fraction
}

/// Per-greek component scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GreekScores {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
}

impl GreekScores {
    fn component(&self, kind: GreekKind) -> f64 {
        match kind {
            GreekKind::Delta => self.delta,
            GreekKind::Gamma => self.gamma,
            GreekKind::Theta => self.theta,
            GreekKind::Vega => self.vega,
        }
    }

    fn weighted(&self, delta: f64, gamma: f64, theta: f64, vega: f64) -> f64 {
        let total = delta + gamma + theta + vega;
        if total <= 0.0 {
            return 0.0;
        }
        (self.delta * delta + self.gamma * gamma + self.theta * theta + self.vega * vega) / total
    }
}

/// Scores one contract for a structure class. `None` when the contract
/// carries no greeks.
#[must_use]
pub fn component_scores(
    contract: &OptionContract,
    class: StructureClass,
    config: &GreekConfig,
    target_delta: f64,
) -> Option<GreekScores> {
    let greeks = contract.greeks.as_ref()?;

    // Delta closeness to the target, using magnitude so puts score
    // symmetrically with calls.
    let delta = (1.0 - (greeks.delta.abs() - target_delta).abs()).clamp(0.0, 1.0);

    // Gamma above the floor scores full marks.
    let gamma = (greeks.gamma / config.gamma_floor).clamp(0.0, 1.0);

    let theta = match class {
        // Less decay is better for anything bought.
        StructureClass::Directional | StructureClass::LongPremium => {
            ((greeks.theta - config.theta_floor) / config.theta_floor.abs()).clamp(0.0, 1.0)
        }
        // More decay is better for premium sold.
        StructureClass::Credit => {
            ((config.theta_ceiling - greeks.theta) / config.theta_ceiling.abs()).clamp(0.0, 1.0)
        }
    };

    let vega_level = (greeks.vega / config.vega_floor).clamp(0.0, 1.0);
    let vega = match config.volatility_bias {
        VolatilityBias::Increasing => vega_level,
        VolatilityBias::Decreasing => 1.0 - vega_level,
        VolatilityBias::Neutral => 0.5,
    };

    Some(GreekScores {
        delta,
        gamma,
        theta,
        vega,
    })
}

fn rule_cmp(a: &GreekScores, b: &GreekScores, rule: &CombinationRule) -> Ordering {
    match rule {
        CombinationRule::Weighted {
            delta,
            gamma,
            theta,
            vega,
        } => {
            let left = a.weighted(*delta, *gamma, *theta, *vega);
            let right = b.weighted(*delta, *gamma, *theta, *vega);
            left.total_cmp(&right)
        }
        CombinationRule::Priority { order } => {
            for kind in order {
                let cmp = a.component(*kind).total_cmp(&b.component(*kind));
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            Ordering::Equal
        }
    }
}

/// Picks the best-scoring contract for a class. Contracts without greeks
/// are ignored; ties break by tightest spread, then highest volume, then
/// lowest strike.
#[must_use]
pub fn pick_best<'a>(
    candidates: &[&'a OptionContract],
    class: StructureClass,
    config: &GreekConfig,
    target_delta: f64,
) -> Option<&'a OptionContract> {
    let rule = match class {
        StructureClass::Directional => &config.scoring.directional,
        StructureClass::LongPremium => &config.scoring.long_premium,
        StructureClass::Credit => &config.scoring.credit,
    };

    candidates
        .iter()
        .filter_map(|c| component_scores(c, class, config, target_delta).map(|s| (*c, s)))
        .max_by(|(a, sa), (b, sb)| {
            rule_cmp(sa, sb, rule)
                // max_by keeps the larger; invert spread so tighter wins.
                .then_with(|| b.spread_fraction().total_cmp(&a.spread_fraction()))
                .then_with(|| a.volume.cmp(&b.volume))
                .then_with(|| b.strike.cmp(&a.strike))
        })
        .map(|(c, _)| c)
}
