//! Strategy selection for optrade: IV-regime classification, the closed
//! strategy table, expiration policies, and greek-optimized contract
//! picking.

pub mod expiry;
pub mod greeks;
pub mod selector;

pub use expiry::{choose_expiration, is_third_friday};
pub use greeks::{component_scores, is_liquid, pick_best, GreekScores, StructureClass};
pub use selector::{IvRegime, StrategySelector};
