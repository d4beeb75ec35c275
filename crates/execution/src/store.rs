//! Atomic state snapshot persistence.
//!
//! The snapshot (positions, latest signals, latest bars) is the system of
//! record for crash recovery. Writes go to a temp file and are renamed
//! into place, so a crash mid-write never leaves a partially updated
//! snapshot; readers see the previous complete state or the new one.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use optrade_core::types::{MarketBar, Position, Signal};

/// Everything persisted at the end of a cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub positions: Vec<Position>,
    pub signals: BTreeMap<String, Signal>,
    pub bars: BTreeMap<String, MarketBar>,
}

/// JSON-file state store with atomic replace.
pub struct StateStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl StateStore {
    /// Opens (creating) a store under the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create state dir {}", dir.display()))?;
        Ok(Self {
            path: dir.join("state.json"),
            tmp_path: dir.join("state.json.tmp"),
        })
    }

    /// Writes the snapshot atomically (temp file + rename).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the filesystem operations
    /// fail; the previous snapshot stays intact in that case.
    pub fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        let json =
            serde_json::to_vec_pretty(snapshot).context("failed to serialize state snapshot")?;
        fs::write(&self.tmp_path, json)
            .with_context(|| format!("failed to write {}", self.tmp_path.display()))?;
        fs::rename(&self.tmp_path, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        debug!(
            positions = snapshot.positions.len(),
            signals = snapshot.signals.len(),
            "state snapshot persisted"
        );
        Ok(())
    }

    /// Loads the last complete snapshot, or `None` on first start.
    ///
    /// # Errors
    ///
    /// Returns an error when an existing snapshot cannot be read or
    /// parsed.
    pub fn load(&self) -> Result<Option<StateSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let snapshot: StateSnapshot =
            serde_json::from_str(&raw).context("failed to parse state snapshot")?;
        info!(
            positions = snapshot.positions.len(),
            "state snapshot recovered"
        );
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use optrade_core::types::{
        FamilyScores, LegSide, OptionContract, OptionRight, PlanLeg, Signal, SignalDirection,
        StrategyPlan, StructureKind,
    };
    use rust_decimal_macros::dec;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("optrade-store-{tag}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sample_position() -> Position {
        let now = Utc::now();
        let plan = StrategyPlan::new(
            "AAPL",
            StructureKind::LongCall,
            vec![PlanLeg {
                contract: OptionContract {
                    symbol: "AAPL".to_string(),
                    expiry: (now + Duration::days(30)).date_naive(),
                    strike: dec!(190),
                    right: OptionRight::Call,
                    bid: dec!(1.90),
                    ask: dec!(2.10),
                    last: dec!(2.00),
                    volume: 500,
                    open_interest: 1000,
                    implied_volatility: 0.3,
                    greeks: None,
                },
                side: LegSide::Buy,
                quantity: 2,
            }],
            dec!(2.00),
            0.5,
            1.0,
            now + Duration::days(14),
            now,
        )
        .unwrap();
        Position::open(plan, now)
    }

    #[test]
    fn snapshot_round_trips() {
        let dir = temp_dir("roundtrip");
        let store = StateStore::open(&dir).unwrap();

        let mut snapshot = StateSnapshot::default();
        let position = sample_position();
        let id = position.id;
        snapshot.positions.push(position);
        snapshot.signals.insert(
            "AAPL".to_string(),
            Signal {
                symbol: "AAPL".to_string(),
                direction: SignalDirection::Bullish,
                strength: 0.4,
                timestamp: Utc::now(),
                scores: FamilyScores::default(),
            },
        );
        store.save(&snapshot).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.positions.len(), 1);
        assert_eq!(loaded.positions[0].id, id);
        assert!(loaded.positions[0].is_open());
        assert_eq!(loaded.signals["AAPL"].direction, SignalDirection::Bullish);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn first_start_has_no_snapshot() {
        let dir = temp_dir("empty");
        let store = StateStore::open(&dir).unwrap();
        assert!(store.load().unwrap().is_none());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = temp_dir("atomic");
        let store = StateStore::open(&dir).unwrap();
        store.save(&StateSnapshot::default()).unwrap();
        assert!(dir.join("state.json").exists());
        assert!(!dir.join("state.json.tmp").exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn corrupt_snapshot_is_an_error_not_a_default() {
        let dir = temp_dir("corrupt");
        fs::write(dir.join("state.json"), b"{ not json").unwrap();
        let store = StateStore::open(&dir).unwrap();
        assert!(store.load().is_err());
        fs::remove_dir_all(&dir).ok();
    }
}
