//! Replay data provider.
//!
//! Serves bars from CSV files and chain snapshots from JSON files in a
//! local data directory. Needs no credentials, which makes it the terminal
//! entry of every provider chain, and doubles as the offline data source.
//!
//! Bar files are `{dir}/{SYMBOL}.csv` with columns
//! `timestamp,symbol,open,high,low,close,volume` (RFC 3339 timestamps,
//! oldest first). Chain snapshots are `{dir}/{SYMBOL}_chain.json`.
//!
//! `historical` positions a per-symbol cursor past the bars it returned;
//! subsequent `realtime` calls step through the remaining bars one per
//! call, so a warmed-up engine replays the file deterministically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use optrade_core::config::{interval_minutes, period_days};
use optrade_core::error::{Result, TradeError};
use optrade_core::traits::MarketDataSource;
use optrade_core::types::{MarketBar, OptionContract, OptionsChain};

use async_trait::async_trait;

#[derive(Debug, Deserialize)]
struct BarRecord {
    timestamp: DateTime<Utc>,
    symbol: String,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

impl From<BarRecord> for MarketBar {
    fn from(record: BarRecord) -> Self {
        Self {
            symbol: record.symbol,
            timestamp: record.timestamp,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChainSnapshot {
    underlying_price: Decimal,
    contracts: Vec<OptionContract>,
}

/// File-backed provider replaying recorded bars and chain snapshots.
pub struct ReplayProvider {
    dir: PathBuf,
    cursors: Mutex<HashMap<String, usize>>,
}

impl ReplayProvider {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cursors: Mutex::new(HashMap::new()),
        }
    }

    fn bars_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", symbol.to_uppercase()))
    }

    fn chain_path(&self, symbol: &str) -> PathBuf {
        self.dir
            .join(format!("{}_chain.json", symbol.to_uppercase()))
    }

    fn read_bars(path: &Path, symbol: &str) -> Result<Vec<MarketBar>> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|_| TradeError::data_unavailable(symbol))?;
        let mut bars = Vec::new();
        for record in reader.deserialize::<BarRecord>() {
            let record = record.map_err(|_| TradeError::data_unavailable(symbol))?;
            bars.push(MarketBar::from(record));
        }
        Ok(bars)
    }

    /// Number of bars a (period, interval) pair spans.
    fn bar_count(period: &str, interval: &str) -> usize {
        let days = period_days(period).unwrap_or(90);
        let minutes = interval_minutes(interval).unwrap_or(1440);
        ((u64::from(days) * 1440) / u64::from(minutes.max(1))).max(1) as usize
    }
}

#[async_trait]
impl MarketDataSource for ReplayProvider {
    fn name(&self) -> &str {
        "replay"
    }

    async fn historical(
        &self,
        symbol: &str,
        period: &str,
        interval: &str,
    ) -> Result<Vec<MarketBar>> {
        let bars = Self::read_bars(&self.bars_path(symbol), symbol)?;
        let take = Self::bar_count(period, interval).min(bars.len());
        let head: Vec<MarketBar> = bars.into_iter().take(take).collect();

        let mut cursors = self.cursors.lock().await;
        cursors.insert(symbol.to_uppercase(), head.len());
        debug!(symbol, bars = head.len(), "replay historical served");
        Ok(head)
    }

    async fn realtime(&self, symbol: &str) -> Result<MarketBar> {
        let bars = Self::read_bars(&self.bars_path(symbol), symbol)?;
        let mut cursors = self.cursors.lock().await;
        let cursor = cursors.entry(symbol.to_uppercase()).or_insert(0);
        let bar = bars
            .get(*cursor)
            .cloned()
            .ok_or_else(|| TradeError::data_unavailable(symbol))?;
        *cursor += 1;
        debug!(symbol, cursor = *cursor, "replay bar served");
        Ok(bar)
    }

    async fn options_chain(&self, symbol: &str) -> Result<OptionsChain> {
        let path = self.chain_path(symbol);
        let raw = std::fs::read_to_string(&path)
            .map_err(|_| TradeError::data_unavailable(symbol))?;
        let snapshot: ChainSnapshot =
            serde_json::from_str(&raw).map_err(|_| TradeError::data_unavailable(symbol))?;
        Ok(OptionsChain::new(
            symbol.to_uppercase(),
            snapshot.underlying_price,
            snapshot.contracts,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("optrade-replay-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_bars(dir: &Path, symbol: &str, count: usize) {
        let mut file = std::fs::File::create(dir.join(format!("{symbol}.csv"))).unwrap();
        writeln!(file, "timestamp,symbol,open,high,low,close,volume").unwrap();
        for day in 0..count {
            writeln!(
                file,
                "2026-01-{:02}T00:00:00Z,{symbol},100,101,99,{},1000",
                day + 1,
                100 + day
            )
            .unwrap();
        }
    }

    #[tokio::test]
    async fn historical_positions_the_cursor() {
        let dir = temp_dir("cursor");
        write_bars(&dir, "AAPL", 5);
        let provider = ReplayProvider::new(&dir);

        let bars = provider.historical("AAPL", "3d", "1d").await.unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[2].close, dec!(102));

        // Realtime continues from where historical stopped.
        let next = provider.realtime("AAPL").await.unwrap();
        assert_eq!(next.close, dec!(103));
        let after = provider.realtime("AAPL").await.unwrap();
        assert_eq!(after.close, dec!(104));

        // File exhausted.
        let err = provider.realtime("AAPL").await.unwrap_err();
        assert!(matches!(err, TradeError::DataUnavailable { .. }));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn missing_file_is_data_unavailable() {
        let dir = temp_dir("missing");
        let provider = ReplayProvider::new(&dir);
        let err = provider.realtime("NOPE").await.unwrap_err();
        assert!(matches!(err, TradeError::DataUnavailable { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn chain_snapshot_round_trips() {
        let dir = temp_dir("chain");
        let json = r#"{
            "underlying_price": "190.0",
            "contracts": [{
                "symbol": "AAPL",
                "expiry": "2026-09-18",
                "strike": "190",
                "right": "call",
                "bid": "2.0",
                "ask": "2.2",
                "last": "2.1",
                "volume": 250,
                "open_interest": 900,
                "implied_volatility": 0.32,
                "greeks": null
            }]
        }"#;
        std::fs::write(dir.join("AAPL_chain.json"), json).unwrap();

        let provider = ReplayProvider::new(&dir);
        let chain = provider.options_chain("aapl").await.unwrap();
        assert_eq!(chain.underlying, "AAPL");
        assert_eq!(chain.contracts.len(), 1);
        assert_eq!(chain.expirations.len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
