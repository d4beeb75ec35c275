//! End-to-end cycle tests against fake data sources and the paper
//! platform.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use optrade_core::config::{ConfigProfile, MacdParams};
use optrade_core::error::{Result, TradeError};
use optrade_core::traits::{Credentials, MarketDataSource};
use optrade_core::types::{
    MarketBar, OptionContract, OptionRight, OptionsChain, SignalDirection, StructureKind,
};
use optrade_data::{DataRouter, LimiterRegistry, RouterConfig};
use optrade_engine::Engine;
use optrade_execution::PaperPlatform;

/// Serves a rising close series per symbol: `historical` returns the
/// warm-up prefix, `realtime` steps through the rest.
struct RisingSource {
    symbols: Vec<String>,
    warmup: usize,
    cursors: Mutex<std::collections::HashMap<String, usize>>,
}

impl RisingSource {
    fn new(symbols: &[&str], warmup: usize) -> Self {
        Self {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            warmup,
            cursors: Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn bar(symbol: &str, index: usize) -> MarketBar {
        let close = Decimal::from(100 + index as i64);
        MarketBar {
            symbol: symbol.to_string(),
            timestamp: Utc::now() - ChronoDuration::days(60 - index as i64),
            open: close,
            high: close + dec!(1),
            low: close - dec!(1),
            close,
            volume: dec!(10000),
        }
    }

    fn chain_for(symbol: &str) -> OptionsChain {
        let expiry = (Utc::now() + ChronoDuration::days(30)).date_naive();
        let mut contracts = Vec::new();
        for step in 0..9 {
            let strike = Decimal::from(170 + step * 5);
            for right in [OptionRight::Call, OptionRight::Put] {
                contracts.push(OptionContract {
                    symbol: symbol.to_string(),
                    expiry,
                    strike,
                    right,
                    bid: dec!(1.90),
                    ask: dec!(2.10),
                    last: dec!(2.00),
                    volume: 500,
                    open_interest: 1000,
                    implied_volatility: 0.3,
                    greeks: None,
                });
            }
        }
        OptionsChain::new(symbol, dec!(190), contracts)
    }
}

#[async_trait]
impl MarketDataSource for RisingSource {
    fn name(&self) -> &str {
        "rising"
    }

    async fn historical(
        &self,
        symbol: &str,
        _period: &str,
        _interval: &str,
    ) -> Result<Vec<MarketBar>> {
        if !self.symbols.iter().any(|s| s == symbol) {
            return Err(TradeError::data_unavailable(symbol));
        }
        let bars = (0..self.warmup).map(|i| Self::bar(symbol, i)).collect();
        self.cursors
            .lock()
            .unwrap()
            .insert(symbol.to_string(), self.warmup);
        Ok(bars)
    }

    async fn realtime(&self, symbol: &str) -> Result<MarketBar> {
        if !self.symbols.iter().any(|s| s == symbol) {
            return Err(TradeError::data_unavailable(symbol));
        }
        let mut cursors = self.cursors.lock().unwrap();
        let cursor = cursors.entry(symbol.to_string()).or_insert(0);
        let bar = Self::bar(symbol, *cursor);
        *cursor += 1;
        Ok(bar)
    }

    async fn options_chain(&self, symbol: &str) -> Result<OptionsChain> {
        if !self.symbols.iter().any(|s| s == symbol) {
            return Err(TradeError::data_unavailable(symbol));
        }
        Ok(Self::chain_for(symbol))
    }
}

fn test_profile(symbols: &[&str], state_tag: &str) -> ConfigProfile {
    let mut profile = ConfigProfile::default();
    profile.engine.symbols = symbols.iter().map(|s| s.to_string()).collect();
    profile.engine.state_dir = temp_dir(state_tag);
    // Short windows so the warm-up prefix suffices; RSI and Bollinger off
    // leaves trend + MACD, which both confirm on a rising series.
    profile.technical_indicators.sma_periods = vec![3, 5];
    profile.technical_indicators.ema_periods = vec![3];
    profile.technical_indicators.macd = MacdParams {
        fast_period: 3,
        slow_period: 5,
        signal_period: 2,
    };
    profile.technical_indicators.use_rsi = false;
    profile.technical_indicators.use_bollinger = false;
    profile.validate().unwrap();
    profile
}

fn temp_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("optrade-engine-{tag}-{}", std::process::id()))
}

fn router_for(source: Arc<RisingSource>) -> DataRouter {
    DataRouter::new(
        vec![source.clone() as Arc<dyn MarketDataSource>],
        vec![source as Arc<dyn MarketDataSource>],
        LimiterRegistry::new(),
        RouterConfig {
            request_timeout: Duration::from_millis(200),
            max_retries: 1,
            retry_backoff: Duration::from_millis(1),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn bullish_cycle_opens_a_long_call() {
    let profile = test_profile(&["AAPL"], "entry");
    std::fs::remove_dir_all(&profile.engine.state_dir).ok();
    let source = Arc::new(RisingSource::new(&["AAPL"], 10));

    let mut engine = Engine::bootstrap(
        profile.clone(),
        router_for(source),
        PaperPlatform::new(0.0),
        &Credentials::None,
    )
    .await
    .unwrap();

    engine.run_cycle(Utc::now()).await.unwrap();

    let signal = engine.latest_signal("AAPL").unwrap();
    assert_eq!(signal.direction, SignalDirection::Bullish);

    assert_eq!(engine.manager().open_count(), 1);
    let position = engine.manager().open_positions().next().unwrap();
    assert_eq!(position.plan.kind, StructureKind::LongCall);
    // 3% ITM of the 190 underlying, nearest listed strike.
    assert_eq!(position.plan.legs[0].contract.strike, dec!(185));

    // The cycle's write-back persisted a complete snapshot.
    assert!(profile.engine.state_dir.join("state.json").exists());
    assert!(!profile.engine.state_dir.join("state.json.tmp").exists());

    std::fs::remove_dir_all(&profile.engine.state_dir).ok();
}

#[tokio::test]
async fn restart_recovers_positions_without_reentry() {
    let profile = test_profile(&["AAPL"], "recovery");
    std::fs::remove_dir_all(&profile.engine.state_dir).ok();

    let source = Arc::new(RisingSource::new(&["AAPL"], 10));
    let mut engine = Engine::bootstrap(
        profile.clone(),
        router_for(source),
        PaperPlatform::new(0.0),
        &Credentials::None,
    )
    .await
    .unwrap();
    engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(engine.manager().open_count(), 1);
    drop(engine);

    // Fresh process: new platform, new router, same state dir.
    let source = Arc::new(RisingSource::new(&["AAPL"], 10));
    let mut engine = Engine::bootstrap(
        profile.clone(),
        router_for(source),
        PaperPlatform::new(0.0),
        &Credentials::None,
    )
    .await
    .unwrap();
    assert_eq!(engine.manager().open_count(), 1);

    engine.run_cycle(Utc::now()).await.unwrap();
    // Still bullish, still one position: monitoring resumed, no re-entry.
    assert_eq!(engine.manager().open_count(), 1);
    assert_eq!(engine.executor().platform().orders_placed(), 0);

    std::fs::remove_dir_all(&profile.engine.state_dir).ok();
}

#[tokio::test]
async fn position_cap_drops_excess_entries() {
    let mut profile = test_profile(&["AAPL", "MSFT"], "cap");
    profile.general.max_positions = 1;
    std::fs::remove_dir_all(&profile.engine.state_dir).ok();

    let source = Arc::new(RisingSource::new(&["AAPL", "MSFT"], 10));
    let mut engine = Engine::bootstrap(
        profile.clone(),
        router_for(source),
        PaperPlatform::new(0.0),
        &Credentials::None,
    )
    .await
    .unwrap();

    engine.run_cycle(Utc::now()).await.unwrap();
    // Both symbols signaled bullish, but only one entry fits the cap.
    assert_eq!(engine.manager().open_count(), 1);

    engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(engine.manager().open_count(), 1);

    std::fs::remove_dir_all(&profile.engine.state_dir).ok();
}

#[tokio::test]
async fn data_outage_skips_the_symbol_not_the_cycle() {
    let profile = test_profile(&["AAPL", "NOPE"], "outage");
    std::fs::remove_dir_all(&profile.engine.state_dir).ok();

    // The source only knows AAPL; NOPE is a permanent outage.
    let source = Arc::new(RisingSource::new(&["AAPL"], 10));
    let mut engine = Engine::bootstrap(
        profile.clone(),
        router_for(source),
        PaperPlatform::new(0.0),
        &Credentials::None,
    )
    .await
    .unwrap();

    engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(engine.manager().open_count(), 1);
    assert!(engine.latest_signal("NOPE").is_none());

    std::fs::remove_dir_all(&profile.engine.state_dir).ok();
}
