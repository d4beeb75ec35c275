//! One decision cycle: fetch, compute, decide, write back.
//!
//! Per-symbol work (data fetch, indicators, signal, plan) runs
//! concurrently; the only cross-symbol state is the limiter registry
//! inside the router and the open-position count, both synchronized. The
//! decision phase is read-only; entries, exits, and the state snapshot
//! are applied sequentially at the end of the cycle, so a crash mid-cycle
//! never leaves half-updated position records.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use optrade_core::config::ConfigProfile;
use optrade_core::error::TradeError;
use optrade_core::traits::{Credentials, TradingPlatform};
use optrade_core::types::{MarketBar, OptionsChain, Position, Signal, StrategyPlan};
use optrade_data::DataRouter;
use optrade_execution::{ExitDecision, OrderExecutor, PositionManager, StateSnapshot, StateStore};
use optrade_signals::{IndicatorEngine, SignalGenerator};
use optrade_strategy::StrategySelector;

/// Terminal positions kept in the snapshot for inspection.
const CLOSED_RETENTION: usize = 50;

/// Per-symbol data gathered at the start of a cycle.
struct SymbolReading {
    symbol: String,
    bar: Option<MarketBar>,
    chain: Option<OptionsChain>,
}

/// The trading engine: owns every component and drives the cycle.
pub struct Engine<P: TradingPlatform> {
    profile: ConfigProfile,
    router: Arc<DataRouter>,
    indicators: IndicatorEngine,
    generator: SignalGenerator,
    selector: StrategySelector,
    manager: PositionManager,
    executor: OrderExecutor<P>,
    store: StateStore,
    latest_signals: BTreeMap<String, Signal>,
    latest_bars: BTreeMap<String, MarketBar>,
}

impl<P: TradingPlatform> Engine<P> {
    /// Builds the engine, authenticates the platform, recovers persisted
    /// state, and warms up indicators from historical data.
    ///
    /// On restart, open positions from the snapshot resume monitoring
    /// without being re-entered.
    ///
    /// # Errors
    ///
    /// Returns an error when authentication, state recovery, or store
    /// setup fails. Missing historical data for a symbol is not fatal.
    pub async fn bootstrap(
        profile: ConfigProfile,
        router: DataRouter,
        platform: P,
        credentials: &Credentials,
    ) -> anyhow::Result<Self> {
        platform.authenticate(credentials).await?;

        let store = StateStore::open(&profile.engine.state_dir)?;
        let snapshot = store.load()?.unwrap_or_default();
        let manager =
            PositionManager::with_positions(profile.general.max_positions, snapshot.positions);
        if manager.open_count() > 0 {
            info!(
                open = manager.open_count(),
                "recovered open positions, monitoring resumes"
            );
        }

        let executor = OrderExecutor::new(
            platform,
            Duration::from_secs(profile.data.request_timeout_secs),
        );
        let mut engine = Self {
            indicators: IndicatorEngine::new(profile.technical_indicators.clone()),
            generator: SignalGenerator::new(
                profile.signals.clone(),
                profile.technical_indicators.clone(),
            ),
            selector: StrategySelector::new(profile.clone()),
            manager,
            executor,
            store,
            router: Arc::new(router),
            latest_signals: snapshot.signals,
            latest_bars: snapshot.bars,
            profile,
        };
        engine.warm_up().await;
        Ok(engine)
    }

    /// Seeds per-symbol indicator state from historical bars. Symbols
    /// without data stay in warm-up and are skipped per cycle.
    async fn warm_up(&mut self) {
        let period = self.profile.data.history_period.clone();
        let interval = self.profile.data.history_interval.clone();
        for symbol in self.profile.engine.symbols.clone() {
            match self.router.historical(&symbol, &period, &interval).await {
                Ok(bars) => {
                    debug!(symbol, bars = bars.len(), "warm-up history loaded");
                    for bar in &bars {
                        self.indicators.apply_bar(bar);
                    }
                }
                Err(e) => warn!(symbol, error = %e, "no warm-up history"),
            }
        }
    }

    #[must_use]
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.profile.engine.cycle_interval_secs)
    }

    #[must_use]
    pub fn manager(&self) -> &PositionManager {
        &self.manager
    }

    #[must_use]
    pub fn executor(&self) -> &OrderExecutor<P> {
        &self.executor
    }

    #[must_use]
    pub fn latest_signal(&self, symbol: &str) -> Option<&Signal> {
        self.latest_signals.get(symbol)
    }

    /// Runs one full cycle at `now`.
    ///
    /// # Errors
    ///
    /// Only state persistence problems surface as errors; data and
    /// execution failures are logged and retried on later cycles.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> anyhow::Result<()> {
        let readings = self.fetch_all().await;

        // Compute phase: indicators and fresh signals per symbol.
        let mut chains: HashMap<String, OptionsChain> = HashMap::new();
        let mut cycle_signals: BTreeMap<String, Signal> = BTreeMap::new();
        for reading in readings {
            if let Some(chain) = reading.chain {
                chains.insert(reading.symbol.clone(), chain);
            }
            let Some(bar) = reading.bar else {
                debug!(symbol = reading.symbol, "no bar this cycle, skipping");
                continue;
            };
            self.indicators.apply_bar(&bar);
            self.latest_bars.insert(reading.symbol.clone(), bar);

            let Some(set) = self.indicators.snapshot(&reading.symbol) else {
                continue;
            };
            match self.generator.evaluate(&set, now) {
                Ok(signal) => {
                    debug!(
                        symbol = signal.symbol,
                        direction = ?signal.direction,
                        strength = signal.strength,
                        "signal generated"
                    );
                    self.latest_signals
                        .insert(reading.symbol.clone(), signal.clone());
                    cycle_signals.insert(reading.symbol, signal);
                }
                Err(TradeError::InsufficientData { indicator, need, have }) => {
                    debug!(
                        symbol = reading.symbol,
                        indicator, need, have, "indicators warming up"
                    );
                }
                Err(e) => warn!(symbol = reading.symbol, error = %e, "signal evaluation failed"),
            }
        }

        // Decision phase (read-only): exits for open positions, then
        // candidate entries.
        let exits = self.decide_exits(&chains, &cycle_signals, now);
        let entries = self.decide_entries(&chains, &cycle_signals, now);

        // Write-back phase: exits first (freeing slots), then entries,
        // then the atomic snapshot.
        self.apply_exits(exits).await;
        self.apply_entries(entries, now).await;
        self.manager.prune_closed(CLOSED_RETENTION);

        self.store.save(&StateSnapshot {
            positions: self.manager.positions().to_vec(),
            signals: self.latest_signals.clone(),
            bars: self.latest_bars.clone(),
        })?;
        Ok(())
    }

    /// Fetches bar and chain for every symbol concurrently. A failed
    /// fetch yields `None` for that piece; the symbol is skipped, never
    /// fatal.
    async fn fetch_all(&self) -> Vec<SymbolReading> {
        let mut set = JoinSet::new();
        for symbol in self.profile.engine.symbols.clone() {
            let router = Arc::clone(&self.router);
            set.spawn(async move {
                let bar = match router.realtime(&symbol).await {
                    Ok(bar) => Some(bar),
                    Err(e) => {
                        debug!(symbol, error = %e, "realtime fetch failed");
                        None
                    }
                };
                let chain = match router.options_chain(&symbol).await {
                    Ok(chain) => Some(chain),
                    Err(e) => {
                        debug!(symbol, error = %e, "chain fetch failed");
                        None
                    }
                };
                SymbolReading { symbol, bar, chain }
            });
        }

        let mut readings = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(reading) => readings.push(reading),
                Err(e) => error!(error = %e, "symbol task panicked"),
            }
        }
        // Deterministic processing order regardless of task completion.
        readings.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        readings
    }

    fn decide_exits(
        &self,
        chains: &HashMap<String, OptionsChain>,
        cycle_signals: &BTreeMap<String, Signal>,
        now: DateTime<Utc>,
    ) -> Vec<(Position, ExitDecision)> {
        let mut exits = Vec::new();
        for position in self.manager.open_positions() {
            let symbol = &position.plan.symbol;
            let mark = chains.get(symbol).and_then(|chain| {
                position
                    .plan
                    .net_value(|leg| chain.find(leg).map(|quote| quote.mid()))
            });
            let decision =
                PositionManager::evaluate_exit(position, mark, cycle_signals.get(symbol), now);
            if let Some(decision) = decision {
                info!(
                    symbol,
                    position = %position.id,
                    ?decision,
                    "exit condition met"
                );
                exits.push((position.clone(), decision));
            }
        }
        exits
    }

    fn decide_entries(
        &self,
        chains: &HashMap<String, OptionsChain>,
        cycle_signals: &BTreeMap<String, Signal>,
        now: DateTime<Utc>,
    ) -> Vec<StrategyPlan> {
        let mut entries = Vec::new();
        for (symbol, signal) in cycle_signals {
            if self.manager.has_open_for(symbol) {
                continue;
            }
            let Some(chain) = chains.get(symbol) else {
                continue;
            };
            match self.selector.build_plan(signal, chain, now) {
                Ok(Some(plan)) => entries.push(plan),
                Ok(None) => {}
                Err(e) => warn!(symbol, error = %e, "plan assembly failed"),
            }
        }
        entries
    }

    async fn apply_exits(&mut self, exits: Vec<(Position, ExitDecision)>) {
        for (position, decision) in exits {
            match decision {
                ExitDecision::Close(reason) => {
                    match self.executor.close_position(&position).await {
                        Ok(realized) => {
                            self.manager.apply_exit(position.id, decision, realized);
                            info!(
                                symbol = position.plan.symbol,
                                %reason,
                                realized = %realized,
                                "position closed"
                            );
                        }
                        // Left open; re-evaluated next cycle.
                        Err(e) => warn!(
                            symbol = position.plan.symbol,
                            error = %e,
                            "close failed, position stays open"
                        ),
                    }
                }
                ExitDecision::Expire => {
                    // No orders to place: legs already expired. Model the
                    // terminal value as zero.
                    let contracts = Decimal::from(position.plan.contracts());
                    let realized =
                        -position.plan.entry_price * contracts * Decimal::from(100);
                    self.manager.apply_exit(position.id, decision, realized);
                    info!(symbol = position.plan.symbol, "position expired");
                }
            }
        }
    }

    async fn apply_entries(&mut self, entries: Vec<StrategyPlan>, now: DateTime<Utc>) {
        for plan in entries {
            if !self.manager.can_enter() {
                warn!(
                    symbol = plan.symbol,
                    open = self.manager.open_count(),
                    "max positions reached, dropping entry"
                );
                continue;
            }
            match self.executor.open_plan(&plan, now).await {
                Ok(position) => {
                    if let Err(e) = self.manager.admit(position) {
                        error!(symbol = plan.symbol, error = %e, "admission failed after fill");
                    }
                }
                // Legs already unwound by the executor; retried when the
                // signal persists.
                Err(e) => warn!(symbol = plan.symbol, error = %e, "entry execution failed"),
            }
        }
    }
}
