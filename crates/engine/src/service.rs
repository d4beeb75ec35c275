//! The live decision loop.
//!
//! One cycle per configured interval. Shutdown is only observed between
//! cycles, so an in-flight cycle always completes its write-back before
//! the loop halts.

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use optrade_core::traits::TradingPlatform;

use crate::cycle::Engine;

/// Handle used to request a graceful stop of [`run`].
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Creates a handle and its paired receiver.
    #[must_use]
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    /// Requests shutdown after the current cycle finishes.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Runs the decision loop until shutdown is requested.
///
/// # Errors
///
/// Returns an error only for unrecoverable state-persistence failures
/// surfaced by a cycle; transient data/execution problems are logged and
/// retried.
pub async fn run<P: TradingPlatform>(
    engine: &mut Engine<P>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(engine.cycle_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        interval_secs = engine.cycle_interval().as_secs(),
        "decision loop started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = engine.run_cycle(Utc::now()).await {
                    error!(error = %e, "cycle failed");
                }
            }
            _ = shutdown.changed() => {
                // Only reachable between cycles: the in-flight cycle's
                // write-back has already completed.
                info!("shutdown requested, decision loop stopping");
                break;
            }
        }
    }
    Ok(())
}
