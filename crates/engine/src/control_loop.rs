//! The sequential polling loop that drives the controller.
//!
//! One tick = reload the record, reconcile against the exchange, then (when
//! not paused) fetch a price, compute the signal and run one controller
//! step. Ticks never overlap; everything in here is single-writer by
//! construction.

use std::sync::Arc;
use std::time::Duration;

use perp_scalper_core::{ExchangeGateway, SignalSource, TradingConfig};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::controller::{LifecycleController, TickOutcome};
use crate::reconciler::Reconciler;
use crate::state_store::StateStore;

pub struct ControlLoop {
    store: Arc<StateStore>,
    gateway: Arc<dyn ExchangeGateway>,
    signal_source: Box<dyn SignalSource>,
    controller: LifecycleController,
    reconciler: Reconciler,
    poll_interval: Duration,
    reject_backoff: Duration,
    shutdown: watch::Receiver<bool>,
}

impl ControlLoop {
    #[must_use]
    pub fn new(
        store: Arc<StateStore>,
        gateway: Arc<dyn ExchangeGateway>,
        signal_source: Box<dyn SignalSource>,
        controller: LifecycleController,
        config: &TradingConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let reconciler = Reconciler::new(gateway.clone());
        Self {
            store,
            gateway,
            signal_source,
            controller,
            reconciler,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            reject_backoff: Duration::from_millis(config.reject_backoff_ms),
            shutdown,
        }
    }

    /// Runs until the shutdown flag flips. Exchange failures are logged and
    /// retried on the next tick; only persistence failures end the loop.
    ///
    /// # Errors
    /// Returns an error when the position record cannot be read or written.
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!(interval_ms = self.poll_interval.as_millis() as u64, "control loop started");

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("shutdown requested, control loop stopping");
                        return Ok(());
                    }
                    continue;
                }
            }

            if let Some(outcome) = self.tick().await? {
                if outcome == TickOutcome::Backoff {
                    debug!(backoff_ms = self.reject_backoff.as_millis() as u64, "backing off");
                    tokio::select! {
                        () = tokio::time::sleep(self.reject_backoff) => {}
                        changed = self.shutdown.changed() => {
                            if changed.is_err() || *self.shutdown.borrow() {
                                info!("shutdown requested, control loop stopping");
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }

    /// One full tick. `None` means the tick stopped before the controller
    /// ran (paused, or reconciliation/price unavailable).
    async fn tick(&mut self) -> anyhow::Result<Option<TickOutcome>> {
        // Reload every tick so pause toggles from the API take effect.
        let mut state = self.store.load()?;

        match self.reconciler.reconcile(&mut state).await {
            Ok(true) => self.store.save(&mut state)?,
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "reconciliation failed, skipping tick");
                return Ok(None);
            }
        }

        if state.paused {
            debug!("paused, holding");
            return Ok(None);
        }

        let price = match self.gateway.last_price().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "price unavailable, skipping tick");
                return Ok(None);
            }
        };

        let signal = match self.signal_source.next_signal(price).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "signal computation failed, skipping tick");
                return Ok(None);
            }
        };

        let outcome = self.controller.step(&mut state, price, &signal).await?;
        Ok(Some(outcome))
    }
}
