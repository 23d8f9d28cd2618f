//! The position lifecycle rule engine.
//!
//! One call to [`LifecycleController::step`] is one decision tick. Rules are
//! evaluated in a fixed order and the first one that fires ends the tick:
//!
//! 1. flat + directional signal: open a position with its bracket
//! 2. price crossed the stop: close at market
//! 3. first take-profit threshold reached: ratchet the stop past entry
//! 4. second threshold reached: ratchet again, locking in profit
//! 5. contrary signal: count it; at the configured threshold, flip
//!
//! The record is persisted before any action that opens new exposure and
//! after any action that reduces it, so a crash between the two never
//! leaves unknown risk behind.

use std::sync::Arc;

use anyhow::Context;
use perp_scalper_core::{
    BreakEvenStage, ExchangeGateway, GatewayError, PositionSide, PositionState, Signal,
    TradeIntent, TradingConfig,
};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::bracket::BracketManager;
use crate::state_store::StateStore;

/// What a tick did, for logging and for the loop's backoff decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A new position was opened.
    Opened(PositionSide),
    /// The position was closed.
    Closed,
    /// The stop was ratcheted to the given stage.
    Ratcheted(BreakEvenStage),
    /// The position was closed and reopened on the other side.
    Flipped(PositionSide),
    /// Nothing actionable this tick (or a transient failure to retry).
    Held,
    /// An order was rejected; the loop should back off before retrying.
    Backoff,
}

pub struct LifecycleController {
    store: Arc<StateStore>,
    gateway: Arc<dyn ExchangeGateway>,
    brackets: BracketManager,
    config: TradingConfig,
}

impl LifecycleController {
    #[must_use]
    pub fn new(
        store: Arc<StateStore>,
        gateway: Arc<dyn ExchangeGateway>,
        brackets: BracketManager,
        config: TradingConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            brackets,
            config,
        }
    }

    /// Runs one decision tick against the current record, price and signal.
    ///
    /// Exchange failures are absorbed per their class (transient ones retry
    /// on the next tick, rejections request a backoff); only persistence
    /// failures propagate, because continuing without a durable record is
    /// how phantom positions happen.
    ///
    /// # Errors
    /// Returns an error when the record cannot be persisted, or when the
    /// record itself is internally inconsistent.
    pub async fn step(
        &self,
        state: &mut PositionState,
        price: Decimal,
        signal: &Signal,
    ) -> anyhow::Result<TickOutcome> {
        if !state.is_open {
            return match signal.direction {
                Some(direction) => self.open_position(state, direction.side()).await,
                None => Ok(TickOutcome::Held),
            };
        }

        let side = state.side.context("open record without a side")?;
        let entry = state.entry_price.context("open record without an entry price")?;

        // Replace anything lost to an earlier partial failure before
        // evaluating the rules against it.
        self.repair_brackets(state, side, entry).await?;

        if let Some(stop) = state.stop_price {
            if stop_crossed(side, price, stop) {
                info!(side = %side, price = %price, stop = %stop, "stop price crossed");
                return self.close_position(state, side).await;
            }
        }

        if let Some(outcome) = self.maybe_ratchet(state, side, entry, price).await? {
            return Ok(outcome);
        }

        self.track_reversals(state, side, signal).await
    }

    async fn open_position(
        &self,
        state: &mut PositionState,
        side: PositionSide,
    ) -> anyhow::Result<TickOutcome> {
        let fill = match self
            .gateway
            .place_market_order(side, self.config.order_size, TradeIntent::Open)
            .await
        {
            Ok(fill) => fill,
            Err(e) => return Ok(self.absorb(&e, "open order")),
        };

        // Commit the open before placing the bracket: if we crash here the
        // next start still knows about the exposure.
        state.is_open = true;
        state.side = Some(side);
        state.entry_price = Some(fill.filled_price);
        state.stop_price = Some(self.brackets.initial_stop_price(side, fill.filled_price));
        state.stop_order_id = None;
        state.take_profits.clear();
        state.break_even_stage = BreakEvenStage::None;
        state.reversal_count = 0;
        self.store.save(state)?;

        info!(side = %side, entry = %fill.filled_price, "position opened");

        self.repair_brackets(state, side, fill.filled_price).await?;
        Ok(TickOutcome::Opened(side))
    }

    /// Places whatever part of the bracket is missing: the stop after a
    /// failed placement or ratchet, and any take-profit rungs that were
    /// skipped. Safe to call every tick; it is a no-op when everything is
    /// live.
    async fn repair_brackets(
        &self,
        state: &mut PositionState,
        side: PositionSide,
        entry: Decimal,
    ) -> anyhow::Result<()> {
        let stop_missing = state.stop_order_id.is_none();
        let rungs_missing = state.take_profits.len() < self.config.tp_levels.len();
        if !stop_missing && !rungs_missing {
            return Ok(());
        }

        let snapshot = match self.gateway.query_position().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "position query failed, deferring bracket repair");
                return Ok(());
            }
        };
        if !snapshot.open {
            // Reconciliation will reset the record next tick.
            return Ok(());
        }

        if stop_missing {
            if let Some(stop) = state.stop_price {
                match self.brackets.place_stop(side, stop, snapshot.size).await {
                    Ok(order_id) => state.stop_order_id = Some(order_id),
                    Err(e) => warn!(error = %e, "stop placement failed, will retry"),
                }
            }
        }

        if rungs_missing {
            state.take_profits = self
                .brackets
                .place_missing_take_profits(side, entry, snapshot.size, &state.take_profits)
                .await;
        }

        self.store.save(state)?;
        Ok(())
    }

    async fn maybe_ratchet(
        &self,
        state: &mut PositionState,
        side: PositionSide,
        entry: Decimal,
        price: Decimal,
    ) -> anyhow::Result<Option<TickOutcome>> {
        let next = match state.break_even_stage {
            BreakEvenStage::None => Some((
                BreakEvenStage::Stage1,
                self.config.tp_levels.first().map(|l| l.pct_offset),
                self.config.be_offset_1,
            )),
            BreakEvenStage::Stage1 => Some((
                BreakEvenStage::Stage2,
                self.config.tp_levels.get(1).map(|l| l.pct_offset),
                self.config.be_offset_2,
            )),
            BreakEvenStage::Stage2 => None,
        };
        let Some((stage, Some(threshold_offset), stop_offset)) = next else {
            return Ok(None);
        };

        let threshold = self.brackets.target_price(side, entry, threshold_offset);
        if !target_reached(side, price, threshold) {
            return Ok(None);
        }

        info!(side = %side, price = %price, threshold = %threshold, ?stage, "break-even threshold reached");

        let snapshot = match self.gateway.query_position().await {
            Ok(s) => s,
            Err(e) => return Ok(Some(self.absorb(&e, "position query for ratchet"))),
        };
        if !snapshot.open {
            // Position vanished between ticks; reconciliation handles it.
            return Ok(Some(TickOutcome::Held));
        }

        let new_stop = self.brackets.ratchet_stop_price(side, entry, stop_offset);
        if let Some(current) = state.stop_price {
            if !tightens(side, new_stop, current) {
                // Rounding left the stop where it was; just advance the stage.
                state.break_even_stage = stage;
                self.store.save(state)?;
                return Ok(Some(TickOutcome::Ratcheted(stage)));
            }
        }

        if let Some(order_id) = state.stop_order_id.take() {
            match self.gateway.cancel_order(&order_id).await {
                Ok(()) => {}
                Err(e) if e.confirms_absence() => {
                    info!(order_id = %order_id, "old stop already gone");
                }
                Err(e) => {
                    // Keep the old stop live and try the ratchet next tick.
                    state.stop_order_id = Some(order_id);
                    return Ok(Some(self.absorb(&e, "stop cancel for ratchet")));
                }
            }
        }

        // The old stop is gone; record the tighter trigger before placing
        // so a crash here resumes at the new level, not the old one.
        state.stop_price = Some(new_stop);
        state.break_even_stage = stage;
        self.store.save(state)?;

        match self.brackets.place_stop(side, new_stop, snapshot.size).await {
            Ok(order_id) => {
                state.stop_order_id = Some(order_id);
                self.store.save(state)?;
            }
            Err(e) => {
                warn!(error = %e, "replacement stop failed, repair will retry");
            }
        }
        info!(side = %side, stop = %new_stop, ?stage, "stop ratcheted");
        Ok(Some(TickOutcome::Ratcheted(stage)))
    }

    async fn track_reversals(
        &self,
        state: &mut PositionState,
        side: PositionSide,
        signal: &Signal,
    ) -> anyhow::Result<TickOutcome> {
        let contrary = signal
            .direction
            .is_some_and(|direction| direction.opposes(side));

        if !contrary {
            if state.reversal_count != 0 {
                state.reversal_count = 0;
                self.store.save(state)?;
            }
            return Ok(TickOutcome::Held);
        }

        state.reversal_count += 1;
        info!(
            side = %side,
            count = state.reversal_count,
            threshold = self.config.reversal_threshold,
            "contrary signal"
        );

        if self.config.reversal_threshold == 0
            || state.reversal_count < self.config.reversal_threshold
        {
            self.store.save(state)?;
            return Ok(TickOutcome::Held);
        }

        self.flip(state, side).await
    }

    async fn flip(
        &self,
        state: &mut PositionState,
        side: PositionSide,
    ) -> anyhow::Result<TickOutcome> {
        info!(from = %side, to = %side.opposite(), "reversal threshold reached, flipping");

        match self.close_position(state, side).await? {
            TickOutcome::Closed => {}
            other => return Ok(other),
        }

        // The record is durably flat here; if the reopen fails we stay flat
        // and the next signal decides.
        match self.open_position(state, side.opposite()).await? {
            TickOutcome::Opened(new_side) => Ok(TickOutcome::Flipped(new_side)),
            other => Ok(other),
        }
    }

    async fn close_position(
        &self,
        state: &mut PositionState,
        side: PositionSide,
    ) -> anyhow::Result<TickOutcome> {
        // Sweep the bracket first so nothing triggers mid-close, and drop
        // the dead order ids from the record right away: if the close below
        // fails and the position lives on, repair must re-place the bracket
        // rather than trust ids that no longer exist on the exchange.
        self.brackets.cancel_all(state).await;
        state.stop_order_id = None;
        state.take_profits.clear();
        self.store.save(state)?;

        let snapshot = match self.gateway.query_position().await {
            Ok(s) => s,
            Err(e) => return Ok(self.absorb(&e, "position query for close")),
        };

        if snapshot.open {
            match self
                .gateway
                .place_market_order(side, snapshot.size, TradeIntent::Close)
                .await
            {
                Ok(fill) => {
                    info!(side = %side, price = %fill.filled_price, "position closed");
                }
                Err(e) if e.confirms_absence() => {
                    // Already flat on the exchange; that is the end state we
                    // wanted.
                    info!(side = %side, "exchange reports nothing to close");
                }
                Err(e) => return Ok(self.absorb(&e, "close order")),
            }
        } else {
            info!(side = %side, "exchange already flat");
        }

        state.reset_to_closed();
        self.store.save(state)?;
        Ok(TickOutcome::Closed)
    }

    /// Maps an exchange failure to a tick outcome. Transient failures are
    /// simply retried on the next tick; everything else asks for a backoff.
    fn absorb(&self, e: &GatewayError, action: &str) -> TickOutcome {
        if e.is_transient() {
            warn!(action, error = %e, "transient exchange failure, retrying next tick");
            TickOutcome::Held
        } else {
            error!(action, error = %e, "exchange refused action, backing off");
            TickOutcome::Backoff
        }
    }
}

fn stop_crossed(side: PositionSide, price: Decimal, stop: Decimal) -> bool {
    match side {
        PositionSide::Long => price <= stop,
        PositionSide::Short => price >= stop,
    }
}

fn target_reached(side: PositionSide, price: Decimal, target: Decimal) -> bool {
    match side {
        PositionSide::Long => price >= target,
        PositionSide::Short => price <= target,
    }
}

/// True when `candidate` is strictly closer to (or past) entry-profit than
/// `current`, i.e. the stop only ever moves in the favorable direction.
fn tightens(side: PositionSide, candidate: Decimal, current: Decimal) -> bool {
    match side {
        PositionSide::Long => candidate > current,
        PositionSide::Short => candidate < current,
    }
}
