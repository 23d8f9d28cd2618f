//! Protective bracket orders: one stop plus a take-profit ladder.
//!
//! Placement is tolerant of partial failure. A rung that fails to place is
//! skipped and retried on a later tick; the rest of the ladder still goes
//! out. All trigger prices are rounded to the instrument tick before they
//! reach the exchange.

use std::sync::Arc;

use perp_scalper_core::{
    ConditionalKind, ExchangeGateway, GatewayResult, PositionSide, PositionState, TakeProfitOrder,
    TradingConfig,
};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{info, warn};

/// Rounds `price` to the nearest multiple of `tick`, halves away from zero.
#[must_use]
pub fn round_to_tick(price: Decimal, tick: Decimal) -> Decimal {
    if tick <= Decimal::ZERO {
        return price;
    }
    let ticks = (price / tick).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    (ticks * tick).normalize()
}

pub struct BracketManager {
    gateway: Arc<dyn ExchangeGateway>,
    config: TradingConfig,
}

impl BracketManager {
    #[must_use]
    pub fn new(gateway: Arc<dyn ExchangeGateway>, config: TradingConfig) -> Self {
        Self { gateway, config }
    }

    /// Initial stop trigger for a fill at `entry`: below entry for longs,
    /// above for shorts.
    #[must_use]
    pub fn initial_stop_price(&self, side: PositionSide, entry: Decimal) -> Decimal {
        let raw = match side {
            PositionSide::Long => entry * (Decimal::ONE - self.config.sl_pct),
            PositionSide::Short => entry * (Decimal::ONE + self.config.sl_pct),
        };
        round_to_tick(raw, self.config.tick_size)
    }

    /// Stop trigger after a break-even ratchet with the given offset from
    /// entry (0 = exact break-even, positive = locked-in profit).
    #[must_use]
    pub fn ratchet_stop_price(&self, side: PositionSide, entry: Decimal, offset: Decimal) -> Decimal {
        let raw = match side {
            PositionSide::Long => entry * (Decimal::ONE + offset),
            PositionSide::Short => entry * (Decimal::ONE - offset),
        };
        round_to_tick(raw, self.config.tick_size)
    }

    /// Trigger price of the take-profit rung at `pct_offset` from entry.
    #[must_use]
    pub fn target_price(&self, side: PositionSide, entry: Decimal, pct_offset: Decimal) -> Decimal {
        let raw = match side {
            PositionSide::Long => entry * (Decimal::ONE + pct_offset),
            PositionSide::Short => entry * (Decimal::ONE - pct_offset),
        };
        round_to_tick(raw, self.config.tick_size)
    }

    /// Places the protective stop and returns its order id.
    ///
    /// # Errors
    /// Propagates the placement failure so the caller can retry next tick.
    pub async fn place_stop(
        &self,
        side: PositionSide,
        trigger_price: Decimal,
        size: Decimal,
    ) -> GatewayResult<String> {
        let order_id = self
            .gateway
            .place_conditional_order(side, trigger_price, size, ConditionalKind::Stop)
            .await?;
        info!(side = %side, trigger = %trigger_price, order_id = %order_id, "stop placed");
        Ok(order_id)
    }

    /// Places every take-profit rung that is not already live in `existing`.
    ///
    /// Rungs are matched to levels by trigger price. Failures are logged and
    /// skipped; the returned ladder contains everything that is live after
    /// this pass, nearest target first.
    pub async fn place_missing_take_profits(
        &self,
        side: PositionSide,
        entry: Decimal,
        position_size: Decimal,
        existing: &[TakeProfitOrder],
    ) -> Vec<TakeProfitOrder> {
        let mut ladder = Vec::with_capacity(self.config.tp_levels.len());
        for level in &self.config.tp_levels {
            let target = self.target_price(side, entry, level.pct_offset);
            if let Some(live) = existing.iter().find(|tp| tp.target_price == target) {
                ladder.push(live.clone());
                continue;
            }
            let size = position_size * level.volume_fraction;
            match self
                .gateway
                .place_conditional_order(side, target, size, ConditionalKind::TakeProfit)
                .await
            {
                Ok(order_id) => {
                    info!(target = %target, size = %size, order_id = %order_id, "take-profit placed");
                    ladder.push(TakeProfitOrder {
                        order_id,
                        target_price: target,
                        volume_fraction: level.volume_fraction,
                    });
                }
                Err(e) => {
                    warn!(target = %target, error = %e, "take-profit placement failed, will retry");
                }
            }
        }
        ladder
    }

    /// Best-effort cancel of every order in the bracket. An order that the
    /// exchange no longer knows about counts as cancelled.
    pub async fn cancel_all(&self, state: &PositionState) {
        if let Some(order_id) = &state.stop_order_id {
            self.cancel_one(order_id, "stop").await;
        }
        for tp in &state.take_profits {
            self.cancel_one(&tp.order_id, "take-profit").await;
        }
    }

    async fn cancel_one(&self, order_id: &str, label: &str) {
        match self.gateway.cancel_order(order_id).await {
            Ok(()) => info!(order_id, label, "order cancelled"),
            Err(e) if e.confirms_absence() => {
                info!(order_id, label, "order already gone")
            }
            Err(e) => warn!(order_id, label, error = %e, "cancel failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use perp_scalper_core::{AppConfig, GatewayError, OrderFill, PositionSnapshot, TradeIntent};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_to_tick(dec!(100.05), dec!(0.1)), dec!(100.1));
        assert_eq!(round_to_tick(dec!(100.04), dec!(0.1)), dec!(100));
        assert_eq!(round_to_tick(dec!(100.15), dec!(0.1)), dec!(100.2));
    }

    #[test]
    fn exact_multiples_are_untouched() {
        assert_eq!(round_to_tick(dec!(49_000), dec!(0.5)), dec!(49_000));
    }

    #[test]
    fn coarse_tick() {
        assert_eq!(round_to_tick(dec!(100.26), dec!(0.25)), dec!(100.25));
        assert_eq!(round_to_tick(dec!(100.38), dec!(0.25)), dec!(100.5));
    }

    /// Gateway that records conditional orders and can fail selected rungs.
    struct LadderGateway {
        placed: Mutex<Vec<(Decimal, Decimal, ConditionalKind)>>,
        fail_targets: Vec<Decimal>,
        cancelled: Mutex<Vec<String>>,
        next_id: Mutex<u32>,
    }

    impl LadderGateway {
        fn new(fail_targets: Vec<Decimal>) -> Arc<Self> {
            Arc::new(Self {
                placed: Mutex::new(Vec::new()),
                fail_targets,
                cancelled: Mutex::new(Vec::new()),
                next_id: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl ExchangeGateway for LadderGateway {
        async fn place_market_order(
            &self,
            _side: PositionSide,
            _size: Decimal,
            _intent: TradeIntent,
        ) -> GatewayResult<OrderFill> {
            unreachable!()
        }

        async fn place_conditional_order(
            &self,
            _side: PositionSide,
            trigger_price: Decimal,
            size: Decimal,
            kind: ConditionalKind,
        ) -> GatewayResult<String> {
            if self.fail_targets.contains(&trigger_price) {
                return Err(GatewayError::Timeout("plan order".into()));
            }
            self.placed.lock().unwrap().push((trigger_price, size, kind));
            let mut id = self.next_id.lock().unwrap();
            *id += 1;
            Ok(format!("oid-{}", *id))
        }

        async fn cancel_order(&self, order_id: &str) -> GatewayResult<()> {
            self.cancelled.lock().unwrap().push(order_id.to_string());
            Ok(())
        }

        async fn query_position(&self) -> GatewayResult<PositionSnapshot> {
            Ok(PositionSnapshot::flat())
        }

        async fn last_price(&self) -> GatewayResult<Decimal> {
            Ok(dec!(50_000))
        }
    }

    fn manager(gateway: Arc<LadderGateway>) -> BracketManager {
        BracketManager::new(gateway, AppConfig::default().trading)
    }

    #[tokio::test]
    async fn full_ladder_places_every_rung() {
        let gateway = LadderGateway::new(vec![]);
        let brackets = manager(gateway.clone());

        let ladder = brackets
            .place_missing_take_profits(PositionSide::Long, dec!(50_000), dec!(1), &[])
            .await;

        assert_eq!(ladder.len(), 3);
        // default ladder: +1% / +2% / +3% of a 50k entry
        assert_eq!(ladder[0].target_price, dec!(50_500));
        assert_eq!(ladder[1].target_price, dec!(51_000));
        assert_eq!(ladder[2].target_price, dec!(51_500));
        let placed = gateway.placed.lock().unwrap();
        assert_eq!(placed[0].1, dec!(0.5));
        assert_eq!(placed[1].1, dec!(0.3));
        assert_eq!(placed[2].1, dec!(0.2));
    }

    #[tokio::test]
    async fn failed_rung_is_skipped_not_fatal() {
        let gateway = LadderGateway::new(vec![dec!(51_000)]);
        let brackets = manager(gateway);

        let ladder = brackets
            .place_missing_take_profits(PositionSide::Long, dec!(50_000), dec!(1), &[])
            .await;

        assert_eq!(ladder.len(), 2);
        assert_eq!(ladder[0].target_price, dec!(50_500));
        assert_eq!(ladder[1].target_price, dec!(51_500));
    }

    #[tokio::test]
    async fn refill_only_places_the_missing_rung() {
        let gateway = LadderGateway::new(vec![]);
        let brackets = manager(gateway.clone());

        let existing = vec![
            TakeProfitOrder {
                order_id: "live-1".into(),
                target_price: dec!(50_500),
                volume_fraction: dec!(0.5),
            },
            TakeProfitOrder {
                order_id: "live-3".into(),
                target_price: dec!(51_500),
                volume_fraction: dec!(0.2),
            },
        ];
        let ladder = brackets
            .place_missing_take_profits(PositionSide::Long, dec!(50_000), dec!(1), &existing)
            .await;

        assert_eq!(ladder.len(), 3);
        assert_eq!(ladder[0].order_id, "live-1");
        assert_eq!(ladder[2].order_id, "live-3");
        assert_eq!(gateway.placed.lock().unwrap().len(), 1);
        assert_eq!(gateway.placed.lock().unwrap()[0].0, dec!(51_000));
    }

    #[tokio::test]
    async fn short_ladder_targets_below_entry() {
        let gateway = LadderGateway::new(vec![]);
        let brackets = manager(gateway);

        let ladder = brackets
            .place_missing_take_profits(PositionSide::Short, dec!(50_000), dec!(1), &[])
            .await;
        assert_eq!(ladder[0].target_price, dec!(49_500));
        assert_eq!(ladder[2].target_price, dec!(48_500));
    }

    #[test]
    fn stop_prices_sit_on_the_protective_side() {
        let gateway = LadderGateway::new(vec![]);
        let brackets = manager(gateway);

        assert_eq!(
            brackets.initial_stop_price(PositionSide::Long, dec!(50_000)),
            dec!(49_000)
        );
        assert_eq!(
            brackets.initial_stop_price(PositionSide::Short, dec!(50_000)),
            dec!(51_000)
        );
        // stage-2 ratchet locks in 1% for a long
        assert_eq!(
            brackets.ratchet_stop_price(PositionSide::Long, dec!(50_000), dec!(0.01)),
            dec!(50_500)
        );
        assert_eq!(
            brackets.ratchet_stop_price(PositionSide::Short, dec!(50_000), dec!(0.01)),
            dec!(49_500)
        );
    }

    #[tokio::test]
    async fn cancel_all_sweeps_stop_and_ladder() {
        let gateway = LadderGateway::new(vec![]);
        let brackets = manager(gateway.clone());

        let mut state = PositionState::closed();
        state.stop_order_id = Some("stop-1".into());
        state.take_profits = vec![TakeProfitOrder {
            order_id: "tp-1".into(),
            target_price: dec!(50_500),
            volume_fraction: dec!(0.5),
        }];
        brackets.cancel_all(&state).await;

        let cancelled = gateway.cancelled.lock().unwrap();
        assert_eq!(*cancelled, vec!["stop-1".to_string(), "tp-1".to_string()]);
    }
}
