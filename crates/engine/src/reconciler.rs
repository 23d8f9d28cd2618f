//! Drift repair between the persisted record and the exchange.
//!
//! The exchange is the source of truth. When it says the position is gone
//! (stop filled, liquidation, manual close) the local record is reset so the
//! controller never acts on a phantom position.

use std::sync::Arc;

use perp_scalper_core::{ExchangeGateway, GatewayResult, PositionState};
use tracing::{debug, warn};

pub struct Reconciler {
    gateway: Arc<dyn ExchangeGateway>,
}

impl Reconciler {
    #[must_use]
    pub fn new(gateway: Arc<dyn ExchangeGateway>) -> Self {
        Self { gateway }
    }

    /// Compares the record against the exchange and repairs drift in place.
    ///
    /// Returns `true` when the record changed and needs to be persisted.
    /// Running it twice in a row is a no-op the second time.
    ///
    /// # Errors
    /// Propagates the position query failure; the record is left untouched
    /// so the caller can retry on the next tick.
    pub async fn reconcile(&self, state: &mut PositionState) -> GatewayResult<bool> {
        let snapshot = self.gateway.query_position().await?;

        if state.is_open {
            if !snapshot.open {
                warn!(
                    side = ?state.side,
                    "exchange reports flat while record is open, resetting record"
                );
                state.reset_to_closed();
                return Ok(true);
            }
            if snapshot.side != state.side {
                warn!(
                    recorded = ?state.side,
                    exchange = ?snapshot.side,
                    "exchange position side differs from record, resetting record"
                );
                state.reset_to_closed();
                return Ok(true);
            }
            debug!(size = %snapshot.size, "record matches exchange");
        } else if snapshot.open {
            // Never adopt a position this process did not open.
            warn!(
                side = ?snapshot.side,
                size = %snapshot.size,
                "exchange holds a position the record does not know about; leaving it alone"
            );
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use perp_scalper_core::{
        ConditionalKind, GatewayError, OrderFill, PositionSide, PositionSnapshot, TradeIntent,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct FixedPositionGateway {
        snapshot: Mutex<GatewayResult<PositionSnapshot>>,
    }

    impl FixedPositionGateway {
        fn reporting(snapshot: PositionSnapshot) -> Arc<Self> {
            Arc::new(Self {
                snapshot: Mutex::new(Ok(snapshot)),
            })
        }

        fn failing(err: GatewayError) -> Arc<Self> {
            Arc::new(Self {
                snapshot: Mutex::new(Err(err)),
            })
        }
    }

    #[async_trait]
    impl ExchangeGateway for FixedPositionGateway {
        async fn place_market_order(
            &self,
            _side: PositionSide,
            _size: Decimal,
            _intent: TradeIntent,
        ) -> GatewayResult<OrderFill> {
            unreachable!("reconciler never trades")
        }

        async fn place_conditional_order(
            &self,
            _side: PositionSide,
            _trigger_price: Decimal,
            _size: Decimal,
            _kind: ConditionalKind,
        ) -> GatewayResult<String> {
            unreachable!("reconciler never trades")
        }

        async fn cancel_order(&self, _order_id: &str) -> GatewayResult<()> {
            unreachable!("reconciler never trades")
        }

        async fn query_position(&self) -> GatewayResult<PositionSnapshot> {
            match &*self.snapshot.lock().unwrap() {
                Ok(s) => Ok(*s),
                Err(e) => Err(GatewayError::Network(e.to_string())),
            }
        }

        async fn last_price(&self) -> GatewayResult<Decimal> {
            Ok(dec!(50_000))
        }
    }

    fn open_long() -> PositionState {
        let mut state = PositionState::closed();
        state.is_open = true;
        state.side = Some(PositionSide::Long);
        state.entry_price = Some(dec!(50_000));
        state.stop_price = Some(dec!(49_000));
        state.reversal_count = 1;
        state
    }

    #[tokio::test]
    async fn exchange_flat_resets_open_record() {
        let gateway = FixedPositionGateway::reporting(PositionSnapshot::flat());
        let reconciler = Reconciler::new(gateway);

        let mut state = open_long();
        assert!(reconciler.reconcile(&mut state).await.unwrap());
        assert!(!state.is_open);
        assert!(state.side.is_none());
        assert!(state.stop_price.is_none());
        assert_eq!(state.reversal_count, 0);
    }

    #[tokio::test]
    async fn side_mismatch_resets_record() {
        let gateway = FixedPositionGateway::reporting(PositionSnapshot {
            open: true,
            side: Some(PositionSide::Short),
            size: dec!(0.01),
        });
        let reconciler = Reconciler::new(gateway);

        let mut state = open_long();
        assert!(reconciler.reconcile(&mut state).await.unwrap());
        assert!(!state.is_open);
    }

    #[tokio::test]
    async fn matching_position_is_untouched() {
        let gateway = FixedPositionGateway::reporting(PositionSnapshot {
            open: true,
            side: Some(PositionSide::Long),
            size: dec!(0.01),
        });
        let reconciler = Reconciler::new(gateway);

        let mut state = open_long();
        assert!(!reconciler.reconcile(&mut state).await.unwrap());
        assert!(state.is_open);
        assert_eq!(state.stop_price, Some(dec!(49_000)));
    }

    #[tokio::test]
    async fn unknown_exchange_position_is_not_adopted() {
        let gateway = FixedPositionGateway::reporting(PositionSnapshot {
            open: true,
            side: Some(PositionSide::Short),
            size: dec!(0.05),
        });
        let reconciler = Reconciler::new(gateway);

        let mut state = PositionState::closed();
        assert!(!reconciler.reconcile(&mut state).await.unwrap());
        assert!(!state.is_open);
    }

    #[tokio::test]
    async fn query_failure_leaves_record_untouched() {
        let gateway = FixedPositionGateway::failing(GatewayError::Timeout("poll".into()));
        let reconciler = Reconciler::new(gateway);

        let mut state = open_long();
        assert!(reconciler.reconcile(&mut state).await.is_err());
        assert!(state.is_open);
        assert_eq!(state.reversal_count, 1);
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let gateway = FixedPositionGateway::reporting(PositionSnapshot::flat());
        let reconciler = Reconciler::new(gateway);

        let mut state = open_long();
        assert!(reconciler.reconcile(&mut state).await.unwrap());
        assert!(!reconciler.reconcile(&mut state).await.unwrap());
    }
}
