use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::GatewayResult;
use crate::orders::{ConditionalKind, OrderFill, PositionSnapshot, TradeIntent};
use crate::signal::Signal;
use crate::state::PositionSide;

/// Authenticated exchange access. One instance is bound to one symbol.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Places a market order and waits for the fill.
    async fn place_market_order(
        &self,
        side: PositionSide,
        size: Decimal,
        intent: TradeIntent,
    ) -> GatewayResult<OrderFill>;

    /// Places a reduce-only conditional order and returns its id.
    async fn place_conditional_order(
        &self,
        side: PositionSide,
        trigger_price: Decimal,
        size: Decimal,
        kind: ConditionalKind,
    ) -> GatewayResult<String>;

    /// Cancels a live order. `AlreadyInactive` is expected when the order
    /// filled or was cancelled out of band.
    async fn cancel_order(&self, order_id: &str) -> GatewayResult<()>;

    /// Queries the exchange's authoritative position on the bound symbol.
    async fn query_position(&self) -> GatewayResult<PositionSnapshot>;

    /// Fetches the latest traded price for the bound symbol.
    async fn last_price(&self) -> GatewayResult<Decimal>;
}

/// Produces one directional recommendation per observed price sample.
/// Implementations are pure over their accumulated price history and have
/// no exchange side effects.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Feeds the latest price and returns the signal for this tick.
    async fn next_signal(&mut self, price: Decimal) -> anyhow::Result<Signal>;
}
