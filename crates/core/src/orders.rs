//! Order and position types exchanged with the gateway.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::state::PositionSide;

/// Whether a market order opens new exposure or closes existing exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeIntent {
    Open,
    Close,
}

/// The kind of conditional (trigger) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionalKind {
    Stop,
    TakeProfit,
}

/// Result of a filled market order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFill {
    pub order_id: String,
    pub filled_price: Decimal,
}

/// The exchange's authoritative view of the position on the configured
/// symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// True if the exchange reports a nonzero position.
    pub open: bool,
    /// Direction of the exchange-side position, if any.
    pub side: Option<PositionSide>,
    /// Remaining position size as reported by the exchange.
    pub size: Decimal,
}

impl PositionSnapshot {
    /// Snapshot for a flat account.
    #[must_use]
    pub fn flat() -> Self {
        Self {
            open: false,
            side: None,
            size: Decimal::ZERO,
        }
    }
}
