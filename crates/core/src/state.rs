//! The persisted position record and its invariants.
//!
//! Exactly one `PositionState` exists per bot instance. It is mutated only by
//! the lifecycle controller and the reconciler, and persisted atomically after
//! every committed transition.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Returns the opposite side (used when flipping a position).
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    /// Returns the display string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Break-even ratchet progress. Only ever moves forward while a position
/// is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BreakEvenStage {
    #[default]
    None,
    Stage1,
    Stage2,
}

/// One live take-profit order. Insertion order in `PositionState.take_profits`
/// is execution priority (TP1 first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeProfitOrder {
    /// Exchange order id of the conditional order.
    pub order_id: String,
    /// Trigger price, already rounded to the instrument tick.
    pub target_price: Decimal,
    /// Fraction of the position size this order closes.
    pub volume_fraction: Decimal,
}

/// The single persisted record of the bot's position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionState {
    /// True between a confirmed open and a confirmed close.
    pub is_open: bool,
    /// Direction of the current position; `None` when closed.
    pub side: Option<PositionSide>,
    /// Fill price of the opening order.
    pub entry_price: Option<Decimal>,
    /// Current protective stop trigger. Only ever tightens while open.
    pub stop_price: Option<Decimal>,
    /// Exchange order id of the live stop (needed to cancel-and-replace on
    /// ratchet).
    pub stop_order_id: Option<String>,
    /// Live take-profit ladder, TP1 first. Fractions sum to at most 1.
    pub take_profits: Vec<TakeProfitOrder>,
    /// Highest break-even ratchet applied so far.
    pub break_even_stage: BreakEvenStage,
    /// Consecutive contrary-signal observations since the last reset.
    pub reversal_count: u32,
    /// Operator pause flag. When true the controller reconciles but places
    /// no new orders. Survives position resets.
    pub paused: bool,
    /// When this record was last persisted.
    pub updated_at: DateTime<Utc>,
}

impl PositionState {
    /// A fresh closed record (the state on first load).
    #[must_use]
    pub fn closed() -> Self {
        Self {
            is_open: false,
            side: None,
            entry_price: None,
            stop_price: None,
            stop_order_id: None,
            take_profits: Vec::new(),
            break_even_stage: BreakEvenStage::None,
            reversal_count: 0,
            paused: false,
            updated_at: Utc::now(),
        }
    }

    /// Clears every trading field back to the closed defaults, preserving
    /// the operator pause flag.
    pub fn reset_to_closed(&mut self) {
        self.is_open = false;
        self.side = None;
        self.entry_price = None;
        self.stop_price = None;
        self.stop_order_id = None;
        self.take_profits.clear();
        self.break_even_stage = BreakEvenStage::None;
        self.reversal_count = 0;
    }

    /// Checks the record invariants. Every committed transition must leave
    /// the record in a state where this passes.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.is_open {
            if self.side.is_none() {
                anyhow::bail!("open position has no side");
            }
            if self.entry_price.is_none() {
                anyhow::bail!("open position has no entry price");
            }
            if self.stop_price.is_none() {
                anyhow::bail!("open position has no stop price");
            }
        } else {
            if self.side.is_some() {
                anyhow::bail!("closed position still has a side");
            }
            if self.entry_price.is_some() || self.stop_price.is_some() {
                anyhow::bail!("closed position still has prices");
            }
            if self.stop_order_id.is_some() || !self.take_profits.is_empty() {
                anyhow::bail!("closed position still has live orders");
            }
            if self.break_even_stage != BreakEvenStage::None {
                anyhow::bail!("closed position has a break-even stage");
            }
            if self.reversal_count != 0 {
                anyhow::bail!("closed position has a nonzero reversal count");
            }
        }

        let total_fraction: Decimal = self.take_profits.iter().map(|tp| tp.volume_fraction).sum();
        if total_fraction > Decimal::ONE {
            anyhow::bail!("take-profit fractions sum to more than 1.0");
        }

        Ok(())
    }
}

impl Default for PositionState {
    fn default() -> Self {
        Self::closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn closed_state_passes_validation() {
        assert!(PositionState::closed().validate().is_ok());
    }

    #[test]
    fn open_state_requires_side_entry_and_stop() {
        let mut state = PositionState::closed();
        state.is_open = true;
        assert!(state.validate().is_err());

        state.side = Some(PositionSide::Long);
        state.entry_price = Some(dec!(100));
        assert!(state.validate().is_err());

        state.stop_price = Some(dec!(98));
        assert!(state.validate().is_ok());
    }

    #[test]
    fn closed_state_rejects_leftover_fields() {
        let mut state = PositionState::closed();
        state.side = Some(PositionSide::Short);
        assert!(state.validate().is_err());

        let mut state = PositionState::closed();
        state.reversal_count = 2;
        assert!(state.validate().is_err());
    }

    #[test]
    fn reset_clears_trading_fields_but_keeps_pause() {
        let mut state = PositionState::closed();
        state.paused = true;
        state.is_open = true;
        state.side = Some(PositionSide::Long);
        state.entry_price = Some(dec!(100));
        state.stop_price = Some(dec!(98));
        state.stop_order_id = Some("sl-1".to_string());
        state.break_even_stage = BreakEvenStage::Stage1;
        state.reversal_count = 1;

        state.reset_to_closed();

        assert!(state.validate().is_ok());
        assert!(!state.is_open);
        assert!(state.paused);
    }

    #[test]
    fn take_profit_fractions_capped_at_one() {
        let mut state = PositionState::closed();
        state.is_open = true;
        state.side = Some(PositionSide::Long);
        state.entry_price = Some(dec!(100));
        state.stop_price = Some(dec!(98));
        state.take_profits = vec![
            TakeProfitOrder {
                order_id: "tp-1".to_string(),
                target_price: dec!(101),
                volume_fraction: dec!(0.6),
            },
            TakeProfitOrder {
                order_id: "tp-2".to_string(),
                target_price: dec!(102),
                volume_fraction: dec!(0.6),
            },
        ];
        assert!(state.validate().is_err());
    }

    #[test]
    fn side_opposite() {
        assert_eq!(PositionSide::Long.opposite(), PositionSide::Short);
        assert_eq!(PositionSide::Short.opposite(), PositionSide::Long);
    }
}
