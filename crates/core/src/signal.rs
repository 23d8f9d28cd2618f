//! Signal types produced by a [`crate::SignalSource`].

use serde::{Deserialize, Serialize};

use crate::state::PositionSide;

/// Directional recommendation from the signal source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalDirection {
    Buy,
    Sell,
}

impl SignalDirection {
    /// The position side this signal opens.
    #[must_use]
    pub const fn side(self) -> PositionSide {
        match self {
            Self::Buy => PositionSide::Long,
            Self::Sell => PositionSide::Short,
        }
    }

    /// True if this signal points against an open position on `side`.
    #[must_use]
    pub fn opposes(self, side: PositionSide) -> bool {
        self.side() == side.opposite()
    }
}

/// Indicator values at the moment the signal was sampled. Carried for
/// logging and the operator surface; never used for trading decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub rsi: f64,
}

/// One signal sample. `direction` is `None` when no crossover fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Option<SignalDirection>,
    pub snapshot: IndicatorSnapshot,
}
