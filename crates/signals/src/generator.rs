//! EMA-crossover signal source with an RSI filter.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use perp_scalper_core::{
    IndicatorSnapshot, Signal, SignalConfig, SignalDirection, SignalSource,
};

use crate::indicators::{Ema, Rsi};

/// Emits `Buy` when the fast EMA crosses above the slow EMA while the RSI is
/// below the buy threshold, `Sell` on the opposite cross while the RSI is
/// above the sell threshold, and nothing otherwise. Crossovers are
/// edge-triggered: the same trend never re-fires on later ticks.
pub struct EmaRsiSignal {
    config: SignalConfig,
    fast: Ema,
    slow: Ema,
    rsi: Rsi,
    prev_fast: Option<f64>,
    prev_slow: Option<f64>,
    samples: usize,
}

impl EmaRsiSignal {
    #[must_use]
    pub fn new(config: SignalConfig) -> Self {
        Self {
            fast: Ema::new(config.ema_fast),
            slow: Ema::new(config.ema_slow),
            rsi: Rsi::new(config.rsi_period),
            prev_fast: None,
            prev_slow: None,
            samples: 0,
            config,
        }
    }

    /// True once enough samples have been seen for the slow EMA to be
    /// meaningful.
    fn warmed_up(&self) -> bool {
        self.samples > self.config.ema_slow
    }
}

#[async_trait]
impl SignalSource for EmaRsiSignal {
    async fn next_signal(&mut self, price: Decimal) -> Result<Signal> {
        let price = price
            .to_f64()
            .context("price not representable as f64")?;

        let fast = self.fast.update(price);
        let slow = self.slow.update(price);
        let rsi = self.rsi.update(price);
        self.samples += 1;

        let snapshot = IndicatorSnapshot {
            ema_fast: fast,
            ema_slow: slow,
            rsi: rsi.unwrap_or(f64::NAN),
        };

        let (prev_fast, prev_slow) = (self.prev_fast, self.prev_slow);
        self.prev_fast = Some(fast);
        self.prev_slow = Some(slow);

        let (Some(prev_fast), Some(prev_slow), Some(rsi)) = (prev_fast, prev_slow, rsi) else {
            return Ok(Signal {
                direction: None,
                snapshot,
            });
        };
        if !self.warmed_up() {
            return Ok(Signal {
                direction: None,
                snapshot,
            });
        }

        let direction = if prev_fast <= prev_slow
            && fast > slow
            && rsi < self.config.rsi_buy_threshold
        {
            Some(SignalDirection::Buy)
        } else if prev_fast >= prev_slow && fast < slow && rsi > self.config.rsi_sell_threshold {
            Some(SignalDirection::Sell)
        } else {
            None
        };

        if let Some(direction) = direction {
            tracing::debug!(
                ?direction,
                ema_fast = fast,
                ema_slow = slow,
                rsi,
                "Signal crossover"
            );
        }

        Ok(Signal { direction, snapshot })
    }
}
