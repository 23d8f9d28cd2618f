//! Incremental EMA and RSI indicators.
//!
//! Both are streaming: feed one close at a time. The EMA is seeded with the
//! first sample; the RSI uses Wilder smoothing and yields nothing until it
//! has seen `period` deltas.

/// Exponential moving average.
#[derive(Debug, Clone)]
pub struct Ema {
    k: f64,
    value: Option<f64>,
}

impl Ema {
    #[must_use]
    pub fn new(period: usize) -> Self {
        Self {
            k: 2.0 / (period as f64 + 1.0),
            value: None,
        }
    }

    /// Feeds one price and returns the updated average.
    pub fn update(&mut self, price: f64) -> f64 {
        let next = match self.value {
            Some(prev) => price * self.k + prev * (1.0 - self.k),
            None => price,
        };
        self.value = Some(next);
        next
    }

    /// The current value, if at least one sample has been seen.
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// Relative strength index with Wilder smoothing.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    last_price: Option<f64>,
    /// Deltas collected during the seed phase.
    seed: Vec<f64>,
    /// (average gain, average loss) once seeded.
    averages: Option<(f64, f64)>,
}

impl Rsi {
    #[must_use]
    pub fn new(period: usize) -> Self {
        Self {
            period,
            last_price: None,
            seed: Vec::new(),
            averages: None,
        }
    }

    /// Feeds one price. Returns the RSI once `period + 1` prices have been
    /// seen, `None` during warmup.
    pub fn update(&mut self, price: f64) -> Option<f64> {
        let delta = match self.last_price {
            Some(last) => price - last,
            None => {
                self.last_price = Some(price);
                return None;
            }
        };
        self.last_price = Some(price);

        match self.averages {
            None => {
                self.seed.push(delta);
                if self.seed.len() < self.period {
                    return None;
                }
                let up: f64 = self.seed.iter().filter(|d| **d >= 0.0).sum::<f64>()
                    / self.period as f64;
                let down: f64 = -self.seed.iter().filter(|d| **d < 0.0).sum::<f64>()
                    / self.period as f64;
                self.seed.clear();
                self.averages = Some((up, down));
                Some(Self::from_averages(up, down))
            }
            Some((up, down)) => {
                let gain = delta.max(0.0);
                let loss = (-delta).max(0.0);
                let up = (up * (self.period as f64 - 1.0) + gain) / self.period as f64;
                let down = (down * (self.period as f64 - 1.0) + loss) / self.period as f64;
                self.averages = Some((up, down));
                Some(Self::from_averages(up, down))
            }
        }
    }

    fn from_averages(up: f64, down: f64) -> f64 {
        if down == 0.0 {
            return 100.0;
        }
        let rs = up / down;
        100.0 - 100.0 / (1.0 + rs)
    }
}
