use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub exchange: ExchangeConfig,
    pub trading: TradingConfig,
    pub signal: SignalConfig,
}

/// Operator API server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Exchange connection settings. Credentials come from the environment
/// (`APP_EXCHANGE__API_KEY` etc.), never from ambient globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub passphrase: String,
    pub symbol: String,
    pub product_type: String,
    pub margin_coin: String,
    /// Bound on every exchange request.
    pub timeout_secs: u64,
}

/// One take-profit rung: offset from entry and fraction of position size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TakeProfitLevel {
    /// Offset from entry price, e.g. 0.01 = 1%.
    pub pct_offset: Decimal,
    /// Fraction of the position this rung closes.
    pub volume_fraction: Decimal,
}

/// Position and bracket parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Order size in contracts.
    pub order_size: Decimal,
    /// Stop-loss distance from entry, e.g. 0.02 = 2%.
    pub sl_pct: Decimal,
    /// Take-profit ladder, nearest target first.
    pub tp_levels: Vec<TakeProfitLevel>,
    /// Stop offset from entry after the first ratchet (0 = exact break-even).
    pub be_offset_1: Decimal,
    /// Stop offset from entry after the second ratchet.
    pub be_offset_2: Decimal,
    /// Consecutive contrary signals before flipping. 0 disables reversals.
    pub reversal_threshold: u32,
    /// Instrument price tick; all trigger prices are rounded to it.
    pub tick_size: Decimal,
    /// Control loop cadence.
    pub poll_interval_ms: u64,
    /// Extra sleep after a rejected order before the intent is retried.
    pub reject_backoff_ms: u64,
    /// Path of the persisted position record.
    pub state_path: String,
}

/// EMA/RSI signal parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    pub rsi_buy_threshold: f64,
    pub rsi_sell_threshold: f64,
}

impl AppConfig {
    /// Validates cross-field constraints. Called once at load; a failure
    /// here is fatal.
    pub fn validate(&self) -> anyhow::Result<()> {
        let t = &self.trading;
        if t.order_size <= Decimal::ZERO {
            anyhow::bail!("trading.order_size must be positive");
        }
        if t.sl_pct <= Decimal::ZERO {
            anyhow::bail!("trading.sl_pct must be positive");
        }
        if t.tick_size <= Decimal::ZERO {
            anyhow::bail!("trading.tick_size must be positive");
        }
        if t.tp_levels.is_empty() {
            anyhow::bail!("trading.tp_levels must contain at least one level");
        }

        let mut total_fraction = Decimal::ZERO;
        let mut prev_offset = Decimal::ZERO;
        for (i, level) in t.tp_levels.iter().enumerate() {
            if level.pct_offset <= prev_offset {
                anyhow::bail!("trading.tp_levels[{i}].pct_offset must be strictly increasing");
            }
            if level.volume_fraction <= Decimal::ZERO {
                anyhow::bail!("trading.tp_levels[{i}].volume_fraction must be positive");
            }
            prev_offset = level.pct_offset;
            total_fraction += level.volume_fraction;
        }
        if total_fraction > Decimal::ONE {
            anyhow::bail!("trading.tp_levels volume fractions must sum to at most 1.0");
        }

        if t.be_offset_1 < Decimal::ZERO || t.be_offset_2 < t.be_offset_1 {
            anyhow::bail!("break-even offsets must satisfy 0 <= be_offset_1 <= be_offset_2");
        }
        if t.poll_interval_ms == 0 {
            anyhow::bail!("trading.poll_interval_ms must be positive");
        }

        let s = &self.signal;
        if s.ema_fast == 0 || s.ema_slow <= s.ema_fast {
            anyhow::bail!("signal EMA periods must satisfy 0 < ema_fast < ema_slow");
        }
        if s.rsi_period == 0 {
            anyhow::bail!("signal.rsi_period must be positive");
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            exchange: ExchangeConfig {
                api_url: "https://api.bitget.com".to_string(),
                api_key: String::new(),
                api_secret: String::new(),
                passphrase: String::new(),
                symbol: "BTCUSDT".to_string(),
                product_type: "USDT-FUTURES".to_string(),
                margin_coin: "USDT".to_string(),
                timeout_secs: 5,
            },
            trading: TradingConfig {
                order_size: Decimal::ONE,
                sl_pct: Decimal::new(2, 2),  // 0.02
                tp_levels: vec![
                    TakeProfitLevel {
                        pct_offset: Decimal::new(1, 2),      // 0.01
                        volume_fraction: Decimal::new(5, 1), // 0.5
                    },
                    TakeProfitLevel {
                        pct_offset: Decimal::new(2, 2),      // 0.02
                        volume_fraction: Decimal::new(3, 1), // 0.3
                    },
                    TakeProfitLevel {
                        pct_offset: Decimal::new(3, 2),      // 0.03
                        volume_fraction: Decimal::new(2, 1), // 0.2
                    },
                ],
                be_offset_1: Decimal::new(1, 3), // 0.001
                be_offset_2: Decimal::new(1, 2), // 0.01
                reversal_threshold: 0,
                tick_size: Decimal::new(1, 1), // 0.1
                poll_interval_ms: 500,
                reject_backoff_ms: 2000,
                state_path: "data/state.json".to_string(),
            },
            signal: SignalConfig {
                ema_fast: 9,
                ema_slow: 21,
                rsi_period: 14,
                rsi_buy_threshold: 70.0,
                rsi_sell_threshold: 30.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_oversubscribed_ladder() {
        let mut config = AppConfig::default();
        config.trading.tp_levels = vec![
            TakeProfitLevel {
                pct_offset: dec!(0.01),
                volume_fraction: dec!(0.7),
            },
            TakeProfitLevel {
                pct_offset: dec!(0.02),
                volume_fraction: dec!(0.5),
            },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_increasing_offsets() {
        let mut config = AppConfig::default();
        config.trading.tp_levels = vec![
            TakeProfitLevel {
                pct_offset: dec!(0.02),
                volume_fraction: dec!(0.3),
            },
            TakeProfitLevel {
                pct_offset: dec!(0.01),
                volume_fraction: dec!(0.3),
            },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_break_even_offsets() {
        let mut config = AppConfig::default();
        config.trading.be_offset_1 = dec!(0.02);
        config.trading.be_offset_2 = dec!(0.01);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_ema_periods() {
        let mut config = AppConfig::default();
        config.signal.ema_fast = 21;
        config.signal.ema_slow = 9;
        assert!(config.validate().is_err());
    }
}
