pub mod config;
pub mod config_loader;
pub mod error;
pub mod orders;
pub mod signal;
pub mod state;
pub mod traits;

pub use config::{AppConfig, ExchangeConfig, ServerConfig, SignalConfig, TakeProfitLevel, TradingConfig};
pub use config_loader::ConfigLoader;
pub use error::{GatewayError, GatewayResult};
pub use orders::{ConditionalKind, OrderFill, PositionSnapshot, TradeIntent};
pub use signal::{IndicatorSnapshot, Signal, SignalDirection};
pub use state::{BreakEvenStage, PositionSide, PositionState, TakeProfitOrder};
pub use traits::{ExchangeGateway, SignalSource};
