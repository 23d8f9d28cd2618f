pub mod generator;
pub mod indicators;

pub use generator::EmaRsiSignal;
pub use indicators::{Ema, Rsi};
