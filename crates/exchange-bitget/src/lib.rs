//! Bitget USDT-futures integration.
//!
//! Implements [`perp_scalper_core::ExchangeGateway`] over the Bitget v2 mix
//! API: HMAC-signed REST calls, market/conditional order placement, plan
//! order cancellation, and position/ticker queries.

pub mod client;
pub mod gateway;
pub mod signing;

pub use client::BitgetClient;
pub use gateway::BitgetGateway;
