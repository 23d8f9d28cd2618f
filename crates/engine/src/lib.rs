//! Position lifecycle engine: durable state, drift reconciliation, bracket
//! maintenance and the polling control loop that ties them together.

pub mod bracket;
pub mod control_loop;
pub mod controller;
pub mod reconciler;
pub mod state_store;

pub use bracket::{round_to_tick, BracketManager};
pub use control_loop::ControlLoop;
pub use controller::{LifecycleController, TickOutcome};
pub use reconciler::Reconciler;
pub use state_store::{StateStore, StateStoreError};
