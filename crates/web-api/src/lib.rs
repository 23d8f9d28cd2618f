//! Operator REST surface: position record reads and the pause switch.

pub mod handlers;
pub mod server;

pub use server::ApiServer;
