//! Port traits the engine depends on.
//!
//! The engine only talks to the outside world through these traits; concrete
//! implementations live in [`crate::adapters`].

pub mod broker_port;
pub mod config_port;
pub mod market_port;
