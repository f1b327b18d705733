//! TDMA station: coordinator-free time division multiple access over IP multicast
//!
//! Stations sharing one multicast group each send a small beacon once per
//! one-second frame. A station picks its own slot, announces in every beacon
//! the slot it will use in the next frame, detects collisions by seeing more
//! than one beacon in a slot, and renegotiates without any central arbiter.
//! The only shared reference is the wall clock.
pub mod core;
pub mod network;
pub mod protocol;
pub mod station;
pub mod time;

// Re-export commonly used items
pub use crate::core::{Config, Error, PortMode, Result};
pub use crate::station::Station;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
