//! Station module
//!
//! This module runs the per-frame slot loop and owns the two collaborators it
//! feeds: the payload source for outgoing beacons and the event sink for
//! everything received.

mod engine;
mod sink;
mod source;

pub use self::engine::Station;
pub use self::sink::EventSink;
pub use self::source::{CounterSource, PayloadSource};
