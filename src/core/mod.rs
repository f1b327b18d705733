//! Core types and constants for the TDMA station
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod types;

use std::net::Ipv4Addr;
use std::time::Duration;

pub use self::error::{CodecError, Error, Result};
pub use self::types::{Config, PortMode};

/// Length of one frame
pub const FRAME_TIME: Duration = Duration::from_secs(1);

/// Number of slots per frame
pub const SLOTS: u8 = 20;

/// Length of one slot
pub const SLOT_TIME: Duration = Duration::from_millis(50);

/// Fixed width of the payload field in bytes
pub const PAYLOAD_SIZE: usize = 24;

/// Serialized beacon size in bytes: payload, slot byte, 8 byte timestamp
pub const PACKET_SIZE: usize = PAYLOAD_SIZE + 1 + 8;

/// Time reserved at the end of a slot for processing after a receive
pub const READ_MARGIN: Duration = Duration::from_millis(20);

/// Smallest receive budget handed to the transceiver
pub const MIN_SLOT_BUDGET: Duration = Duration::from_millis(1);

/// Size of a single datagram read
pub const RECV_BUFFER_SIZE: usize = 1024;

/// Default multicast group
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(225, 10, 1, 2);

/// Default base port, the team number is added on top
pub const DEFAULT_BASE_PORT: u16 = 15000;

/// Default team number
pub const DEFAULT_TEAM: u32 = 17;

/// Default number of buffered event sink lines
pub const DEFAULT_SINK_CAPACITY: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_layout() {
        assert_eq!(SLOT_TIME * SLOTS as u32, FRAME_TIME);
        assert_eq!(PACKET_SIZE, 33);
        assert!(READ_MARGIN < SLOT_TIME);
    }
}
