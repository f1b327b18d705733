//! Protocol implementation module
//!
//! This module defines the beacon wire format, its codec, and the slot
//! allocation state machine that decides when a station transmits.

pub mod codec;
pub mod packet;
pub mod state;

pub use self::codec::BeaconCodec;
pub use self::packet::Packet;
pub use self::state::{SlotAction, SlotAllocator, SlotOccupancy, SlotReport, StationState};
