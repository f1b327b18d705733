//! Frame and slot timing
//!
//! Time is cut into frames of one second that start on whole-second
//! wall-clock boundaries. Each frame holds 20 slots of 50 ms:
//!
//! ```text
//! |<----------------------------- frame (1 s) ----------------------------->|
//! | slot 0 | slot 1 | slot 2 |   ...                              | slot 19 |
//!     ^        ^
//!     |        beacon sent at the slot center
//!     receive window: slot start until slot end minus the read margin
//! ```
//!
//! There is no handshake between stations. Frame alignment across the group
//! holds only while the stations' clocks agree to well within one slot.
//!
//! The pure arithmetic lives in [`util`]; [`FrameClock`] adds the blocking
//! waits on top of a [`Clock`].

mod clock;

use std::time::Duration;

use crate::core::SLOT_TIME;

pub use self::clock::{Clock, SystemClock};
#[cfg(test)]
pub(crate) use self::clock::ManualClock;

/// Instant inside a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPoint {
    /// Slot begins
    Start,
    /// Beacons are sent here
    Center,
    /// Slot ends
    End,
}

impl SlotPoint {
    /// Offset from the start of the slot
    pub fn offset(self) -> Duration {
        match self {
            SlotPoint::Start => Duration::ZERO,
            SlotPoint::Center => SLOT_TIME / 2,
            SlotPoint::End => SLOT_TIME,
        }
    }
}

/// Utility functions for frame and slot arithmetic
pub mod util {
    use std::time::Duration;

    use super::SlotPoint;
    use crate::core::{FRAME_TIME, MIN_SLOT_BUDGET, READ_MARGIN, SLOTS, SLOT_TIME};

    /// Most recent frame boundary at or before `now`
    pub fn frame_start(now: Duration) -> Duration {
        let period = FRAME_TIME.as_nanos();
        let nanos = now.as_nanos();
        Duration::from_nanos((nanos - nanos % period) as u64)
    }

    /// First frame boundary strictly after `now`
    pub fn next_frame_boundary(now: Duration) -> Duration {
        frame_start(now) + FRAME_TIME
    }

    /// Absolute time of `point` within `slot`
    pub fn slot_deadline(frame_start: Duration, slot: u8, point: SlotPoint) -> Duration {
        frame_start + SLOT_TIME * u32::from(slot) + point.offset()
    }

    /// Receive budget left in `slot` at `now`
    ///
    /// Time until the slot ends minus the read margin, but never less than
    /// [`MIN_SLOT_BUDGET`].
    pub fn remaining_slot_budget(frame_start: Duration, slot: u8, now: Duration) -> Duration {
        slot_deadline(frame_start, slot, SlotPoint::End)
            .saturating_sub(now)
            .saturating_sub(READ_MARGIN)
            .max(MIN_SLOT_BUDGET)
    }

    /// Start of the frame after `previous`, if `now` still fits the schedule
    ///
    /// Waking a little early is fine, the caller waits for the boundary.
    /// `None` when `now` is already past slot 0 of that frame, or the clock
    /// stepped back by more than a frame.
    pub fn following_frame(previous: Duration, now: Duration) -> Option<Duration> {
        let next = previous + FRAME_TIME;
        match slot_index_at(next, now) {
            Some(0) => Some(next),
            None if now < next && next - now < FRAME_TIME => Some(next),
            _ => None,
        }
    }

    /// Slot containing `now`, if `now` lies inside the frame
    pub fn slot_index_at(frame_start: Duration, now: Duration) -> Option<u8> {
        let elapsed = now.checked_sub(frame_start)?;
        let index = elapsed.as_nanos() / SLOT_TIME.as_nanos();
        u8::try_from(index).ok().filter(|&slot| slot < SLOTS)
    }

    /// Milliseconds since the epoch, as carried in beacons
    pub fn unix_millis(now: Duration) -> i64 {
        i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Blocking frame and slot waits on top of a [`Clock`]
#[derive(Debug, Clone)]
pub struct FrameClock<K> {
    clock: K,
}

impl<K: Clock> FrameClock<K> {
    /// Creates a frame clock
    pub fn new(clock: K) -> Self {
        FrameClock { clock }
    }

    /// Waits for the next frame boundary and returns it
    pub async fn next_frame_boundary(&self) -> Duration {
        let boundary = util::next_frame_boundary(self.clock.now());
        self.clock.sleep_until(boundary).await;
        boundary
    }

    /// Start of the frame after `previous`, `None` if the clock left it behind
    pub fn following_frame(&self, previous: Duration) -> Option<Duration> {
        util::following_frame(previous, self.clock.now())
    }

    /// Waits until `point` of `slot`
    pub async fn wait_slot(&self, frame_start: Duration, slot: u8, point: SlotPoint) {
        self.clock
            .sleep_until(util::slot_deadline(frame_start, slot, point))
            .await;
    }

    /// Receive budget left in `slot` right now
    pub fn remaining_budget(&self, frame_start: Duration, slot: u8) -> Duration {
        util::remaining_slot_budget(frame_start, slot, self.clock.now())
    }
}
