use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::SLOTS;
use crate::network::ReceiveOutcome;

/// Frame number at which each slot was last seen occupied
///
/// An entry of 0 means the slot was never seen in use. A sighting counts for
/// the frame it happened in and the one after; from the second frame on the
/// slot is free again.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SlotOccupancy {
    last_seen: [u64; SLOTS as usize],
}

impl SlotOccupancy {
    /// Creates an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame of the last sighting in `slot`, 0 if none
    pub fn last_seen(&self, slot: u8) -> u64 {
        self.last_seen[slot as usize]
    }

    /// Whether `slot` may be reserved during `frame`
    pub fn is_free(&self, slot: u8, frame: u64) -> bool {
        let seen = self.last_seen(slot);
        seen == 0 || frame.saturating_sub(seen) > 1
    }

    /// Records a sighting of `slot` during `frame`
    pub fn mark(&mut self, slot: u8, frame: u64) {
        self.last_seen[slot as usize] = frame;
    }

    /// Forgets a sighting that has aged out, returns whether one was cleared
    pub fn release_stale(&mut self, slot: u8, frame: u64) -> bool {
        let seen = &mut self.last_seen[slot as usize];
        if *seen != 0 && *seen + 1 < frame {
            *seen = 0;
            true
        } else {
            false
        }
    }

    /// All slots free during `frame`, in index order
    pub fn free_slots(&self, frame: u64) -> Vec<u8> {
        (0..SLOTS).filter(|&slot| self.is_free(slot, frame)).collect()
    }

    /// Picks one free slot uniformly at random
    ///
    /// Stations that collided renegotiate at the same moment; drawing at random
    /// instead of taking the lowest index keeps them from meeting again.
    pub fn find_free_slot<R: Rng + ?Sized>(&self, frame: u64, rng: &mut R) -> Option<u8> {
        self.free_slots(frame).choose(rng).copied()
    }
}

/// State of the local station
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationState {
    /// Slot this station transmits in during the current frame
    pub assigned_slot: u8,
    /// Reservation announced for the next frame
    pub next_slot: u8,
    /// No valid slot is held
    pub searching: bool,
    /// Current frame number, starting at 1
    pub frame: u64,
}

/// What the station does in a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAction {
    /// Send a beacon carrying `reservation` at the slot center
    Transmit {
        /// Slot announced for the next frame
        reservation: u8,
    },
    /// Own slot, but nothing is free to reserve; stay silent and search
    Withhold,
    /// Not our slot
    Listen,
}

/// What a receive outcome did to the allocation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotReport {
    /// Our own beacon collided, the reservation is abandoned
    pub collision: bool,
    /// A stale sighting of this slot was cleared
    pub released: bool,
    /// Reservation recorded from a received beacon
    pub sighted: Option<u8>,
    /// Out of range reservation that was ignored
    pub ignored: Option<u8>,
    /// Our beacon came back intact
    pub confirmed: bool,
    /// Slot adopted by the end of frame search
    pub adopted: Option<u8>,
}

/// Slot allocation and collision avoidance state machine
///
/// Drive it once per frame with [`begin_frame`](Self::begin_frame), then for
/// every slot call [`plan_slot`](Self::plan_slot) followed by
/// [`observe`](Self::observe), and finish with [`end_frame`](Self::end_frame).
/// It does no I/O and never blocks.
#[derive(Debug)]
pub struct SlotAllocator<R> {
    occupancy: SlotOccupancy,
    state: StationState,
    rng: R,
    packet_sent: bool,
}

impl<R: Rng> SlotAllocator<R> {
    /// Creates an allocator without a slot
    pub fn new(rng: R) -> Self {
        SlotAllocator {
            occupancy: SlotOccupancy::new(),
            state: StationState {
                assigned_slot: 0,
                next_slot: 0,
                searching: true,
                frame: 1,
            },
            rng,
            packet_sent: false,
        }
    }

    /// Creates an allocator that already holds `slot`
    pub fn with_slot(rng: R, slot: u8) -> Self {
        let mut allocator = Self::new(rng);
        let slot = slot % SLOTS;
        allocator.state.assigned_slot = slot;
        allocator.state.next_slot = slot;
        allocator.state.searching = false;
        allocator
    }

    /// Current station state
    pub fn state(&self) -> &StationState {
        &self.state
    }

    /// Occupancy table
    pub fn occupancy(&self) -> &SlotOccupancy {
        &self.occupancy
    }

    /// Current frame number
    pub fn frame(&self) -> u64 {
        self.state.frame
    }

    /// Starts a frame, moving to the slot reserved in the previous one
    pub fn begin_frame(&mut self) -> u8 {
        self.state.assigned_slot = self.state.next_slot;
        self.packet_sent = false;
        self.state.assigned_slot
    }

    /// Decides whether to transmit in `slot`
    pub fn plan_slot(&mut self, slot: u8) -> SlotAction {
        self.packet_sent = false;

        if slot != self.state.assigned_slot || self.state.searching {
            return SlotAction::Listen;
        }

        match self.occupancy.find_free_slot(self.state.frame, &mut self.rng) {
            Some(reservation) => {
                self.state.next_slot = reservation;
                self.packet_sent = true;
                SlotAction::Transmit { reservation }
            }
            None => {
                self.state.searching = true;
                SlotAction::Withhold
            }
        }
    }

    /// Folds the receive outcome of `slot` into the table
    pub fn observe(&mut self, slot: u8, outcome: &ReceiveOutcome) -> SlotReport {
        let frame = self.state.frame;
        let mut report = SlotReport::default();
        let collided = matches!(outcome, ReceiveOutcome::Collision { .. });

        if collided && self.packet_sent {
            self.occupancy.mark(slot, frame);
            self.state.searching = true;
            report.collision = true;
        }

        if matches!(outcome, ReceiveOutcome::Empty) {
            report.released = self.occupancy.release_stale(slot, frame);
        }

        if let Some(packet) = outcome.packet() {
            if self.packet_sent && slot == self.state.assigned_slot && !collided {
                self.packet_sent = false;
                report.confirmed = true;
            }

            if packet.slot < SLOTS {
                self.occupancy.mark(packet.slot, frame);
                report.sighted = Some(packet.slot);
            } else {
                report.ignored = Some(packet.slot);
            }
        }

        if slot == SLOTS - 1 && self.state.searching {
            if let Some(found) = self.occupancy.find_free_slot(frame, &mut self.rng) {
                self.state.assigned_slot = found;
                self.state.next_slot = found;
                self.state.searching = false;
                report.adopted = Some(found);
            }
        }

        report
    }

    /// Closes the frame
    pub fn end_frame(&mut self) {
        self.state.frame += 1;
    }
}
