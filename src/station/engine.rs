use std::future::Future;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::{Config, Result, SLOTS};
use crate::network::{MulticastChannel, MulticastSocket, ReceiveOutcome, Transceiver};
use crate::protocol::{SlotAction, SlotAllocator, SlotReport};
use crate::time::{util, Clock, FrameClock, SlotPoint};
use super::sink::EventSink;
use super::source::PayloadSource;

/// One TDMA station
///
/// The station's frame loop is the only owner of the allocation state; the
/// only concurrency is the beacon send, which runs as its own task so that
/// waiting for the slot center never eats into the receive window.
pub struct Station<C, K, S, W> {
    /// Immutable configuration
    config: Config,
    /// Frame and slot waits
    frames: FrameClock<K>,
    /// Beacon send and receive
    transceiver: Transceiver<C, K>,
    /// Slot allocation state machine
    allocator: SlotAllocator<StdRng>,
    /// Beacon content
    source: S,
    /// Event log
    sink: EventSink<W>,
    /// Content of the next beacon
    pending: Vec<u8>,
    /// Receives that failed in a row
    transport_errors: u32,
    /// Send task of the current slot
    in_flight: Option<JoinHandle<()>>,
}

impl<C, K, S, W> Station<C, K, S, W>
where
    C: MulticastChannel,
    K: Clock,
    S: PayloadSource,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Creates a station; slot selection is seeded from the configuration
    pub fn new(config: Config, channel: C, clock: K, mut source: S, sink: EventSink<W>) -> Self {
        let allocator = SlotAllocator::new(StdRng::seed_from_u64(config.rng_seed()));
        let pending = source.next_payload();

        Station {
            config,
            frames: FrameClock::new(clock.clone()),
            transceiver: Transceiver::new(channel, clock),
            allocator,
            source,
            sink,
            pending,
            transport_errors: 0,
            in_flight: None,
        }
    }

    /// Replaces the allocator, e.g. to start with a known slot
    pub fn with_allocator(mut self, allocator: SlotAllocator<StdRng>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Allocation state machine
    pub fn allocator(&self) -> &SlotAllocator<StdRng> {
        &self.allocator
    }

    /// Underlying channel
    pub fn channel(&self) -> &C {
        self.transceiver.channel()
    }

    /// Payload source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Event sink
    pub fn into_sink(self) -> EventSink<W> {
        self.sink
    }

    /// Runs frames until a fatal error or until `shutdown` completes
    ///
    /// Either way the event sink is drained before returning. A loop error
    /// wins over a sink error.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let station = self.config.station;

        let result = tokio::select! {
            result = self.run_frames() => result,
            _ = &mut shutdown => {
                info!(station, "shutdown requested");
                Ok(())
            }
        };

        if let Some(task) = self.in_flight.take() {
            task.abort();
        }

        let drained = self.sink.stop().await;
        if self.sink.dropped() > 0 {
            warn!(dropped = self.sink.dropped(), "event sink lost lines");
        }

        result.and(drained)
    }

    async fn run_frames(&mut self) -> Result<()> {
        let mut frame_start = self.frames.next_frame_boundary().await;
        debug!(boundary_ms = util::unix_millis(frame_start), "synchronized with frame");

        loop {
            self.run_frame(frame_start).await?;

            frame_start = match self.frames.following_frame(frame_start) {
                Some(next) => next,
                None => {
                    let boundary = self.frames.next_frame_boundary().await;
                    warn!(
                        previous_ms = util::unix_millis(frame_start),
                        boundary_ms = util::unix_millis(boundary),
                        "clock left the frame schedule, resynchronized"
                    );
                    boundary
                }
            };
        }
    }

    /// Runs one full frame starting at `frame_start`
    ///
    /// Waits for the boundary first if the clock has not reached it yet.
    pub async fn run_frame(&mut self, frame_start: Duration) -> Result<()> {
        self.frames.wait_slot(frame_start, 0, SlotPoint::Start).await;

        let slot = self.allocator.begin_frame();
        debug!(
            frame = self.allocator.frame(),
            slot,
            searching = self.allocator.state().searching,
            "frame begins"
        );

        for index in 0..SLOTS {
            self.run_slot(frame_start, index).await?;
        }

        self.allocator.end_frame();
        Ok(())
    }

    async fn run_slot(&mut self, frame_start: Duration, index: u8) -> Result<()> {
        match self.allocator.plan_slot(index) {
            SlotAction::Transmit { reservation } => self.dispatch_send(frame_start, index, reservation),
            SlotAction::Withhold => warn!(slot = index, "no free slot to reserve, not sending"),
            SlotAction::Listen => {}
        }

        let budget = self.frames.remaining_budget(frame_start, index);
        match self.transceiver.receive(budget).await {
            Ok(outcome) => {
                self.transport_errors = 0;
                self.absorb(index, &outcome);
            }
            Err(e) if self.transport_errors < self.config.max_consecutive_transport_errors => {
                self.transport_errors += 1;
                warn!(
                    slot = index,
                    failures = self.transport_errors,
                    error = %e,
                    "receive failed, skipping slot"
                );
            }
            Err(e) => {
                error!(slot = index, error = %e, "receive failed, stopping station");
                return Err(e);
            }
        }

        self.frames.wait_slot(frame_start, index, SlotPoint::End).await;
        Ok(())
    }

    fn dispatch_send(&mut self, frame_start: Duration, index: u8, reservation: u8) {
        let center = util::slot_deadline(frame_start, index, SlotPoint::Center);
        let transceiver = self.transceiver.clone();
        let payload = self.pending.clone();

        debug!(slot = index, reservation, "sending beacon");
        self.in_flight = Some(tokio::spawn(async move {
            if let Err(e) = transceiver.send_at(center, &payload, reservation).await {
                warn!(slot = index, error = %e, "beacon send failed");
            }
        }));
    }

    fn absorb(&mut self, index: u8, outcome: &ReceiveOutcome) {
        let report = self.allocator.observe(index, outcome);
        self.log_report(index, outcome, &report);

        if let Some(packet) = outcome.packet() {
            let now = util::unix_millis(self.transceiver.clock().now());
            self.sink
                .feed(format!("{}: Received on slot {}: {}", now, index, packet));
        }

        if report.confirmed {
            self.pending = self.source.next_payload();
        }
    }

    fn log_report(&self, index: u8, outcome: &ReceiveOutcome, report: &SlotReport) {
        if let ReceiveOutcome::Malformed(err) = outcome {
            warn!(slot = index, error = %err, "malformed datagram ignored");
        }
        if report.collision {
            warn!(
                slot = index,
                beacons = outcome.beacons(),
                "collision on own slot, renegotiating"
            );
        }
        if let Some(reservation) = report.ignored {
            warn!(slot = index, reservation, "reservation out of range ignored");
        }
        if let Some(adopted) = report.adopted {
            info!(frame = self.allocator.frame(), slot = adopted, "adopted free slot");
        }
        if report.confirmed {
            debug!(slot = index, "own beacon confirmed");
        }
    }
}

impl<K: Clock, S, W> Station<MulticastSocket, K, S, W> {
    /// Leaves the multicast group
    pub fn close(self) -> Result<()> {
        if let Some(task) = &self.in_flight {
            task.abort();
        }
        self.transceiver.channel().leave()
    }
}
