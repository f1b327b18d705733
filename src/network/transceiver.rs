use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{CodecError, Error, Result, PACKET_SIZE, RECV_BUFFER_SIZE};
use crate::protocol::{BeaconCodec, Packet};
use crate::time::{util::unix_millis, Clock};
use super::MulticastChannel;

/// What one slot's receive window contained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Nothing arrived
    Empty,
    /// Exactly one beacon
    Packet(Packet),
    /// More than one beacon's worth of bytes; `first` is decoded from the
    /// first 33 bytes
    Collision {
        /// First beacon in the window
        first: Packet,
        /// Total bytes received in the window
        bytes: usize,
    },
    /// Less than one beacon arrived
    Malformed(CodecError),
}

impl ReceiveOutcome {
    /// Decoded beacon, if any
    pub fn packet(&self) -> Option<&Packet> {
        match self {
            ReceiveOutcome::Packet(packet) => Some(packet),
            ReceiveOutcome::Collision { first, .. } => Some(first),
            _ => None,
        }
    }

    /// Number of whole beacons in the window
    pub fn beacons(&self) -> usize {
        match self {
            ReceiveOutcome::Packet(_) => 1,
            ReceiveOutcome::Collision { bytes, .. } => (bytes / PACKET_SIZE).max(2),
            _ => 0,
        }
    }
}

/// Classifies everything read during one receive window
///
/// All beacons have the same width, so a window holding more than one
/// beacon's worth of bytes means several stations sent in the same slot.
pub fn classify(mut window: BytesMut) -> ReceiveOutcome {
    let total = window.len();
    if total == 0 {
        return ReceiveOutcome::Empty;
    }

    let mut codec = BeaconCodec::new();
    match codec.decode_eof(&mut window) {
        Ok(Some(first)) if total > PACKET_SIZE => ReceiveOutcome::Collision {
            first,
            bytes: total,
        },
        Ok(Some(packet)) => ReceiveOutcome::Packet(packet),
        Ok(None) => ReceiveOutcome::Empty,
        Err(Error::Codec(err)) => ReceiveOutcome::Malformed(err),
        Err(_) => ReceiveOutcome::Malformed(CodecError::ShortRead { received: total }),
    }
}

/// Sends and receives beacons, one slot at a time
pub struct Transceiver<C, K> {
    channel: Arc<C>,
    clock: K,
}

impl<C, K: Clone> Clone for Transceiver<C, K> {
    fn clone(&self) -> Self {
        Transceiver {
            channel: Arc::clone(&self.channel),
            clock: self.clock.clone(),
        }
    }
}

impl<C: MulticastChannel, K: Clock> Transceiver<C, K> {
    /// Creates a transceiver over `channel`
    pub fn new(channel: C, clock: K) -> Self {
        Transceiver {
            channel: Arc::new(channel),
            clock,
        }
    }

    /// Underlying channel
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Clock used for timestamps and deadlines
    pub fn clock(&self) -> &K {
        &self.clock
    }

    /// Encodes and sends one beacon reserving `reservation`
    pub async fn send(&self, payload: &[u8], reservation: u8) -> Result<()> {
        let packet = Packet::new(payload, reservation, unix_millis(self.clock.now()));

        let mut buf = BytesMut::with_capacity(PACKET_SIZE);
        BeaconCodec::new().encode(packet, &mut buf)?;

        self.channel.send(&buf).await.map_err(Error::transport)?;
        Ok(())
    }

    /// Waits for `at`, then sends the beacon
    pub async fn send_at(&self, at: Duration, payload: &[u8], reservation: u8) -> Result<()> {
        self.clock.sleep_until(at).await;
        self.send(payload, reservation).await
    }

    /// Reads everything arriving within `budget` and classifies it
    ///
    /// A timeout is the normal end of the window. Any other failure is
    /// returned as a transport error.
    pub async fn receive(&self, budget: Duration) -> Result<ReceiveOutcome> {
        let deadline = self.clock.now() + budget;
        let mut window = BytesMut::with_capacity(RECV_BUFFER_SIZE);
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            let remaining = deadline.saturating_sub(self.clock.now());
            if remaining.is_zero() {
                break;
            }

            match self.channel.recv_timeout(&mut buf, remaining).await {
                Ok(Some(len)) => window.extend_from_slice(&buf[..len]),
                Ok(None) => break,
                Err(e) => return Err(Error::transport(e)),
            }
        }

        Ok(classify(window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Scripted, ScriptedChannel};
    use crate::time::ManualClock;
    use std::io;
    use tokio_test::assert_ok;

    fn window(packets: &[Packet]) -> BytesMut {
        let mut buf = BytesMut::new();
        for packet in packets {
            packet.encode(&mut buf);
        }
        buf
    }

    #[test]
    fn test_classify_empty() {
        assert_eq!(classify(BytesMut::new()), ReceiveOutcome::Empty);
    }

    #[test]
    fn test_classify_single() {
        let packet = Packet::new(b"one", 4, 100);
        assert_eq!(classify(window(&[packet])), ReceiveOutcome::Packet(packet));
    }

    #[test]
    fn test_classify_coalesced_multiples() {
        let packets: Vec<Packet> = (0..5).map(|i| Packet::new(b"x", i, i as i64)).collect();

        for count in 2..=packets.len() {
            let outcome = classify(window(&packets[..count]));
            assert_eq!(
                outcome,
                ReceiveOutcome::Collision {
                    first: packets[0],
                    bytes: count * PACKET_SIZE,
                }
            );
            assert_eq!(outcome.beacons(), count);
        }
    }

    #[test]
    fn test_classify_odd_sized_window() {
        let mut buf = window(&[Packet::new(b"a", 1, 1)]);
        buf.extend_from_slice(&[0u8; 10]);

        let outcome = classify(buf);
        assert!(matches!(outcome, ReceiveOutcome::Collision { bytes: 43, .. }));
        assert_eq!(outcome.packet().unwrap().slot, 1);
    }

    #[test]
    fn test_classify_short() {
        let outcome = classify(BytesMut::from(&[1u8; 10][..]));
        assert_eq!(outcome, ReceiveOutcome::Malformed(CodecError::ShortRead { received: 10 }));

        let bytes = Packet::new(b"a", 1, 1).to_bytes();
        let outcome = classify(BytesMut::from(&bytes[..28]));
        assert_eq!(
            outcome,
            ReceiveOutcome::Malformed(CodecError::Truncated { field: "timestamp" })
        );
        assert!(outcome.packet().is_none());
    }

    #[tokio::test]
    async fn test_receive_accumulates_window() {
        let a = Packet::new(b"a", 3, 1);
        let b = Packet::new(b"b", 7, 2);
        let channel = ScriptedChannel::new([
            Scripted::Datagram(a.to_bytes().to_vec()),
            Scripted::Datagram(b.to_bytes().to_vec()),
            Scripted::Timeout,
            Scripted::Datagram(b.to_bytes().to_vec()),
        ]);
        let transceiver = Transceiver::new(channel, ManualClock::starting_at(Duration::from_secs(1)));

        let outcome = assert_ok!(transceiver.receive(Duration::from_millis(30)).await);
        assert_eq!(
            outcome,
            ReceiveOutcome::Collision {
                first: a,
                bytes: 2 * PACKET_SIZE,
            }
        );

        // The next window starts with whatever arrives after the timeout
        let outcome = assert_ok!(transceiver.receive(Duration::from_millis(30)).await);
        assert_eq!(outcome, ReceiveOutcome::Packet(b));
    }

    #[tokio::test]
    async fn test_receive_timeout_is_empty() {
        let transceiver = Transceiver::new(
            ScriptedChannel::new([Scripted::Timeout]),
            ManualClock::starting_at(Duration::from_secs(1)),
        );
        let outcome = assert_ok!(transceiver.receive(Duration::from_millis(30)).await);
        assert_eq!(outcome, ReceiveOutcome::Empty);
    }

    #[tokio::test]
    async fn test_receive_surfaces_transport_errors() {
        let a = Packet::new(b"a", 3, 1);
        let transceiver = Transceiver::new(
            ScriptedChannel::new([
                Scripted::Datagram(a.to_bytes().to_vec()),
                Scripted::Fail(io::ErrorKind::ConnectionReset),
            ]),
            ManualClock::starting_at(Duration::from_secs(1)),
        );

        let err = transceiver.receive(Duration::from_millis(30)).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_receive_respects_spent_budget() {
        let clock = ManualClock::starting_at(Duration::from_secs(1));
        let transceiver = Transceiver::new(
            ScriptedChannel::new([Scripted::Datagram(vec![1, 2, 3])]),
            clock,
        );

        let outcome = assert_ok!(transceiver.receive(Duration::ZERO).await);
        assert_eq!(outcome, ReceiveOutcome::Empty);
        assert_eq!(transceiver.channel().remaining(), 1);
    }

    #[tokio::test]
    async fn test_send_at_slot_center() {
        let clock = ManualClock::starting_at(Duration::from_millis(9_000));
        let transceiver = Transceiver::new(ScriptedChannel::default(), clock.clone());

        assert_ok!(
            transceiver
                .send_at(Duration::from_millis(9_125), b"payload", 14)
                .await
        );

        let sent = transceiver.channel().sent();
        assert_eq!(sent.len(), 1);
        let packet = Packet::decode(&sent[0]).unwrap();
        assert_eq!(packet.slot, 14);
        assert_eq!(packet.timestamp, 9_125);
        assert_eq!(packet.content(), b"payload");
    }
}
