use std::fmt;

use bytes::{Buf, BufMut};

use crate::core::{CodecError, PACKET_SIZE, PAYLOAD_SIZE};

/// Beacon sent once per frame by every station holding a slot
///
/// Wire layout, 33 bytes:
///
/// ```text
///  0..24  payload, zero padded
/// 24      slot the sender reserves for its next transmission
/// 25..33  sender timestamp in milliseconds, big-endian i64
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    /// Opaque content
    pub payload: [u8; PAYLOAD_SIZE],
    /// Reservation for the next frame
    pub slot: u8,
    /// Sender-local time in milliseconds
    pub timestamp: i64,
}

impl Packet {
    /// Creates a packet, padding or truncating the payload to 24 bytes
    pub fn new(payload: &[u8], slot: u8, timestamp: i64) -> Self {
        let mut field = [0u8; PAYLOAD_SIZE];
        let len = payload.len().min(PAYLOAD_SIZE);
        field[..len].copy_from_slice(&payload[..len]);

        Packet {
            payload: field,
            slot,
            timestamp,
        }
    }

    /// Appends the 33 byte encoding to `dst`
    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_slice(&self.payload);
        dst.put_u8(self.slot);
        dst.put_i64(self.timestamp);
    }

    /// Returns the 33 byte encoding
    pub fn to_bytes(&self) -> [u8; PACKET_SIZE] {
        let mut out = [0u8; PACKET_SIZE];
        self.encode(&mut &mut out[..]);
        out
    }

    /// Decodes the first beacon in `src`
    ///
    /// Bytes past the first 33 are ignored.
    pub fn decode(mut src: &[u8]) -> Result<Self, CodecError> {
        if src.len() < PAYLOAD_SIZE {
            return Err(CodecError::ShortRead {
                received: src.len(),
            });
        }

        let mut payload = [0u8; PAYLOAD_SIZE];
        src.copy_to_slice(&mut payload);

        if !src.has_remaining() {
            return Err(CodecError::Truncated { field: "slot" });
        }
        let slot = src.get_u8();

        if src.remaining() < 8 {
            return Err(CodecError::Truncated { field: "timestamp" });
        }
        let timestamp = src.get_i64();

        Ok(Packet {
            payload,
            slot,
            timestamp,
        })
    }

    /// Payload with the zero padding stripped
    pub fn content(&self) -> &[u8] {
        let end = self
            .payload
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |i| i + 1);
        &self.payload[..end]
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet{{Payload: {}, Slot: {}, Time: {}}}",
            String::from_utf8_lossy(self.content()),
            self.slot,
            self.timestamp
        )
    }
}
