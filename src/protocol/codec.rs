use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{CodecError, Error, PACKET_SIZE};
use super::packet::Packet;

/// Fixed-width beacon codec
///
/// Every beacon is exactly [`PACKET_SIZE`] bytes, so framing a receive window
/// is a matter of cutting it into 33 byte pieces.
#[derive(Clone, Copy, Debug, Default)]
pub struct BeaconCodec;

impl BeaconCodec {
    /// Creates a new beacon codec
    pub fn new() -> Self {
        BeaconCodec
    }
}

impl Decoder for BeaconCodec {
    type Item = Packet;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PACKET_SIZE {
            // Need a full beacon
            return Ok(None);
        }

        let packet = Packet::decode(&src[..PACKET_SIZE])?;
        src.advance(PACKET_SIZE);

        Ok(Some(packet))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(packet) => Ok(Some(packet)),
            None if src.is_empty() => Ok(None),
            None => {
                let err = Packet::decode(&src[..])
                    .err()
                    .unwrap_or(CodecError::Truncated { field: "timestamp" });
                src.clear();
                Err(err.into())
            }
        }
    }
}

impl Encoder<Packet> for BeaconCodec {
    type Error = Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(PACKET_SIZE);
        item.encode(dst);
        Ok(())
    }
}
