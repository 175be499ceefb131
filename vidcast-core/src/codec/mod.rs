//! Length-prefixed envelope codec.
//!
//! ```text
//! length:   u64 big-endian (8)
//! payload:  [u8] (length bytes)
//! ```
//!
//! There is no handshake, magic or version field: a connection is a bare
//! sequence of envelopes starting with the first byte after connect.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::VidcastError;

/// Size of the length prefix on the wire.
pub const LENGTH_PREFIX_SIZE: usize = 8;

/// `tokio_util` codec for the vidcast envelope.
///
/// The decoder remembers a parsed header across calls, so a payload that
/// arrives in many small reads is only length-checked once.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeCodec {
    /// Optional upper bound on accepted payload length.
    max_payload: Option<u64>,
    /// Payload length of the envelope currently being received.
    pending: Option<usize>,
}

impl EnvelopeCodec {
    /// A codec that accepts payloads of any length.
    pub fn new() -> Self {
        Self::default()
    }

    /// A codec that rejects headers announcing more than `max` bytes.
    pub fn with_max_payload(max: u64) -> Self {
        Self {
            max_payload: Some(max),
            pending: None,
        }
    }

    pub fn max_payload(&self) -> Option<u64> {
        self.max_payload
    }

    fn check_length(&self, len: u64) -> Result<usize, VidcastError> {
        if let Some(max) = self.max_payload {
            if len > max {
                return Err(VidcastError::PayloadTooLarge { size: len, max });
            }
        }
        usize::try_from(len).map_err(|_| VidcastError::PayloadTooLarge {
            size: len,
            max: usize::MAX as u64,
        })
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Bytes;
    type Error = VidcastError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let len = match self.pending {
            Some(len) => len,
            None => {
                if src.len() < LENGTH_PREFIX_SIZE {
                    return Ok(None);
                }
                let announced = u64::from_be_bytes([
                    src[0], src[1], src[2], src[3], src[4], src[5], src[6], src[7],
                ]);
                let len = self.check_length(announced)?;
                src.advance(LENGTH_PREFIX_SIZE);
                self.pending = Some(len);
                len
            }
        };

        if src.len() < len {
            return Ok(None);
        }

        self.pending = None;
        Ok(Some(src.split_to(len).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        match self.pending.take() {
            Some(len) => Err(VidcastError::Truncated {
                expected: len as u64,
                received: src.len(),
            }),
            None if !src.is_empty() => Err(VidcastError::Truncated {
                expected: LENGTH_PREFIX_SIZE as u64,
                received: src.len(),
            }),
            None => Ok(None),
        }
    }
}

impl Encoder<Bytes> for EnvelopeCodec {
    type Error = VidcastError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(LENGTH_PREFIX_SIZE + item.len());
        dst.put_u64(item.len() as u64);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
