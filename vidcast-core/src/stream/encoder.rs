//! Zstd-based frame encoder.
//!
//! ## Payload layout
//!
//! ```text
//! width:   u32 big-endian (4)
//! height:  u32 big-endian (4)
//! format:  u8             (1)
//! pixels:  zstd stream    (variable)
//! ```
//!
//! Compression is lossless; the quality knob only trades CPU time for
//! payload size.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::VidcastError;
use crate::stream::pipeline::FrameEncoder;
use crate::stream::types::RawFrame;

/// Size of the dimensions/format header preceding the compressed pixels.
pub const PAYLOAD_HEADER_SIZE: usize = 9;

/// Highest zstd level the quality mapping will select.
const MAX_LEVEL: i32 = 9;

/// Map a 0..=100 quality to a zstd level.
///
/// High quality favours speed (level 1); low quality compresses harder.
pub fn compression_level(quality: u8) -> i32 {
    let q = i32::from(quality.min(100));
    (1 + (100 - q) * (MAX_LEVEL - 1) / 100).clamp(1, MAX_LEVEL)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdFrameEncoder;

impl ZstdFrameEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl FrameEncoder for ZstdFrameEncoder {
    fn encode(&self, frame: &RawFrame, quality: u8) -> Result<Bytes, VidcastError> {
        let expected = RawFrame::expected_len(frame.width, frame.height, frame.format)
            .ok_or_else(|| {
                VidcastError::Encoding(format!(
                    "{}x{} frame is too large to address",
                    frame.width, frame.height
                ))
            })?;
        if frame.data.len() != expected {
            return Err(VidcastError::Encoding(format!(
                "frame data is {} bytes, {}x{} needs {expected}",
                frame.data.len(),
                frame.width,
                frame.height,
            )));
        }

        let compressed = zstd::encode_all(frame.data.as_slice(), compression_level(quality))
            .map_err(|e| VidcastError::Encoding(format!("zstd encode failed: {e}")))?;

        let mut out = BytesMut::with_capacity(PAYLOAD_HEADER_SIZE + compressed.len());
        out.put_u32(frame.width);
        out.put_u32(frame.height);
        out.put_u8(frame.format.tag());
        out.extend_from_slice(&compressed);
        Ok(out.freeze())
    }
}
