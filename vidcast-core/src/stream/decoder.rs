//! Decoder for payloads produced by [`ZstdFrameEncoder`](crate::stream::encoder::ZstdFrameEncoder).

use std::time::Instant;

use crate::error::VidcastError;
use crate::stream::encoder::PAYLOAD_HEADER_SIZE;
use crate::stream::pipeline::FrameDecoder;
use crate::stream::types::{PixelFormat, RawFrame};

/// Largest raw frame a payload may announce (8K BGR fits with room).
pub const MAX_RAW_FRAME_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdFrameDecoder;

impl ZstdFrameDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl FrameDecoder for ZstdFrameDecoder {
    fn decode(&self, payload: &[u8]) -> Result<RawFrame, VidcastError> {
        if payload.len() < PAYLOAD_HEADER_SIZE {
            return Err(VidcastError::Decoding(format!(
                "payload too short: {} < {PAYLOAD_HEADER_SIZE}",
                payload.len()
            )));
        }
        let width = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let height = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let format = PixelFormat::from_tag(payload[8]).ok_or_else(|| {
            VidcastError::Decoding(format!("unknown pixel format tag {}", payload[8]))
        })?;

        let expected = RawFrame::expected_len(width, height, format)
            .filter(|&len| len <= MAX_RAW_FRAME_BYTES)
            .ok_or_else(|| {
                VidcastError::Decoding(format!(
                    "{width}x{height} frame exceeds {MAX_RAW_FRAME_BYTES} bytes"
                ))
            })?;

        // Never inflate past the size the header announces.
        let data = zstd::bulk::decompress(&payload[PAYLOAD_HEADER_SIZE..], expected)
            .map_err(|e| VidcastError::Decoding(format!("zstd decode failed: {e}")))?;
        if data.len() != expected {
            return Err(VidcastError::Decoding(format!(
                "decoded {} bytes, {width}x{height} needs {expected}",
                data.len()
            )));
        }

        Ok(RawFrame {
            width,
            height,
            format,
            data,
            captured_at: Instant::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::encoder::ZstdFrameEncoder;
    use crate::stream::pipeline::FrameEncoder;

    #[test]
    fn decodes_encoder_output() {
        let raw = RawFrame {
            width: 8,
            height: 4,
            format: PixelFormat::Rgb8,
            data: (0..96u8).collect(),
            captured_at: Instant::now(),
        };
        let payload = ZstdFrameEncoder::new().encode(&raw, 50).unwrap();
        let decoded = ZstdFrameDecoder::new().decode(&payload).unwrap();
        assert_eq!(decoded.width, 8);
        assert_eq!(decoded.height, 4);
        assert_eq!(decoded.format, PixelFormat::Rgb8);
        assert_eq!(decoded.data, raw.data);
    }

    #[test]
    fn garbage_is_a_decoding_error() {
        let mut payload = vec![0, 0, 0, 1, 0, 0, 0, 1, 2];
        payload.extend_from_slice(b"not zstd");
        assert!(matches!(
            ZstdFrameDecoder::new().decode(&payload),
            Err(VidcastError::Decoding(_))
        ));
    }

    #[test]
    fn short_payload_is_a_decoding_error() {
        assert!(ZstdFrameDecoder::new().decode(&[1, 2, 3]).is_err());
    }

    fn payload(width: u32, height: u32, format: PixelFormat, pixels: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&width.to_be_bytes());
        out.extend_from_slice(&height.to_be_bytes());
        out.push(format.tag());
        out.extend_from_slice(&zstd::encode_all(pixels, 1).unwrap());
        out
    }

    #[test]
    fn oversized_dimensions_are_a_decoding_error() {
        let hostile = payload(u32::MAX, u32::MAX, PixelFormat::Bgr8, &[]);
        assert!(matches!(
            ZstdFrameDecoder::new().decode(&hostile),
            Err(VidcastError::Decoding(_))
        ));
    }

    #[test]
    fn announced_size_above_ceiling_is_rejected() {
        let hostile = payload(u32::MAX, u32::MAX, PixelFormat::Gray8, &[]);
        let err = ZstdFrameDecoder::new().decode(&hostile).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn pixels_beyond_announced_size_are_rejected() {
        let bomb = payload(2, 2, PixelFormat::Gray8, &vec![0u8; 1 << 20]);
        assert!(matches!(
            ZstdFrameDecoder::new().decode(&bomb),
            Err(VidcastError::Decoding(_))
        ));
    }

    #[test]
    fn short_pixel_data_is_rejected() {
        let short = payload(4, 4, PixelFormat::Gray8, &[7u8; 10]);
        let err = ZstdFrameDecoder::new().decode(&short).unwrap_err();
        assert!(err.to_string().contains("needs 16"));
    }

    #[test]
    fn unknown_format_tag() {
        let payload = [0, 0, 0, 1, 0, 0, 0, 1, 42];
        let err = ZstdFrameDecoder::new().decode(&payload).unwrap_err();
        assert!(err.to_string().contains("42"));
    }
}
