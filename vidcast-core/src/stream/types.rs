//! Frame types shared by the capture, transport and display stages.
//!
//! [`RawFrame`] is what a source produces and a decoder reconstructs;
//! [`Frame`] is the encoded, sequenced unit that travels through the
//! frame buffers and over the wire.

use std::time::Instant;

use bytes::Bytes;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout for raw frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 3 bytes per pixel: Blue, Green, Red (typical camera output).
    Bgr8,
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb8,
    /// 1 byte per pixel.
    Gray8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }

    /// Stable wire tag used by the frame codec.
    pub const fn tag(self) -> u8 {
        match self {
            PixelFormat::Bgr8 => 0,
            PixelFormat::Rgb8 => 1,
            PixelFormat::Gray8 => 2,
        }
    }

    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(PixelFormat::Bgr8),
            1 => Some(PixelFormat::Rgb8),
            2 => Some(PixelFormat::Gray8),
            _ => None,
        }
    }
}

// ── RawFrame ─────────────────────────────────────────────────────

/// An uncompressed image, rows tightly packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// `width * height * bytes_per_pixel` bytes.
    pub data: Vec<u8>,
    /// Monotonic capture timestamp.
    pub captured_at: Instant,
}

impl RawFrame {
    /// Byte length implied by the dimensions and format, `None` if it
    /// does not fit in `usize`.
    pub fn expected_len(width: u32, height: u32, format: PixelFormat) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(format.bytes_per_pixel())
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// One encoded frame on its way to the consumers.
///
/// Cloning is cheap: the payload is reference counted, so fan-out hands
/// every session its own handle to the same bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonically increasing per producer.
    pub sequence: u64,
    pub captured_at: Instant,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(sequence: u64, captured_at: Instant, payload: Bytes) -> Self {
        Self {
            sequence,
            captured_at,
            payload,
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_tags_roundtrip() {
        for f in [PixelFormat::Bgr8, PixelFormat::Rgb8, PixelFormat::Gray8] {
            assert_eq!(PixelFormat::from_tag(f.tag()), Some(f));
        }
        assert_eq!(PixelFormat::from_tag(9), None);
    }

    #[test]
    fn expected_len_matches_packed_rows() {
        let frame = RawFrame {
            width: 2,
            height: 2,
            format: PixelFormat::Rgb8,
            data: (0u8..12).collect(),
            captured_at: Instant::now(),
        };
        assert_eq!(
            Some(frame.byte_len()),
            RawFrame::expected_len(2, 2, PixelFormat::Rgb8)
        );
        assert_eq!(RawFrame::expected_len(0, 480, PixelFormat::Bgr8), Some(0));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn expected_len_overflow_is_none() {
        assert_eq!(
            RawFrame::expected_len(u32::MAX, u32::MAX, PixelFormat::Bgr8),
            None
        );
        assert_eq!(
            RawFrame::expected_len(u32::MAX, u32::MAX, PixelFormat::Gray8),
            Some(u32::MAX as usize * u32::MAX as usize)
        );
    }

    #[test]
    fn frame_clone_shares_payload() {
        let frame = Frame::new(1, Instant::now(), Bytes::from(vec![1u8; 1024]));
        let copy = frame.clone();
        assert_eq!(frame.payload.as_ptr(), copy.payload.as_ptr());
    }
}
