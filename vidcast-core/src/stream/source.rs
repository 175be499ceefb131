//! Synthetic frame source.
//!
//! Produces a diagonal gradient that scrolls by a few pixels per frame,
//! so consecutive frames differ and a viewer can see motion without any
//! capture hardware.

use std::time::Instant;

use async_trait::async_trait;

use crate::error::VidcastError;
use crate::stream::pipeline::FrameSource;
use crate::stream::types::{PixelFormat, RawFrame};

/// Pixels the pattern scrolls per captured frame.
const SCROLL_STEP: u32 = 4;

#[derive(Debug, Clone)]
pub struct TestPatternSource {
    width: u32,
    height: u32,
    tick: u32,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tick: 0,
        }
    }

    fn render(&self) -> Vec<u8> {
        let capacity =
            RawFrame::expected_len(self.width, self.height, PixelFormat::Bgr8).unwrap_or_default();
        let mut data = Vec::with_capacity(capacity);
        let offset = self.tick.wrapping_mul(SCROLL_STEP);
        for y in 0..self.height {
            for x in 0..self.width {
                let v = x.wrapping_add(y).wrapping_add(offset);
                data.push((v & 0xFF) as u8);
                data.push(((v >> 1) & 0xFF) as u8);
                data.push(((y * 255) / self.height.max(1)) as u8);
            }
        }
        data
    }
}

#[async_trait]
impl FrameSource for TestPatternSource {
    async fn capture(&mut self) -> Result<RawFrame, VidcastError> {
        if self.width == 0 || self.height == 0 {
            return Err(VidcastError::Capture(format!(
                "invalid pattern size {}x{}",
                self.width, self.height
            )));
        }
        let data = self.render();
        self.tick = self.tick.wrapping_add(1);
        Ok(RawFrame {
            width: self.width,
            height: self.height,
            format: PixelFormat::Bgr8,
            data,
            captured_at: Instant::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_have_expected_size_and_move() {
        let mut src = TestPatternSource::new(16, 8);
        let a = src.capture().await.unwrap();
        let b = src.capture().await.unwrap();
        assert_eq!(a.byte_len(), 16 * 8 * 3);
        assert_eq!(a.format, PixelFormat::Bgr8);
        assert_ne!(a.data, b.data);
    }

    #[tokio::test]
    async fn zero_size_fails() {
        let mut src = TestPatternSource::new(0, 8);
        assert!(matches!(src.capture().await, Err(VidcastError::Capture(_))));
    }
}
