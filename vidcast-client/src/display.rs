//! Headless display: consumes decoded frames from the client.
//!
//! Stands in for an on-screen renderer: each new frame is validated
//! and counted, and resolution changes are logged.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use vidcast_core::task::wait_for_stop;
use vidcast_core::{FrameWatch, RawFrame};

#[derive(Debug, Default)]
pub struct DisplayRenderer {
    rendered: u64,
    size: Option<(u32, u32)>,
}

impl DisplayRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames shown so far.
    pub fn rendered(&self) -> u64 {
        self.rendered
    }

    /// Dimensions of the last frame shown.
    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    /// Present one frame.
    pub fn render(&mut self, frame: &RawFrame) -> Result<(), String> {
        let Some(expected) = RawFrame::expected_len(frame.width, frame.height, frame.format) else {
            return Err(format!("frame size {}x{} overflows", frame.width, frame.height));
        };
        if frame.data.len() < expected {
            return Err(format!(
                "frame buffer too small for {}x{}: {} bytes",
                frame.width,
                frame.height,
                frame.data.len()
            ));
        }

        let size = (frame.width, frame.height);
        if self.size != Some(size) {
            info!("stream resolution {}x{}", size.0, size.1);
            self.size = Some(size);
        }
        self.rendered += 1;
        debug!(
            "frame {} ({} bytes, {:.1}ms since capture)",
            self.rendered,
            frame.data.len(),
            frame.captured_at.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    /// Present frames as they are published until `running` clears or
    /// the publisher goes away.
    pub async fn run(mut self, mut frames: FrameWatch, running: Arc<AtomicBool>) -> u64 {
        while running.load(Ordering::SeqCst) {
            let changed = tokio::select! {
                r = frames.changed() => r,
                _ = wait_for_stop(&running) => break,
            };
            if changed.is_err() {
                break;
            }
            let latest = frames.borrow_and_update().clone();
            if let Some(frame) = latest {
                if let Err(e) = self.render(&frame) {
                    debug!("render error: {e}");
                }
            }
        }
        self.rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tokio::sync::watch;
    use vidcast_core::PixelFormat;

    fn frame(w: u32, h: u32) -> RawFrame {
        RawFrame {
            width: w,
            height: h,
            format: PixelFormat::Gray8,
            data: vec![0; (w * h) as usize],
            captured_at: Instant::now(),
        }
    }

    #[test]
    fn tracks_size_and_count() {
        let mut r = DisplayRenderer::new();
        r.render(&frame(4, 2)).unwrap();
        r.render(&frame(8, 4)).unwrap();
        assert_eq!(r.rendered(), 2);
        assert_eq!(r.size(), Some((8, 4)));
    }

    #[test]
    fn short_buffer_is_rejected() {
        let mut r = DisplayRenderer::new();
        let mut bad = frame(4, 4);
        bad.data.truncate(3);
        assert!(r.render(&bad).is_err());
        assert_eq!(r.rendered(), 0);
    }

    #[test]
    fn unaddressable_size_is_rejected() {
        let mut r = DisplayRenderer::new();
        let mut huge = frame(1, 1);
        huge.width = u32::MAX;
        huge.height = u32::MAX;
        huge.format = PixelFormat::Rgb8;
        assert!(r.render(&huge).is_err());
        assert_eq!(r.size(), None);
    }

    #[tokio::test]
    async fn run_ends_when_publisher_drops() {
        let (tx, rx) = watch::channel(None);
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(DisplayRenderer::new().run(rx, running));

        tx.send_replace(Some(Arc::new(frame(2, 2))));
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(tx);

        let shown = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shown, 1);
    }
}
