//! Producer-side capture loop.
//!
//! Each iteration captures one raw frame, encodes it, stamps it with a
//! sequence number and hands it to the [`SessionRegistry`] for fan-out.
//! The loop is paced to the configured frame rate and stops when its
//! `running` flag clears.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::session::registry::SessionRegistry;
use crate::stream::pipeline::{FrameEncoder, FrameSource};
use crate::stream::types::Frame;
use crate::task::sleep_unless_stopped;

/// Back-off after a failed capture.
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Frames between achieved-fps log lines.
const FPS_LOG_EVERY: u64 = 30;

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target frames per second (at least 1).
    pub target_fps: u32,
    /// Encoder quality, 0..=100.
    pub quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            quality: 80,
        }
    }
}

impl CaptureConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.target_fps.max(1)))
    }
}

pub struct CaptureService {
    source: Box<dyn FrameSource>,
    encoder: Arc<dyn FrameEncoder>,
    registry: Arc<SessionRegistry>,
    running: Arc<AtomicBool>,
    config: CaptureConfig,
}

impl CaptureService {
    pub fn new(
        source: Box<dyn FrameSource>,
        encoder: Arc<dyn FrameEncoder>,
        registry: Arc<SessionRegistry>,
        running: Arc<AtomicBool>,
        config: CaptureConfig,
    ) -> Self {
        Self {
            source,
            encoder,
            registry,
            running,
            config,
        }
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run until stopped, returning the number of frames produced.
    pub async fn run(mut self) -> u64 {
        let interval = self.config.frame_interval();
        let metrics = Arc::clone(self.registry.metrics());
        let mut sequence: u64 = 0;
        let mut window_start = Instant::now();

        info!(
            "capture started: {} fps, quality {}",
            self.config.target_fps, self.config.quality
        );

        while self.running.load(Ordering::SeqCst) {
            let loop_start = Instant::now();

            let raw = match self.source.capture().await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("capture failed: {e}");
                    metrics.record_error();
                    sleep_unless_stopped(CAPTURE_RETRY_DELAY, &self.running).await;
                    continue;
                }
            };

            let payload = match self.encoder.encode(&raw, self.config.quality) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("encode failed, skipping frame: {e}");
                    metrics.record_error();
                    Self::pace(loop_start, interval, &self.running).await;
                    continue;
                }
            };

            let frame = Frame::new(sequence, raw.captured_at, payload);
            let size = frame.len();
            let fanout = self.registry.distribute(frame);
            metrics.record_transfer(size, loop_start.elapsed());
            sequence += 1;

            if sequence % FPS_LOG_EVERY == 0 {
                let fps = FPS_LOG_EVERY as f64 / window_start.elapsed().as_secs_f64();
                debug!(
                    "captured {sequence} frames, {fps:.1} fps, last frame to {} session(s) ({} dropped)",
                    fanout.delivered, fanout.rejected
                );
                window_start = Instant::now();
            }

            Self::pace(loop_start, interval, &self.running).await;
        }

        info!("capture stopped after {sequence} frames");
        sequence
    }

    async fn pace(loop_start: Instant, interval: Duration, running: &Arc<AtomicBool>) {
        let elapsed = loop_start.elapsed();
        if elapsed < interval {
            sleep_unless_stopped(interval - elapsed, running).await;
        }
    }
}
