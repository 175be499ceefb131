//! Connection statistics shared by both ends of a stream.
//!
//! One [`Metrics`] record exists per connection (each server session and
//! the client link) plus one for the producing process. The owner updates
//! it on every successful transfer; reporters read [`MetricsSnapshot`]s
//! concurrently.
//!
//! The dropped-frame figure derived from timing gaps is an estimate: a
//! receiver cannot see frames that were never sent to it.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

// ── Constants ────────────────────────────────────────────────────

/// Recent latencies kept for the mean.
pub const LATENCY_WINDOW: usize = 100;

/// Recent transfer timestamps kept for the instantaneous rate.
pub const RATE_WINDOW: usize = 30;

/// Nominal frame rate assumed when none is configured.
pub const DEFAULT_NOMINAL_FPS: f64 = 30.0;

/// Transfers slower than this are reported as high latency.
pub const HIGH_LATENCY_THRESHOLD: Duration = Duration::from_millis(100);

// ── Metrics ──────────────────────────────────────────────────────

#[derive(Debug)]
struct MetricsState {
    frames: u64,
    bytes: u64,
    started_at: Instant,
    last_activity: Option<Instant>,
    latencies: VecDeque<Duration>,
    activity: VecDeque<Instant>,
    dropped_estimate: u64,
    dropped_overflow: u64,
    reconnections: u64,
    errors: u64,
}

/// Lock-protected statistics record for one connection or process.
#[derive(Debug)]
pub struct Metrics {
    label: String,
    nominal_period: Duration,
    state: Mutex<MetricsState>,
}

impl Metrics {
    /// Create a record assuming the default 30 fps nominal rate.
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_nominal_fps(label, DEFAULT_NOMINAL_FPS)
    }

    /// Create a record with an explicit nominal frame rate.
    pub fn with_nominal_fps(label: impl Into<String>, fps: f64) -> Self {
        Self::with_start(label, fps, Instant::now())
    }

    /// Create a record whose clock starts at `started_at`.
    pub fn with_start(label: impl Into<String>, fps: f64, started_at: Instant) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 {
            fps
        } else {
            DEFAULT_NOMINAL_FPS
        };
        Self {
            label: label.into(),
            nominal_period: Duration::from_secs_f64(1.0 / fps),
            state: Mutex::new(MetricsState {
                frames: 0,
                bytes: 0,
                started_at,
                last_activity: None,
                latencies: VecDeque::with_capacity(LATENCY_WINDOW),
                activity: VecDeque::with_capacity(RATE_WINDOW),
                dropped_estimate: 0,
                dropped_overflow: 0,
                reconnections: 0,
                errors: 0,
            }),
        }
    }

    pub fn nominal_period(&self) -> Duration {
        self.nominal_period
    }

    /// Record a successful transfer of `bytes` that took `latency`.
    ///
    /// Returns the number of frames estimated missing since the previous
    /// transfer.
    pub fn record_transfer(&self, bytes: usize, latency: Duration) -> u64 {
        self.record_transfer_at(Instant::now(), bytes, latency)
    }

    /// Record with an explicit timestamp (useful for testing).
    pub fn record_transfer_at(&self, now: Instant, bytes: usize, latency: Duration) -> u64 {
        let mut state = self.lock();

        let missed = state
            .last_activity
            .map(|last| estimate_missed(now.saturating_duration_since(last), self.nominal_period))
            .unwrap_or(0);

        state.frames += 1;
        state.bytes += bytes as u64;
        state.dropped_estimate += missed;
        state.last_activity = Some(now);

        if state.latencies.len() == LATENCY_WINDOW {
            state.latencies.pop_front();
        }
        state.latencies.push_back(latency);

        if state.activity.len() == RATE_WINDOW {
            state.activity.pop_front();
        }
        state.activity.push_back(now);

        missed
    }

    /// Count frames dropped because a buffer was full.
    pub fn record_overflow_drop(&self, frames: u64) {
        self.lock().dropped_overflow += frames;
    }

    pub fn record_error(&self) {
        self.lock().errors += 1;
    }

    pub fn record_reconnection(&self) {
        self.lock().reconnections += 1;
    }

    pub fn frames(&self) -> u64 {
        self.lock().frames
    }

    pub fn errors(&self) -> u64 {
        self.lock().errors
    }

    pub fn reconnections(&self) -> u64 {
        self.lock().reconnections
    }

    /// Current statistics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot_at(Instant::now())
    }

    /// Statistics as of `now`.
    pub fn snapshot_at(&self, now: Instant) -> MetricsSnapshot {
        let state = self.lock();
        let elapsed = now.saturating_duration_since(state.started_at);
        let secs = elapsed.as_secs_f64();

        let average_fps = if secs > 0.0 {
            state.frames as f64 / secs
        } else {
            0.0
        };

        let current_fps = match (state.activity.front(), state.activity.back()) {
            (Some(first), Some(last)) if state.activity.len() >= 2 => {
                let span = last.saturating_duration_since(*first).as_secs_f64();
                if span > 0.0 {
                    state.activity.len() as f64 / span
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        let avg_latency_ms = if state.latencies.is_empty() {
            0.0
        } else {
            let total: Duration = state.latencies.iter().sum();
            total.as_secs_f64() * 1000.0 / state.latencies.len() as f64
        };

        let throughput_bps = if secs > 0.0 {
            state.bytes as f64 * 8.0 / secs
        } else {
            0.0
        };

        MetricsSnapshot {
            label: self.label.clone(),
            elapsed_secs: secs,
            frames: state.frames,
            bytes: state.bytes,
            average_fps,
            current_fps,
            avg_latency_ms,
            throughput_bps,
            dropped_estimate: state.dropped_estimate,
            dropped_overflow: state.dropped_overflow,
            reconnections: state.reconnections,
            errors: state.errors,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Frames presumed missing in a gap between two transfers.
///
/// Gaps up to 1.5 nominal periods are jitter; beyond that every whole
/// period past the first counts as one missed frame.
fn estimate_missed(gap: Duration, period: Duration) -> u64 {
    if period.is_zero() || gap.as_nanos() * 2 <= period.as_nanos() * 3 {
        return 0;
    }
    (gap.saturating_sub(period).as_nanos() / period.as_nanos()) as u64
}

// ── MetricsSnapshot ──────────────────────────────────────────────

/// Point-in-time statistics, safe to log or serialise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub label: String,
    pub elapsed_secs: f64,
    pub frames: u64,
    pub bytes: u64,
    /// Frames over the whole lifetime divided by elapsed time.
    pub average_fps: f64,
    /// Rate over the recent activity window.
    pub current_fps: f64,
    /// Mean over the recent latency window.
    pub avg_latency_ms: f64,
    /// Bits per second over the whole lifetime.
    pub throughput_bps: f64,
    /// Estimated from timing gaps; not an exact count.
    pub dropped_estimate: u64,
    /// Frames rejected by a full buffer.
    pub dropped_overflow: u64,
    pub reconnections: u64,
    pub errors: u64,
}

impl MetricsSnapshot {
    pub fn throughput_mbps(&self) -> f64 {
        self.throughput_bps / 1_000_000.0
    }

    pub fn megabytes(&self) -> f64 {
        self.bytes as f64 / (1024.0 * 1024.0)
    }

    /// Overall link grade from drop ratio and latency.
    pub fn quality(&self) -> StreamQuality {
        let frames = self.frames as f64;
        let dropped = self.dropped_estimate as f64;
        if dropped > frames * 0.05 {
            StreamQuality::Poor
        } else if dropped > frames * 0.01 {
            StreamQuality::Fair
        } else if self.avg_latency_ms > HIGH_LATENCY_THRESHOLD.as_secs_f64() * 1000.0 {
            StreamQuality::Good
        } else {
            StreamQuality::Excellent
        }
    }
}

/// Coarse link grade shown in summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl std::fmt::Display for StreamQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excellent => write!(f, "Excellent"),
            Self::Good => write!(f, "Good"),
            Self::Fair => write!(f, "Fair"),
            Self::Poor => write!(f, "Poor"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn empty_metrics_snapshot_is_zero() {
        let t0 = Instant::now();
        let m = Metrics::with_start("idle", 30.0, t0);
        let s = m.snapshot_at(t0);
        assert_eq!(s.frames, 0);
        assert_eq!(s.average_fps, 0.0);
        assert_eq!(s.current_fps, 0.0);
        assert_eq!(s.avg_latency_ms, 0.0);
        assert_eq!(s.throughput_bps, 0.0);
    }

    #[test]
    fn frame_count_ignores_errors_and_drops() {
        let t0 = Instant::now();
        let m = Metrics::with_start("peer", 30.0, t0);
        for i in 0..10u32 {
            m.record_transfer_at(t0 + MS * (33 * i), 100, MS);
            if i % 3 == 0 {
                m.record_error();
                m.record_overflow_drop(2);
            }
        }
        let s = m.snapshot_at(t0 + Duration::from_secs(1));
        assert_eq!(s.frames, 10);
        assert_eq!(s.bytes, 1000);
        assert_eq!(s.errors, 4);
        assert_eq!(s.dropped_overflow, 8);
    }

    #[test]
    fn steady_rate_estimates_no_drops() {
        let t0 = Instant::now();
        let m = Metrics::with_start("steady", 30.0, t0);
        for i in 0..60u32 {
            assert_eq!(m.record_transfer_at(t0 + MS * (33 * i), 10, MS), 0);
        }
        assert_eq!(m.snapshot_at(t0 + Duration::from_secs(2)).dropped_estimate, 0);
    }

    #[test]
    fn gap_estimates_missed_frames() {
        let t0 = Instant::now();
        let m = Metrics::with_start("gappy", 30.0, t0);
        m.record_transfer_at(t0, 10, MS);
        // 100 ms at a 33.3 ms period: two frames missing.
        assert_eq!(m.record_transfer_at(t0 + MS * 100, 10, MS), 2);
        // 45 ms is under 1.5 periods: jitter, not a drop.
        assert_eq!(m.record_transfer_at(t0 + MS * 145, 10, MS), 0);
        assert_eq!(m.snapshot_at(t0 + MS * 200).dropped_estimate, 2);
    }

    #[test]
    fn first_transfer_never_estimates() {
        let t0 = Instant::now();
        let m = Metrics::with_start("late", 30.0, t0);
        assert_eq!(m.record_transfer_at(t0 + Duration::from_secs(5), 10, MS), 0);
    }

    #[test]
    fn windows_are_bounded() {
        let t0 = Instant::now();
        let m = Metrics::with_start("busy", 30.0, t0);
        for i in 0..200u32 {
            // Old latencies are 1000 ms, the last 100 are 10 ms.
            let latency = if i < 100 { MS * 1000 } else { MS * 10 };
            m.record_transfer_at(t0 + MS * (10 * i), 1, latency);
        }
        let s = m.snapshot_at(t0 + Duration::from_secs(2));
        assert!((s.avg_latency_ms - 10.0).abs() < 1e-6);
        // 30 samples spanning 290 ms.
        assert!((s.current_fps - 30.0 / 0.29).abs() < 1e-3);
    }

    #[test]
    fn throughput_in_bits_per_second() {
        let t0 = Instant::now();
        let m = Metrics::with_start("bw", 30.0, t0);
        m.record_transfer_at(t0, 125_000, MS);
        let s = m.snapshot_at(t0 + Duration::from_secs(1));
        assert!((s.throughput_bps - 1_000_000.0).abs() < 1.0);
        assert!((s.throughput_mbps() - 1.0).abs() < 1e-6);
        assert!((s.average_fps - 1.0).abs() < 1e-9);
    }

    #[test]
    fn quality_grades() {
        let t0 = Instant::now();
        let m = Metrics::with_start("q", 30.0, t0);
        for i in 0..100u32 {
            m.record_transfer_at(t0 + MS * (33 * i), 1, MS);
        }
        assert_eq!(m.snapshot_at(t0).quality(), StreamQuality::Excellent);

        let mut s = m.snapshot_at(t0);
        s.avg_latency_ms = 150.0;
        assert_eq!(s.quality(), StreamQuality::Good);
        s.dropped_estimate = 3;
        assert_eq!(s.quality(), StreamQuality::Fair);
        s.dropped_estimate = 6;
        assert_eq!(s.quality(), StreamQuality::Poor);
    }

    #[test]
    fn reconnections_counted() {
        let m = Metrics::new("client");
        m.record_reconnection();
        m.record_reconnection();
        assert_eq!(m.reconnections(), 2);
        assert_eq!(m.snapshot().reconnections, 2);
    }

    #[test]
    fn invalid_nominal_fps_falls_back() {
        let m = Metrics::with_nominal_fps("bad", 0.0);
        assert_eq!(m.nominal_period(), Duration::from_secs_f64(1.0 / DEFAULT_NOMINAL_FPS));
    }
}
