//! Periodic and end-of-run statistics reporting.
//!
//! The monitor only reads metrics; nothing it does affects streaming.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::info;

use crate::session::registry::{ServerSummary, SessionRegistry};
use crate::stream::metrics::{Metrics, MetricsSnapshot};
use crate::task::sleep_unless_stopped;

pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(10);

/// Anything that can report its live connections' statistics.
pub trait StatsProvider: Send + Sync {
    fn live_stats(&self) -> Vec<MetricsSnapshot>;
}

impl StatsProvider for SessionRegistry {
    fn live_stats(&self) -> Vec<MetricsSnapshot> {
        self.live_snapshots()
    }
}

impl StatsProvider for Metrics {
    fn live_stats(&self) -> Vec<MetricsSnapshot> {
        vec![self.snapshot()]
    }
}

pub struct Monitor {
    provider: Arc<dyn StatsProvider>,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl Monitor {
    pub fn new(provider: Arc<dyn StatsProvider>, interval: Duration, running: Arc<AtomicBool>) -> Self {
        Self {
            provider,
            interval,
            running,
        }
    }

    /// Log a report every interval until stopped. Returns the number of
    /// reports emitted.
    pub async fn run(self) -> u64 {
        let mut reports = 0;
        while self.running.load(Ordering::SeqCst) {
            if !sleep_unless_stopped(self.interval, &self.running).await {
                break;
            }
            let stats = self.provider.live_stats();
            if stats.is_empty() {
                continue;
            }
            info!("active connections: {}", stats.len());
            for snap in &stats {
                info!("  {}", summary_line(snap));
            }
            reports += 1;
        }
        reports
    }
}

/// One-line view of a connection's statistics.
pub fn summary_line(snap: &MetricsSnapshot) -> String {
    format!(
        "{}: {} frames, {:.1} fps, {:.1}ms latency, {:.2} Mbps, ~{} dropped (est.), {} overflow",
        snap.label,
        snap.frames,
        snap.current_fps,
        snap.avg_latency_ms,
        snap.throughput_mbps(),
        snap.dropped_estimate,
        snap.dropped_overflow,
    )
}

pub fn log_server_summary(summary: &ServerSummary) {
    info!("server session summary");
    info!("  clients served:  {}", summary.clients_served);
    info!("  frames sent:     {}", summary.total_frames);
    info!(
        "  data sent:       {:.2} MB",
        summary.total_bytes as f64 / (1024.0 * 1024.0)
    );
    info!(
        "  frames captured: {} ({} capture/encode errors, {} dropped on full buffers)",
        summary.producer.frames, summary.producer.errors, summary.producer.dropped_overflow
    );
    for client in &summary.clients {
        info!(
            "  {}: {} frames in {:.1}s, {:.1} avg fps, {:.1}ms avg latency",
            client.label, client.frames, client.elapsed_secs, client.average_fps, client.avg_latency_ms
        );
    }
}

pub fn log_client_summary(snap: &MetricsSnapshot) {
    info!("client session summary");
    info!("  frames received: {}", snap.frames);
    info!("  duration:        {:.1}s", snap.elapsed_secs);
    info!("  average fps:     {:.1}", snap.average_fps);
    info!("  average latency: {:.1}ms", snap.avg_latency_ms);
    info!("  data received:   {:.2} MB", snap.megabytes());
    info!("  dropped (est.):  {}", snap.dropped_estimate);
    info!("  reconnections:   {}", snap.reconnections);
    info!("  errors:          {}", snap.errors);
    info!("  stream quality:  {}", snap.quality());
}
