//! Wires capture, sessions and monitoring into one running server.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::info;

use vidcast_core::monitor::{self, Monitor, StatsProvider};
use vidcast_core::network::discovery::DEFAULT_PROBE_ADDR;
use vidcast_core::{
    CaptureService, ServerSummary, StreamServer, TaskPool, TestPatternSource, VidcastError,
    ZstdFrameEncoder, outbound_ip,
};

use crate::config::ServerSettings;

/// How long capture and monitor tasks get to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct StreamingService {
    config: ServerSettings,
    running: Arc<AtomicBool>,
}

impl StreamingService {
    pub fn new(config: ServerSettings) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Clear the returned flag to stop the service from another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run until stopped and return the aggregate statistics.
    pub async fn run(&self) -> Result<ServerSummary, VidcastError> {
        self.running.store(true, Ordering::SeqCst);

        let server = StreamServer::bind(&self.config.to_server_config(), Arc::clone(&self.running)).await?;
        self.log_banner(server.local_addr()?.port()).await;

        let registry = server.registry();
        let capture = CaptureService::new(
            Box::new(TestPatternSource::new(
                self.config.stream.width,
                self.config.stream.height,
            )),
            Arc::new(ZstdFrameEncoder::new()),
            Arc::clone(&registry),
            Arc::clone(&self.running),
            self.config.to_capture_config(),
        );
        let provider: Arc<dyn StatsProvider> = registry.clone();
        let monitor = Monitor::new(
            provider,
            self.config.monitor_interval(),
            Arc::clone(&self.running),
        );

        let mut tasks = TaskPool::new();
        tasks.spawn("capture", async move {
            capture.run().await;
        });
        tasks.spawn("monitor", async move {
            monitor.run().await;
        });

        let result = server.run().await;
        self.running.store(false, Ordering::SeqCst);
        tasks.join_all(SHUTDOWN_GRACE).await;

        let summary = result?;
        monitor::log_server_summary(&summary);
        info!("server stopped");
        Ok(summary)
    }

    async fn log_banner(&self, port: u16) {
        let local_ip = outbound_ip(DEFAULT_PROBE_ADDR).await;
        info!("vidcast-server v{}", env!("CARGO_PKG_VERSION"));
        info!("  address:         {local_ip}:{port}");
        info!(
            "  resolution:      {}x{}",
            self.config.stream.width, self.config.stream.height
        );
        info!("  target fps:      {}", self.config.stream.fps);
        info!("  quality:         {}", self.config.stream.quality);
        info!("  max connections: {}", self.config.network.max_connections);
        info!("  buffer frames:   {}", self.config.stream.buffer_frames);
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_creates_stopped() {
        let svc = StreamingService::new(ServerSettings::default());
        assert!(!svc.is_running());
        svc.stop_handle().store(true, Ordering::SeqCst);
        assert!(svc.is_running());
        svc.stop();
        assert!(!svc.is_running());
    }

    #[tokio::test]
    async fn runs_until_stopped() {
        let mut config = ServerSettings::default();
        config.network.bind_address = "127.0.0.1".into();
        config.network.port = 0;
        config.stream.width = 32;
        config.stream.height = 24;

        let svc = StreamingService::new(config);
        let stop = svc.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            stop.store(false, Ordering::SeqCst);
        });

        let summary = tokio::time::timeout(Duration::from_secs(5), svc.run())
            .await
            .expect("service did not stop")
            .unwrap();
        assert_eq!(summary.clients_served, 0);
        assert!(summary.producer.frames > 0);
    }
}
