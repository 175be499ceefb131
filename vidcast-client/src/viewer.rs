//! Ties the reconnecting client, the display and the monitor together.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{error, info};

use vidcast_core::monitor::{self, Monitor, StatsProvider};
use vidcast_core::{
    ClientConfig, MetricsSnapshot, ReconnectingClient, TaskPool, VidcastError, ZstdFrameDecoder,
};

use crate::display::DisplayRenderer;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct Viewer {
    client: ReconnectingClient,
    monitor_interval: Duration,
}

impl Viewer {
    pub fn new(config: ClientConfig, monitor_interval: Duration) -> Self {
        Self {
            client: ReconnectingClient::new(config, Arc::new(ZstdFrameDecoder::new())),
            monitor_interval,
        }
    }

    /// Clear the returned flag to stop the viewer.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.client.stop_handle()
    }

    /// Receive and display frames until stopped or the server is lost
    /// for good. The session summary is logged either way.
    pub async fn run(mut self) -> Result<MetricsSnapshot, VidcastError> {
        let running = self.client.stop_handle();
        let metrics = self.client.metrics();

        let mut tasks = TaskPool::new();
        let display = DisplayRenderer::new();
        let frames = self.client.frame_receiver();
        let display_running = Arc::clone(&running);
        tasks.spawn("display", async move {
            let shown = display.run(frames, display_running).await;
            info!("display closed after {shown} frames");
        });
        let provider: Arc<dyn StatsProvider> = metrics.clone();
        let monitor = Monitor::new(provider, self.monitor_interval, Arc::clone(&running));
        tasks.spawn("monitor", async move {
            monitor.run().await;
        });

        let result = self.client.run().await;
        running.store(false, Ordering::SeqCst);
        tasks.join_all(SHUTDOWN_GRACE).await;

        monitor::log_client_summary(&metrics.snapshot());
        if let Err(e) = &result {
            error!("viewer stopped: {e}");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use vidcast_core::ConnectionInfo;

    #[tokio::test]
    async fn unreachable_server_ends_with_retries_exhausted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let info = ConnectionInfo::from(listener.local_addr().unwrap());
        drop(listener);

        let config = ClientConfig {
            reconnect_attempts: 2,
            reconnect_delay: Duration::from_millis(10),
            ..ClientConfig::new(info)
        };
        let viewer = Viewer::new(config, Duration::from_secs(10));
        let result = tokio::time::timeout(Duration::from_secs(5), viewer.run())
            .await
            .expect("viewer did not give up");
        assert!(matches!(
            result,
            Err(VidcastError::RetriesExhausted { attempts: 2 })
        ));
    }
}
