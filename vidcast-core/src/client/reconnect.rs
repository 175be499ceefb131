//! Consumer side: receive, decode and publish frames, reconnecting with
//! bounded retries whenever the link drops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::client::phase::ConnectionPhase;
use crate::codec::EnvelopeCodec;
use crate::error::VidcastError;
use crate::network::{ConnectionInfo, DEFAULT_RECV_CHUNK, FrameStream, ReadOutcome};
use crate::stream::metrics::{DEFAULT_NOMINAL_FPS, Metrics, MetricsSnapshot};
use crate::stream::pipeline::FrameDecoder;
use crate::stream::types::RawFrame;
use crate::task::{sleep_unless_stopped, wait_for_stop};

/// Latest decoded frame, `None` until the first one arrives.
pub type FrameWatch = watch::Receiver<Option<Arc<RawFrame>>>;

// ── ClientConfig ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: ConnectionInfo,
    pub connect_timeout: Duration,
    /// Attempts per reconnection cycle before giving up.
    pub reconnect_attempts: u32,
    /// Pause between two attempts of the same cycle.
    pub reconnect_delay: Duration,
    pub recv_chunk: usize,
    /// Largest payload accepted from the server; `None` for no limit.
    pub max_payload: Option<u64>,
    /// A read that sees nothing for this long is logged and retried.
    pub read_timeout: Duration,
    pub nominal_fps: f64,
    /// Received frames between progress log lines; 0 disables them.
    pub stats_every: u64,
}

impl ClientConfig {
    pub fn new(server: ConnectionInfo) -> Self {
        Self {
            server,
            connect_timeout: Duration::from_secs(5),
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(2),
            recv_chunk: DEFAULT_RECV_CHUNK,
            max_payload: Some(16 * 1024 * 1024),
            read_timeout: Duration::from_secs(5),
            nominal_fps: DEFAULT_NOMINAL_FPS,
            stats_every: 30,
        }
    }

    fn codec(&self) -> EnvelopeCodec {
        match self.max_payload {
            Some(max) => EnvelopeCodec::with_max_payload(max),
            None => EnvelopeCodec::new(),
        }
    }
}

// ── ReconnectingClient ───────────────────────────────────────────

/// Keeps one connection to the server alive and feeds decoded frames
/// into a `watch` channel for the renderer.
///
/// The first successful connection is not a reconnection; every later
/// successful re-establishment adds one to the reconnection counter.
pub struct ReconnectingClient {
    config: ClientConfig,
    decoder: Arc<dyn FrameDecoder>,
    metrics: Arc<Metrics>,
    running: Arc<AtomicBool>,
    phase: ConnectionPhase,
    stream: Option<FrameStream<TcpStream>>,
    ever_connected: bool,
    total_attempts: Arc<AtomicU64>,
    frame_tx: watch::Sender<Option<Arc<RawFrame>>>,
    frame_rx: FrameWatch,
}

impl ReconnectingClient {
    pub fn new(config: ClientConfig, decoder: Arc<dyn FrameDecoder>) -> Self {
        let (frame_tx, frame_rx) = watch::channel(None);
        let metrics = Arc::new(Metrics::with_nominal_fps(
            config.server.to_string(),
            config.nominal_fps,
        ));
        Self {
            config,
            decoder,
            metrics,
            running: Arc::new(AtomicBool::new(true)),
            phase: ConnectionPhase::Disconnected,
            stream: None,
            ever_connected: false,
            total_attempts: Arc::new(AtomicU64::new(0)),
            frame_tx,
            frame_rx,
        }
    }

    pub fn phase(&self) -> &ConnectionPhase {
        &self.phase
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// A receiver for decoded frames; clone freely.
    pub fn frame_receiver(&self) -> FrameWatch {
        self.frame_rx.clone()
    }

    /// Connection attempts made so far, successful or not.
    pub fn total_attempts(&self) -> u64 {
        self.total_attempts.load(Ordering::SeqCst)
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Make a single connection attempt.
    pub async fn connect(&mut self) -> Result<(), VidcastError> {
        if !self.phase.is_disconnected() {
            self.drop_connection();
        }
        self.phase.begin_connect()?;
        self.total_attempts.fetch_add(1, Ordering::SeqCst);
        info!("connecting to {}", self.config.server);

        let attempt = FrameStream::connect(
            &self.config.server,
            self.config.connect_timeout,
            self.config.codec(),
            self.config.recv_chunk,
        )
        .await;

        match attempt {
            Ok(stream) => {
                self.stream = Some(stream);
                self.phase.complete_connect()?;
                if self.ever_connected {
                    self.metrics.record_reconnection();
                }
                self.ever_connected = true;
                info!("connected to {}", self.config.server);
                Ok(())
            }
            Err(e) => {
                self.phase.disconnect()?;
                warn!("connection to {} failed: {e}", self.config.server);
                Err(e)
            }
        }
    }

    /// Run one bounded retry cycle.
    ///
    /// Returns `Ok(true)` once connected, `Ok(false)` if stopped while
    /// waiting, or [`VidcastError::RetriesExhausted`].
    pub async fn reconnect(&mut self) -> Result<bool, VidcastError> {
        let max = self.config.reconnect_attempts.max(1);
        for attempt in 1..=max {
            if !self.is_running() {
                return Ok(false);
            }
            info!("connection attempt {attempt}/{max}");
            if self.connect().await.is_ok() {
                return Ok(true);
            }
            if attempt < max
                && !sleep_unless_stopped(self.config.reconnect_delay, &self.running).await
            {
                return Ok(false);
            }
        }
        error!("could not reach {} after {max} attempts", self.config.server);
        Err(VidcastError::RetriesExhausted { attempts: max })
    }

    /// Receive until stopped or retries run out.
    ///
    /// Returns the final statistics on a requested stop.
    pub async fn run(&mut self) -> Result<MetricsSnapshot, VidcastError> {
        let mut received: u64 = 0;

        while self.is_running() {
            if !self.phase.is_connected() && !self.reconnect().await? {
                break;
            }
            let Some(stream) = self.stream.as_mut() else {
                self.phase.reset();
                continue;
            };

            let started = Instant::now();
            let outcome = tokio::select! {
                r = tokio::time::timeout(self.config.read_timeout, stream.read_frame()) => r,
                _ = wait_for_stop(&self.running) => break,
            };

            let payload = match outcome {
                Err(_) => {
                    debug!("no frame within {:?}", self.config.read_timeout);
                    continue;
                }
                Ok(Ok(ReadOutcome::Frame(payload))) => payload,
                Ok(Ok(ReadOutcome::Closed)) => {
                    warn!("server closed the connection");
                    self.drop_connection();
                    continue;
                }
                Ok(Ok(ReadOutcome::Incomplete { expected, received })) => {
                    warn!("connection lost mid-frame ({received}/{expected} bytes)");
                    self.drop_connection();
                    continue;
                }
                Ok(Err(e)) => {
                    warn!("receive failed: {e}");
                    self.metrics.record_error();
                    if e.is_connection_terminal() {
                        self.drop_connection();
                    }
                    continue;
                }
            };
            let latency = started.elapsed();

            match self.decoder.decode(&payload) {
                Ok(frame) => {
                    self.metrics.record_transfer(payload.len(), latency);
                    self.frame_tx.send_replace(Some(Arc::new(frame)));
                    received += 1;
                    if self.config.stats_every > 0 && received % self.config.stats_every == 0 {
                        let snap = self.metrics.snapshot();
                        info!(
                            "streaming: {} frames, {:.1} fps, {:.1}ms latency",
                            snap.frames, snap.current_fps, snap.avg_latency_ms
                        );
                    }
                }
                Err(e) => {
                    warn!("dropping undecodable frame: {e}");
                    self.metrics.record_error();
                }
            }
        }

        self.drop_connection();
        Ok(self.metrics.snapshot())
    }

    fn drop_connection(&mut self) {
        self.stream = None;
        if let Some(up) = self.phase.connected_duration() {
            debug!("link dropped after {:.1}s", up.as_secs_f64());
        }
        if !self.phase.is_disconnected() {
            debug!("{} -> Disconnected", self.phase);
            self.phase.disconnect().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::decoder::ZstdFrameDecoder;
    use tokio::net::TcpListener;

    async fn refused_endpoint() -> ConnectionInfo {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        ConnectionInfo::from(addr)
    }

    fn quick(server: ConnectionInfo, attempts: u32) -> ClientConfig {
        ClientConfig {
            reconnect_attempts: attempts,
            reconnect_delay: Duration::from_millis(20),
            connect_timeout: Duration::from_millis(500),
            ..ClientConfig::new(server)
        }
    }

    #[test]
    fn defaults() {
        let cfg = ClientConfig::new(ConnectionInfo::new("10.0.0.1".into(), 8002));
        assert_eq!(cfg.connect_timeout, Duration::from_secs(5));
        assert_eq!(cfg.reconnect_attempts, 5);
        assert_eq!(cfg.reconnect_delay, Duration::from_secs(2));
        assert_eq!(cfg.codec().max_payload(), Some(16 * 1024 * 1024));
    }

    #[tokio::test]
    async fn failed_attempt_leaves_client_disconnected() {
        let server = refused_endpoint().await;
        let mut client = ReconnectingClient::new(quick(server, 1), Arc::new(ZstdFrameDecoder::new()));
        assert!(client.connect().await.is_err());
        assert!(client.phase().is_disconnected());
        assert_eq!(client.total_attempts(), 1);
        assert_eq!(client.metrics().reconnections(), 0);
    }

    #[tokio::test]
    async fn retry_cycle_stops_at_limit() {
        let server = refused_endpoint().await;
        let mut client = ReconnectingClient::new(quick(server, 3), Arc::new(ZstdFrameDecoder::new()));
        match client.reconnect().await {
            Err(VidcastError::RetriesExhausted { attempts }) => assert_eq!(attempts, 3),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(client.total_attempts(), 3);
    }

    #[tokio::test]
    async fn first_connect_is_not_a_reconnection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = ConnectionInfo::from(listener.local_addr().unwrap());
        let mut client = ReconnectingClient::new(quick(server, 2), Arc::new(ZstdFrameDecoder::new()));

        client.connect().await.unwrap();
        assert!(client.phase().is_connected());
        assert_eq!(client.metrics().reconnections(), 0);

        client.connect().await.unwrap();
        assert_eq!(client.metrics().reconnections(), 1);

        client.drop_connection();
        assert!(client.phase().is_disconnected());
        assert_eq!(client.total_attempts(), 2);
    }

    #[tokio::test]
    async fn failed_attempt_after_link_loss_is_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = ConnectionInfo::from(listener.local_addr().unwrap());
        let mut client = ReconnectingClient::new(quick(server, 1), Arc::new(ZstdFrameDecoder::new()));

        client.connect().await.unwrap();
        drop(listener);
        client.drop_connection();
        assert!(client.connect().await.is_err());
        assert!(client.phase().is_disconnected());
        assert_eq!(client.metrics().reconnections(), 0);
    }

    #[tokio::test]
    async fn stop_interrupts_retry_delay() {
        let server = refused_endpoint().await;
        let mut cfg = quick(server, 5);
        cfg.reconnect_delay = Duration::from_secs(30);
        let mut client = ReconnectingClient::new(cfg, Arc::new(ZstdFrameDecoder::new()));
        let stop = client.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stop.store(false, Ordering::SeqCst);
        });

        let started = Instant::now();
        assert!(!client.reconnect().await.unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
