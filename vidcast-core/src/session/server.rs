//! Accept loop for the streaming server.
//!
//! [`StreamServer`] owns the listening socket and spawns one [`Session`]
//! task per accepted client. Frames reach those sessions through the
//! shared [`SessionRegistry`], which the capture side feeds.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::VidcastError;
use crate::network::FrameStream;
use crate::session::registry::{ServerSummary, SessionId, SessionRegistry};
use crate::session::session::{DEFAULT_POP_TIMEOUT, Session};
use crate::stream::metrics::DEFAULT_NOMINAL_FPS;
use crate::task::{TaskPool, wait_for_stop};

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How long shutdown waits for sessions to finish on their own.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

// ── ServerConfig ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Concurrency ceiling; further clients are refused.
    pub max_sessions: usize,
    /// Frames each session may queue before new ones are dropped.
    pub buffer_capacity: usize,
    /// Expected frame rate, used for drop estimation.
    pub nominal_fps: f64,
    pub pop_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8002,
            max_sessions: 10,
            buffer_capacity: 30,
            nominal_fps: DEFAULT_NOMINAL_FPS,
            pop_timeout: DEFAULT_POP_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn socket_string(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

// ── StreamServer ─────────────────────────────────────────────────

pub struct StreamServer {
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
    running: Arc<AtomicBool>,
    pop_timeout: Duration,
}

impl StreamServer {
    /// Bind the listening socket. The server runs until `running` clears.
    pub async fn bind(config: &ServerConfig, running: Arc<AtomicBool>) -> Result<Self, VidcastError> {
        let listener = TcpListener::bind(config.socket_string()).await?;
        let registry = Arc::new(SessionRegistry::new(
            config.max_sessions,
            config.buffer_capacity,
            config.nominal_fps,
        ));
        Ok(Self {
            listener,
            registry,
            running,
            pop_timeout: config.pop_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, VidcastError> {
        Ok(self.listener.local_addr()?)
    }

    /// The registry the capture side distributes frames into.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Accept clients until stopped, then close every session and
    /// return the aggregate statistics.
    pub async fn run(self) -> Result<ServerSummary, VidcastError> {
        let mut sessions = TaskPool::new();
        info!("streaming server listening on {}", self.local_addr()?);

        while self.running.load(Ordering::SeqCst) {
            let accepted = tokio::select! {
                r = self.listener.accept() => r,
                _ = wait_for_stop(&self.running) => break,
            };
            sessions.reap();

            match accepted {
                Ok((stream, addr)) => self.admit(&mut sessions, stream, addr),
                Err(e) => {
                    warn!("accept failed: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }

        info!("shutting down, closing {} session(s)", self.registry.len());
        self.registry.close_all();
        sessions.join_all(SHUTDOWN_GRACE).await;
        Ok(self.registry.summary())
    }

    fn admit(&self, sessions: &mut TaskPool, stream: TcpStream, addr: SocketAddr) {
        let id = SessionId(addr);
        let Some(handle) = self.registry.try_register(id) else {
            warn!(
                "refusing {id}: {} of {} sessions in use",
                self.registry.len(),
                self.registry.max_sessions()
            );
            drop(stream);
            return;
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed for {id}: {e}");
        }
        info!("client connected: {id}");

        let session = Session::new(
            handle,
            FrameStream::new(stream),
            Arc::clone(&self.registry),
            self.pop_timeout,
        );
        sessions.spawn(format!("session {id}"), async move {
            let report = session.run().await;
            debug!(
                "session {} ended (failed: {}, frames: {})",
                report.id, report.failed, report.metrics.frames
            );
        });
    }
}
