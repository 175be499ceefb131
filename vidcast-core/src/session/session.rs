//! One accepted client.
//!
//! ```text
//!  Accepted ──► Streaming ──► Closed
//!                   │           ▲
//!                   ▼           │
//!                 Error ────────┘
//! ```
//!
//! A session drains its private frame buffer onto its socket until the
//! socket fails, the session is asked to close, or the server stops.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::error::VidcastError;
use crate::network::FrameStream;
use crate::session::registry::{SessionHandle, SessionId, SessionRegistry};
use crate::stream::buffer::PopOutcome;
use crate::stream::metrics::{HIGH_LATENCY_THRESHOLD, MetricsSnapshot};
use crate::task::wait_for_stop;

/// How long a session waits on its buffer before re-checking its flags.
pub const DEFAULT_POP_TIMEOUT: Duration = Duration::from_secs(1);

// ── SessionState ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Accepted,
    Streaming,
    Error,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted => write!(f, "Accepted"),
            Self::Streaming => write!(f, "Streaming"),
            Self::Error => write!(f, "Error"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl SessionState {
    /// Valid from: `Accepted`.
    pub fn begin_streaming(&mut self) -> Result<(), VidcastError> {
        match self {
            Self::Accepted => {
                *self = Self::Streaming;
                Ok(())
            }
            _ => Err(VidcastError::InvalidState(
                "cannot stream: session not in Accepted state",
            )),
        }
    }

    /// Valid from: `Streaming`.
    pub fn fail(&mut self) -> Result<(), VidcastError> {
        match self {
            Self::Streaming => {
                *self = Self::Error;
                Ok(())
            }
            _ => Err(VidcastError::InvalidState(
                "cannot fail: session not in Streaming state",
            )),
        }
    }

    /// Always valid; closing twice is a no-op.
    pub fn close(&mut self) {
        *self = Self::Closed;
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

// ── SessionReport ────────────────────────────────────────────────

/// How a session ended.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub id: SessionId,
    /// `true` if the session passed through `Error`.
    pub failed: bool,
    pub metrics: MetricsSnapshot,
}

// ── Registration ─────────────────────────────────────────────────

/// Holds a session's registry slot; the slot is freed on drop even if
/// the session task unwinds.
struct Registration {
    id: SessionId,
    registry: Arc<SessionRegistry>,
    released: bool,
}

impl Registration {
    fn release(mut self) -> Option<MetricsSnapshot> {
        self.released = true;
        self.registry.unregister(self.id)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if !self.released {
            warn!("session {} ended abnormally, releasing its slot", self.id);
            self.registry.unregister(self.id);
        }
    }
}

// ── Session ──────────────────────────────────────────────────────

pub struct Session<S> {
    handle: SessionHandle,
    stream: FrameStream<S>,
    registration: Registration,
    state: SessionState,
    pop_timeout: Duration,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        handle: SessionHandle,
        stream: FrameStream<S>,
        registry: Arc<SessionRegistry>,
        pop_timeout: Duration,
    ) -> Self {
        let registration = Registration {
            id: handle.id,
            registry,
            released: false,
        };
        Self {
            handle,
            stream,
            registration,
            state: SessionState::Accepted,
            pop_timeout,
        }
    }

    pub fn id(&self) -> SessionId {
        self.handle.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Stream frames until the session ends, then unregister it.
    ///
    /// A session dropped without finishing `run` still unregisters.
    pub async fn run(mut self) -> SessionReport {
        let id = self.handle.id;
        let mut failed = false;

        if let Err(e) = self.state.begin_streaming() {
            warn!("session {id}: {e}");
        }
        debug!("session {id} -> {}", self.state);

        while self.state == SessionState::Streaming && self.handle.open.load(Ordering::SeqCst) {
            let frame = match self.handle.frames.pop(self.pop_timeout).await {
                PopOutcome::Frame(frame) => frame,
                PopOutcome::Empty => continue,
                PopOutcome::Closed => break,
            };

            let size = frame.len();
            let started = Instant::now();
            let sent = tokio::select! {
                r = self.stream.write_frame(frame.payload) => r,
                _ = wait_for_stop(&self.handle.open) => break,
            };

            match sent {
                Ok(()) => {
                    let latency = started.elapsed();
                    self.handle.metrics.record_transfer(size, latency);
                    if latency > HIGH_LATENCY_THRESHOLD {
                        warn!(
                            "high latency detected for {id}: {:.2}ms",
                            latency.as_secs_f64() * 1000.0
                        );
                    }
                }
                Err(e) => {
                    warn!("error sending to {id}: {e}");
                    self.handle.metrics.record_error();
                    failed = self.state.fail().is_ok();
                    debug!("session {id} -> {}", self.state);
                }
            }
        }

        self.state.close();
        drop(self.stream);

        let metrics = self
            .registration
            .release()
            .unwrap_or_else(|| self.handle.metrics.snapshot());

        info!("client disconnected: {id}");
        match serde_json::to_string_pretty(&metrics) {
            Ok(json) => info!("final stats: {json}"),
            Err(e) => debug!("could not serialise final stats for {id}: {e}"),
        }

        SessionReport {
            id,
            failed,
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::types::Frame;
    use bytes::Bytes;
    use std::net::SocketAddr;
    use tokio_test::io::Builder;

    fn sid() -> SessionId {
        SessionId(SocketAddr::from(([127, 0, 0, 1], 4000)))
    }

    #[test]
    fn state_transitions() {
        let mut s = SessionState::default();
        assert_eq!(s, SessionState::Accepted);
        assert!(s.fail().is_err());
        s.begin_streaming().unwrap();
        assert!(s.begin_streaming().is_err());
        s.fail().unwrap();
        assert_eq!(s, SessionState::Error);
        s.close();
        assert!(s.is_closed());
    }

    #[tokio::test]
    async fn write_failure_closes_and_unregisters() {
        let registry = Arc::new(SessionRegistry::new(2, 4, 30.0));
        let handle = registry.try_register(sid()).unwrap();
        let mock = Builder::new()
            .write_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "client went away",
            ))
            .build();

        registry.distribute(Frame::new(0, Instant::now(), Bytes::from_static(b"x")));
        let session = Session::new(
            handle,
            FrameStream::new(mock),
            Arc::clone(&registry),
            Duration::from_millis(50),
        );
        let report = session.run().await;

        assert!(report.failed);
        assert_eq!(report.metrics.errors, 1);
        assert_eq!(report.metrics.frames, 0);
        assert!(registry.is_empty());
        assert_eq!(registry.finished_snapshots().len(), 1);
    }

    #[tokio::test]
    async fn close_request_ends_idle_session() {
        let registry = Arc::new(SessionRegistry::new(2, 4, 30.0));
        let handle = registry.try_register(sid()).unwrap();
        let (client, server) = tokio::io::duplex(1024);
        let session = Session::new(
            handle,
            FrameStream::new(server),
            Arc::clone(&registry),
            Duration::from_millis(20),
        );

        let task = tokio::spawn(session.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry.close_all();

        let report = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("session did not stop")
            .unwrap();
        assert!(!report.failed);
        assert!(registry.is_empty());
        drop(client);
    }

    #[tokio::test]
    async fn panicking_session_task_frees_its_slot() {
        let registry = Arc::new(SessionRegistry::new(1, 4, 30.0));
        let handle = registry.try_register(sid()).unwrap();
        let (_client, server) = tokio::io::duplex(1024);
        let session = Session::new(
            handle,
            FrameStream::new(server),
            Arc::clone(&registry),
            Duration::from_millis(20),
        );

        fn blow_up<S>(_session: Session<S>) {
            panic!("session task blew up");
        }
        let task = tokio::spawn(async move { blow_up(session) });
        assert!(task.await.unwrap_err().is_panic());

        assert!(registry.is_empty());
        assert_eq!(registry.finished_snapshots().len(), 1);
        assert!(registry.try_register(sid()).is_some());
    }

    #[tokio::test]
    async fn streams_queued_frames() {
        let registry = Arc::new(SessionRegistry::new(2, 4, 30.0));
        let handle = registry.try_register(sid()).unwrap();
        let (client, server) = tokio::io::duplex(1 << 16);
        let session = Session::new(
            handle,
            FrameStream::new(server),
            Arc::clone(&registry),
            Duration::from_millis(20),
        );
        for seq in 0..3u8 {
            registry.distribute(Frame::new(
                seq as u64,
                Instant::now(),
                Bytes::from(vec![seq; 16]),
            ));
        }
        let task = tokio::spawn(session.run());

        let mut reader = FrameStream::new(client);
        for seq in 0..3u8 {
            match reader.read_frame().await.unwrap() {
                crate::network::ReadOutcome::Frame(p) => assert_eq!(&p[..], &[seq; 16][..]),
                other => panic!("unexpected {other:?}"),
            }
        }

        registry.close_all();
        let report = task.await.unwrap();
        assert_eq!(report.metrics.frames, 3);
        assert_eq!(report.metrics.bytes, 48);
    }
}
