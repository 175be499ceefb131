//! The server's table of live sessions.
//!
//! The registry is the only place that knows about more than one
//! session. It enforces the concurrency ceiling, fans every produced
//! frame out to each session's private buffer, and keeps the final
//! statistics of sessions that have ended.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::debug;

use crate::stream::buffer::{FrameReceiver, FrameSender, PushOutcome, frame_buffer};
use crate::stream::metrics::{Metrics, MetricsSnapshot};
use crate::stream::types::Frame;

// ── SessionId ────────────────────────────────────────────────────

/// Sessions are identified by the client's `address:port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub SocketAddr);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── SessionHandle ────────────────────────────────────────────────

/// Everything a session task needs from the registry.
#[derive(Debug)]
pub struct SessionHandle {
    pub id: SessionId,
    pub frames: FrameReceiver,
    pub metrics: Arc<Metrics>,
    /// Cleared when the session is asked to close.
    pub open: Arc<AtomicBool>,
}

struct SessionEntry {
    sender: FrameSender,
    metrics: Arc<Metrics>,
    open: Arc<AtomicBool>,
}

#[derive(Default)]
struct RegistryState {
    live: HashMap<SessionId, SessionEntry>,
    finished: Vec<MetricsSnapshot>,
}

/// Outcome of one fan-out step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Distribution {
    pub delivered: usize,
    pub rejected: usize,
}

// ── SessionRegistry ──────────────────────────────────────────────

pub struct SessionRegistry {
    max_sessions: usize,
    buffer_capacity: usize,
    nominal_fps: f64,
    /// Producer-side statistics for the whole process.
    metrics: Arc<Metrics>,
    state: Mutex<RegistryState>,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize, buffer_capacity: usize, nominal_fps: f64) -> Self {
        Self {
            max_sessions,
            buffer_capacity,
            nominal_fps,
            metrics: Arc::new(Metrics::with_nominal_fps("server", nominal_fps)),
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Register a new session unless the ceiling has been reached.
    ///
    /// The check and the insert happen under one lock, so concurrent
    /// accepts can never overshoot `max_sessions`.
    pub fn try_register(&self, id: SessionId) -> Option<SessionHandle> {
        let mut state = self.lock();
        if state.live.len() >= self.max_sessions || state.live.contains_key(&id) {
            return None;
        }

        let (sender, frames) = frame_buffer(self.buffer_capacity);
        let metrics = Arc::new(Metrics::with_nominal_fps(id.to_string(), self.nominal_fps));
        let open = Arc::new(AtomicBool::new(true));

        state.live.insert(
            id,
            SessionEntry {
                sender,
                metrics: Arc::clone(&metrics),
                open: Arc::clone(&open),
            },
        );

        Some(SessionHandle {
            id,
            frames,
            metrics,
            open,
        })
    }

    /// Remove a session, retaining and returning its final statistics.
    pub fn unregister(&self, id: SessionId) -> Option<MetricsSnapshot> {
        let mut state = self.lock();
        let entry = state.live.remove(&id)?;
        entry.open.store(false, Ordering::SeqCst);
        let snapshot = entry.metrics.snapshot();
        state.finished.push(snapshot.clone());
        Some(snapshot)
    }

    /// Offer `frame` to every live session's buffer.
    pub fn distribute(&self, frame: Frame) -> Distribution {
        let state = self.lock();
        let mut result = Distribution::default();
        for (id, entry) in &state.live {
            match entry.sender.try_push(frame.clone()) {
                PushOutcome::Accepted => result.delivered += 1,
                PushOutcome::Rejected => {
                    debug!("buffer full for {id}, dropping frame {}", frame.sequence);
                    entry.metrics.record_overflow_drop(1);
                    self.metrics.record_overflow_drop(1);
                    result.rejected += 1;
                }
                PushOutcome::Closed => {}
            }
        }
        result
    }

    /// Ask every live session to close.
    pub fn close_all(&self) {
        for entry in self.lock().live.values() {
            entry.open.store(false, Ordering::SeqCst);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().live.is_empty()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Statistics for every live session, ordered by id.
    pub fn live_snapshots(&self) -> Vec<MetricsSnapshot> {
        let state = self.lock();
        let mut entries: Vec<_> = state.live.iter().collect();
        entries.sort_by_key(|(id, _)| **id);
        entries.iter().map(|(_, e)| e.metrics.snapshot()).collect()
    }

    /// Final statistics of sessions that have ended.
    pub fn finished_snapshots(&self) -> Vec<MetricsSnapshot> {
        self.lock().finished.clone()
    }

    /// Totals over every session the server has served so far.
    pub fn summary(&self) -> ServerSummary {
        let mut clients = self.finished_snapshots();
        clients.extend(self.live_snapshots());
        ServerSummary {
            clients_served: clients.len(),
            total_frames: clients.iter().map(|c| c.frames).sum(),
            total_bytes: clients.iter().map(|c| c.bytes).sum(),
            producer: self.metrics.snapshot(),
            clients,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Aggregate statistics reported when the server stops.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSummary {
    pub clients_served: usize,
    pub total_frames: u64,
    pub total_bytes: u64,
    pub producer: MetricsSnapshot,
    pub clients: Vec<MetricsSnapshot>,
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::{Duration, Instant};

    fn id(port: u16) -> SessionId {
        SessionId(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    fn frame(seq: u64) -> Frame {
        Frame::new(seq, Instant::now(), Bytes::from_static(b"payload"))
    }

    #[test]
    fn ceiling_is_enforced() {
        let reg = SessionRegistry::new(2, 4, 30.0);
        let _a = reg.try_register(id(1)).unwrap();
        let _b = reg.try_register(id(2)).unwrap();
        assert!(reg.try_register(id(3)).is_none());
        assert_eq!(reg.len(), 2);

        reg.unregister(id(1));
        assert!(reg.try_register(id(3)).is_some());
    }

    #[test]
    fn duplicate_id_rejected() {
        let reg = SessionRegistry::new(4, 4, 30.0);
        let _a = reg.try_register(id(1)).unwrap();
        assert!(reg.try_register(id(1)).is_none());
    }

    #[tokio::test]
    async fn every_session_gets_every_frame() {
        let reg = SessionRegistry::new(4, 8, 30.0);
        let mut a = reg.try_register(id(1)).unwrap();
        let mut b = reg.try_register(id(2)).unwrap();

        for seq in 0..3 {
            assert_eq!(reg.distribute(frame(seq)).delivered, 2);
        }
        for handle in [&mut a, &mut b] {
            let seqs: Vec<u64> = std::iter::from_fn(|| handle.frames.try_pop())
                .map(|f| f.sequence)
                .collect();
            assert_eq!(seqs, vec![0, 1, 2]);
        }
    }

    #[test]
    fn slow_session_overflows_alone() {
        let reg = SessionRegistry::new(4, 2, 30.0);
        let slow = reg.try_register(id(1)).unwrap();
        let mut fast = reg.try_register(id(2)).unwrap();

        for seq in 0..5 {
            reg.distribute(frame(seq));
            // The fast session drains as it goes.
            while fast.frames.try_pop().is_some() {}
        }

        assert_eq!(slow.frames.len(), 2);
        assert_eq!(slow.frames.rejected(), 3);
        assert_eq!(slow.metrics.snapshot().dropped_overflow, 3);
        assert_eq!(fast.metrics.snapshot().dropped_overflow, 0);
        assert_eq!(reg.metrics().snapshot().dropped_overflow, 3);
    }

    #[test]
    fn unregister_retains_final_stats() {
        let reg = SessionRegistry::new(4, 2, 30.0);
        let handle = reg.try_register(id(9)).unwrap();
        handle.metrics.record_transfer(100, Duration::from_millis(1));

        let snap = reg.unregister(id(9)).unwrap();
        assert_eq!(snap.frames, 1);
        assert!(!handle.open.load(Ordering::SeqCst));
        assert!(reg.is_empty());

        let summary = reg.summary();
        assert_eq!(summary.clients_served, 1);
        assert_eq!(summary.total_frames, 1);
        assert_eq!(summary.total_bytes, 100);
        assert!(reg.unregister(id(9)).is_none());
    }

    #[test]
    fn close_all_clears_open_flags() {
        let reg = SessionRegistry::new(4, 2, 30.0);
        let a = reg.try_register(id(1)).unwrap();
        let b = reg.try_register(id(2)).unwrap();
        reg.close_all();
        assert!(!a.open.load(Ordering::SeqCst));
        assert!(!b.open.load(Ordering::SeqCst));
    }
}
