//! Bounded frame buffer with a reject-newest overflow policy.
//!
//! Each session owns one buffer. The producer side never waits: when the
//! buffer is full the incoming frame is dropped and counted, and the
//! frames already queued keep their place.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::stream::types::Frame;

/// Outcome of [`FrameSender::try_push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// The buffer was full; the frame was dropped.
    Rejected,
    /// The consuming side is gone.
    Closed,
}

/// Outcome of [`FrameReceiver::pop`].
#[derive(Debug)]
pub enum PopOutcome {
    Frame(Frame),
    /// Nothing arrived within the timeout.
    Empty,
    /// The producing side is gone and the buffer is drained.
    Closed,
}

/// Create a buffer holding at most `capacity` frames (minimum 1).
pub fn frame_buffer(capacity: usize) -> (FrameSender, FrameReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let rejected = Arc::new(AtomicU64::new(0));
    (
        FrameSender {
            tx,
            capacity,
            rejected: Arc::clone(&rejected),
        },
        FrameReceiver {
            rx,
            capacity,
            rejected,
        },
    )
}

// ── FrameSender ──────────────────────────────────────────────────

/// Producer half of a frame buffer.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Frame>,
    capacity: usize,
    rejected: Arc<AtomicU64>,
}

impl FrameSender {
    /// Enqueue `frame` without waiting.
    pub fn try_push(&self, frame: Frame) -> PushOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => PushOutcome::Accepted,
            Err(TrySendError::Full(_)) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                PushOutcome::Rejected
            }
            Err(TrySendError::Closed(_)) => PushOutcome::Closed,
        }
    }

    /// Frames currently queued.
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames rejected because the buffer was full.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

// ── FrameReceiver ────────────────────────────────────────────────

/// Consumer half of a frame buffer.
#[derive(Debug)]
pub struct FrameReceiver {
    rx: mpsc::Receiver<Frame>,
    capacity: usize,
    rejected: Arc<AtomicU64>,
}

impl FrameReceiver {
    /// Wait up to `timeout` for the oldest queued frame.
    pub async fn pop(&mut self, timeout: Duration) -> PopOutcome {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(frame)) => PopOutcome::Frame(frame),
            Ok(None) => PopOutcome::Closed,
            Err(_) => PopOutcome::Empty,
        }
    }

    /// Take the oldest queued frame if there is one.
    pub fn try_pop(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Instant;

    fn frame(seq: u64) -> Frame {
        Frame::new(seq, Instant::now(), Bytes::from(seq.to_be_bytes().to_vec()))
    }

    #[tokio::test]
    async fn third_push_into_capacity_two_is_rejected() {
        let (tx, mut rx) = frame_buffer(2);
        assert_eq!(tx.try_push(frame(0)), PushOutcome::Accepted);
        assert_eq!(tx.try_push(frame(1)), PushOutcome::Accepted);
        assert_eq!(tx.try_push(frame(2)), PushOutcome::Rejected);
        assert_eq!(tx.rejected(), 1);
        assert_eq!(rx.rejected(), 1);
        assert_eq!(rx.len(), 2);

        let seqs: Vec<u64> = std::iter::from_fn(|| rx.try_pop()).map(|f| f.sequence).collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn length_never_exceeds_capacity() {
        let (tx, _rx) = frame_buffer(5);
        for seq in 0..50 {
            tx.try_push(frame(seq));
            assert!(tx.len() <= tx.capacity());
        }
        assert_eq!(tx.len(), 5);
        assert_eq!(tx.rejected(), 45);
    }

    #[tokio::test]
    async fn pop_times_out_as_empty() {
        let (_tx, mut rx) = frame_buffer(1);
        let started = Instant::now();
        assert!(matches!(
            rx.pop(Duration::from_millis(20)).await,
            PopOutcome::Empty
        ));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn pop_is_fifo() {
        let (tx, mut rx) = frame_buffer(4);
        for seq in 0..3 {
            tx.try_push(frame(seq));
        }
        for expected in 0..3 {
            match rx.pop(Duration::from_millis(10)).await {
                PopOutcome::Frame(f) => assert_eq!(f.sequence, expected),
                other => panic!("expected frame, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn dropped_sender_drains_then_closes() {
        let (tx, mut rx) = frame_buffer(2);
        tx.try_push(frame(7));
        drop(tx);
        assert!(matches!(
            rx.pop(Duration::from_millis(10)).await,
            PopOutcome::Frame(_)
        ));
        assert!(matches!(
            rx.pop(Duration::from_millis(10)).await,
            PopOutcome::Closed
        ));
    }

    #[test]
    fn push_after_receiver_dropped_is_closed() {
        let (tx, rx) = frame_buffer(2);
        drop(rx);
        assert_eq!(tx.try_push(frame(0)), PushOutcome::Closed);
        assert_eq!(tx.rejected(), 0);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (tx, _rx) = frame_buffer(0);
        assert_eq!(tx.capacity(), 1);
    }
}
