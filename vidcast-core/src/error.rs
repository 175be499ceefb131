//! Domain-specific error types for vidcast.
//!
//! All fallible operations return `Result<T, VidcastError>`.
//! Transient conditions (an empty buffer, a clean end-of-stream) are
//! modelled as outcomes, not errors.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for vidcast.
#[derive(Debug, Error)]
pub enum VidcastError {
    // ── Envelope Errors ──────────────────────────────────────────
    /// An envelope header announced a payload larger than the caller allows.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: u64, max: u64 },

    /// The peer closed the stream part-way through an envelope.
    #[error("stream ended mid-envelope: expected {expected} bytes, got {received}")]
    Truncated { expected: u64, received: usize },

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Every reconnection attempt failed.
    #[error("gave up after {attempts} connection attempts")]
    RetriesExhausted { attempts: u32 },

    /// A state-machine transition was requested from the wrong state.
    #[error("invalid state transition: {0}")]
    InvalidState(&'static str),

    // ── Codec Errors ─────────────────────────────────────────────
    /// The frame source produced no frame.
    #[error("capture failed: {0}")]
    Capture(String),

    /// Encoding a raw frame failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Decoding a received payload failed.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl VidcastError {
    /// Whether this error ends the connection it occurred on.
    pub fn is_connection_terminal(&self) -> bool {
        matches!(
            self,
            VidcastError::Connection(_)
                | VidcastError::ChannelClosed
                | VidcastError::Truncated { .. }
                | VidcastError::PayloadTooLarge { .. }
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for VidcastError {
    fn from(s: String) -> Self {
        VidcastError::Other(s)
    }
}

impl From<&str> for VidcastError {
    fn from(s: &str) -> Self {
        VidcastError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for VidcastError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        VidcastError::ChannelClosed
    }
}
