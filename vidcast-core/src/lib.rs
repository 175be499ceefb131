//! # vidcast-core
//!
//! Transport and session library for streaming live video frames from one
//! producer to many consumers over TCP.
//!
//! This crate contains:
//! - **Codec**: `EnvelopeCodec`, the `[u64 BE length][payload]` framing
//! - **Network**: `FrameStream` for envelope I/O, outbound address discovery
//! - **Stream**: frame types, bounded per-session buffers, metrics, the
//!   source/encoder/decoder seams and the capture loop
//! - **Session**: the server's session registry, per-client sessions and
//!   the accept loop
//! - **Client**: the reconnecting consumer
//! - **Monitor**: periodic and final statistics reports
//! - **Task**: `TaskPool` for tracking spawned role tasks
//! - **Error**: `VidcastError`, a `thiserror`-based error type

pub mod client;
pub mod codec;
pub mod error;
pub mod monitor;
pub mod network;
pub mod session;
pub mod stream;
pub mod task;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::{ClientConfig, ConnectionPhase, FrameWatch, ReconnectingClient};
pub use codec::{EnvelopeCodec, LENGTH_PREFIX_SIZE};
pub use error::VidcastError;
pub use monitor::{Monitor, StatsProvider};
pub use network::{ConnectionInfo, FrameStream, ReadOutcome, outbound_ip};
pub use session::{ServerConfig, ServerSummary, SessionId, SessionRegistry, StreamServer};
pub use stream::{
    CaptureConfig, CaptureService, Frame, FrameDecoder, FrameEncoder, FrameSource, Metrics,
    MetricsSnapshot, PixelFormat, RawFrame, StreamQuality, TestPatternSource, ZstdFrameDecoder,
    ZstdFrameEncoder,
};
pub use task::TaskPool;
