//! Frames, their buffering and their statistics.
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | `RawFrame`, encoded `Frame`, pixel formats |
//! | [`buffer`] | Bounded per-session buffer, reject-newest on overflow |
//! | [`metrics`] | FPS / latency / drop / throughput tracking |
//! | [`pipeline`] | `FrameSource`, `FrameEncoder`, `FrameDecoder` seams |
//! | [`source`] | Synthetic test-pattern source |
//! | [`encoder`] | Zstd payload encoder |
//! | [`decoder`] | Zstd payload decoder |
//! | [`capture`] | Paced capture → encode → distribute loop |

pub mod buffer;
pub mod capture;
pub mod decoder;
pub mod encoder;
pub mod metrics;
pub mod pipeline;
pub mod source;
pub mod types;

pub use buffer::{FrameReceiver, FrameSender, PopOutcome, PushOutcome, frame_buffer};
pub use capture::{CaptureConfig, CaptureService};
pub use decoder::ZstdFrameDecoder;
pub use encoder::ZstdFrameEncoder;
pub use metrics::{Metrics, MetricsSnapshot, StreamQuality};
pub use pipeline::{FrameDecoder, FrameEncoder, FrameSource};
pub use source::TestPatternSource;
pub use types::{Frame, PixelFormat, RawFrame};
