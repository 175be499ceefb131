//! Seams to the external collaborators of the core.
//!
//! The core never touches a camera or an image codec directly: it drives
//! a [`FrameSource`] and hands frames to a [`FrameEncoder`] on the
//! producing side, and a [`FrameDecoder`] on the consuming side. Every
//! one of them may fail; failures are counted and the frame skipped.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::VidcastError;
use crate::stream::types::RawFrame;

/// Produces raw frames, e.g. from a camera device.
#[async_trait]
pub trait FrameSource: Send {
    async fn capture(&mut self) -> Result<RawFrame, VidcastError>;
}

/// Compresses a raw frame into an opaque payload.
///
/// `quality` ranges over 0..=100; how it is interpreted is up to the
/// encoder.
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, frame: &RawFrame, quality: u8) -> Result<Bytes, VidcastError>;
}

/// Reconstructs a raw frame from a payload produced by a [`FrameEncoder`].
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<RawFrame, VidcastError>;
}
