//! Framed TCP connections carrying length-prefixed frames.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::codec::EnvelopeCodec;
use crate::error::VidcastError;

/// Default read-buffer growth step, matching a 4 KiB socket receive chunk.
pub const DEFAULT_RECV_CHUNK: usize = 4 * 1024;

/// Result of reading one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete payload.
    Frame(Bytes),
    /// The peer closed the stream on an envelope boundary.
    Closed,
    /// The peer closed the stream part-way through an envelope.
    Incomplete { expected: u64, received: usize },
}

/// A byte stream carrying vidcast envelopes in both directions.
///
/// The stream has exactly one owner, so each `write_frame` lands on the
/// wire as one uninterrupted header + payload run.
#[derive(Debug)]
pub struct FrameStream<S> {
    framed: Framed<S, EnvelopeCodec>,
}

impl<S> FrameStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self::with_codec(stream, EnvelopeCodec::new(), DEFAULT_RECV_CHUNK)
    }

    /// Wrap `stream` with an explicit codec and read-buffer chunk size.
    pub fn with_codec(stream: S, codec: EnvelopeCodec, recv_chunk: usize) -> Self {
        Self {
            framed: Framed::with_capacity(stream, codec, recv_chunk.max(1)),
        }
    }

    /// Write one envelope and flush it.
    pub async fn write_frame(&mut self, payload: Bytes) -> Result<(), VidcastError> {
        self.framed.send(payload).await
    }

    /// Read the next envelope.
    ///
    /// Cancel-safe: dropping the future keeps any partially received bytes
    /// buffered for the next call.
    pub async fn read_frame(&mut self) -> Result<ReadOutcome, VidcastError> {
        match self.framed.next().await {
            Some(Ok(payload)) => Ok(ReadOutcome::Frame(payload)),
            Some(Err(VidcastError::Truncated { expected, received })) => {
                debug!("stream ended mid-envelope ({received}/{expected} bytes)");
                Ok(ReadOutcome::Incomplete { expected, received })
            }
            Some(Err(e)) => Err(e),
            None => Ok(ReadOutcome::Closed),
        }
    }
}

impl FrameStream<TcpStream> {
    /// Open a TCP connection within `timeout`.
    pub async fn connect(
        info: &ConnectionInfo,
        timeout: Duration,
        codec: EnvelopeCodec,
        recv_chunk: usize,
    ) -> Result<Self, VidcastError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(info.to_string()))
            .await
            .map_err(|_| VidcastError::Timeout(timeout))??;
        stream.set_nodelay(true)?;
        Ok(Self::with_codec(stream, codec, recv_chunk))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    ip: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(ip: String, port: u16) -> Self {
        Self { ip, port }
    }
}

impl std::fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl From<SocketAddr> for ConnectionInfo {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

// ── Tests ────────────────────────────────────────────────────────
