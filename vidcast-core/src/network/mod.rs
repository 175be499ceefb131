//! Networking: envelope streams over TCP and local address discovery.

pub mod connection;
pub mod discovery;

pub use connection::{ConnectionInfo, DEFAULT_RECV_CHUNK, FrameStream, ReadOutcome};
pub use discovery::outbound_ip;
