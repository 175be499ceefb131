//! Consumer-side connection handling.

pub mod phase;
pub mod reconnect;

pub use phase::ConnectionPhase;
pub use reconnect::{ClientConfig, FrameWatch, ReconnectingClient};
