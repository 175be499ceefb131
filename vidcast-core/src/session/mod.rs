//! Server-side session management.
//!
//! | Module | Purpose |
//! |---|---|
//! | [`registry`] | Live session table, concurrency ceiling, fan-out |
//! | [`session`] | One client: drain its buffer onto its socket |
//! | [`server`] | Accept loop spawning sessions |

pub mod registry;
#[allow(clippy::module_inception)]
pub mod session;
pub mod server;

pub use registry::{Distribution, ServerSummary, SessionHandle, SessionId, SessionRegistry};
pub use server::{ServerConfig, StreamServer};
pub use session::{DEFAULT_POP_TIMEOUT, Session, SessionReport, SessionState};
