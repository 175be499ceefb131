//! Client connection lifecycle.
//!
//! ```text
//!  Disconnected ──► Connecting ──► Connected
//!       ▲               │              │
//!       └───────────────┴──────────────┘
//! ```

use std::time::{Duration, Instant};

use crate::error::VidcastError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected {
        since: Instant,
    },
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { .. } => write!(f, "Connected"),
        }
    }
}

impl ConnectionPhase {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Time spent in `Connected`, `None` in any other phase.
    pub fn connected_duration(&self) -> Option<Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), VidcastError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(VidcastError::InvalidState(
                "cannot connect: not in Disconnected state",
            )),
        }
    }

    /// Valid from: `Connecting`.
    pub fn complete_connect(&mut self) -> Result<(), VidcastError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(VidcastError::InvalidState(
                "cannot complete connect: not in Connecting state",
            )),
        }
    }

    /// Valid from: `Connecting` (attempt failed), `Connected` (link lost).
    pub fn disconnect(&mut self) -> Result<(), VidcastError> {
        match self {
            Self::Connecting | Self::Connected { .. } => {
                *self = Self::Disconnected;
                Ok(())
            }
            Self::Disconnected => Err(VidcastError::InvalidState(
                "cannot disconnect: already Disconnected",
            )),
        }
    }

    /// Force back to `Disconnected` from any phase.
    pub fn reset(&mut self) {
        *self = Self::Disconnected;
    }
}
