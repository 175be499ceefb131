//! Configuration for the streaming server.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use vidcast_core::session::DEFAULT_POP_TIMEOUT;
use vidcast_core::{CaptureConfig, ServerConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub network: NetworkConfig,
    pub stream: StreamConfig,
    pub monitor: MonitorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP port viewers connect to.
    pub port: u16,
    /// Interface to bind, `0.0.0.0` for all.
    pub bind_address: String,
    /// Viewers beyond this many are refused.
    pub max_connections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Target frames per second.
    pub fps: u32,
    /// Encoder quality, 0-100.
    pub quality: u8,
    pub width: u32,
    pub height: u32,
    /// Frames each viewer may queue before new frames are dropped.
    pub buffer_frames: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between statistics reports.
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// "trace", "debug", "info", "warn" or "error"; `RUST_LOG` wins.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: 8002,
            bind_address: "0.0.0.0".into(),
            max_connections: 10,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            quality: 80,
            width: 640,
            height: 480,
            buffer_frames: 30,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ServerSettings {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_address: self.network.bind_address.clone(),
            port: self.network.port,
            max_sessions: self.network.max_connections.max(1),
            buffer_capacity: self.stream.buffer_frames.max(1),
            nominal_fps: f64::from(self.fps()),
            pop_timeout: DEFAULT_POP_TIMEOUT,
        }
    }

    pub fn to_capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            target_fps: self.fps(),
            quality: self.stream.quality.min(100),
        }
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_secs.max(1))
    }

    fn fps(&self) -> u32 {
        self.stream.fps.clamp(1, 120)
    }
}

// ── Tests ────────────────────────────────────────────────────────
