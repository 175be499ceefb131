//! Viewer configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use vidcast_core::stream::metrics::DEFAULT_NOMINAL_FPS;
use vidcast_core::{ClientConfig, ConnectionInfo};

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub network: NetworkConfig,
    pub reconnect: ReconnectConfig,
    pub monitor: MonitorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Server host; empty means this machine's outbound address.
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    /// Reads idle for this long are logged and retried.
    pub read_timeout_ms: u64,
    /// Socket receive chunk size in bytes.
    pub recv_chunk_bytes: usize,
    /// Largest accepted frame in bytes; 0 disables the limit.
    pub max_frame_bytes: u64,
    /// Frame rate the server is expected to send, for drop estimation.
    pub expected_fps: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Attempts per reconnection cycle.
    pub attempts: u32,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    /// Received frames between progress lines; 0 disables them.
    pub stats_every_frames: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8002,
            connect_timeout_ms: 5000,
            read_timeout_ms: 5000,
            recv_chunk_bytes: 4096,
            max_frame_bytes: 16 * 1024 * 1024,
            expected_fps: DEFAULT_NOMINAL_FPS,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay_ms: 2000,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            stats_every_frames: 30,
        }
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

impl ClientSettings {
    /// Load from a TOML file, falling back to defaults.
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

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Runtime client settings for a server at `host`.
    pub fn to_client_config(&self, host: String) -> ClientConfig {
        let net = &self.network;
        ClientConfig {
            server: ConnectionInfo::new(host, net.port),
            connect_timeout: Duration::from_millis(net.connect_timeout_ms.max(1)),
            reconnect_attempts: self.reconnect.attempts.max(1),
            reconnect_delay: Duration::from_millis(self.reconnect.delay_ms),
            recv_chunk: net.recv_chunk_bytes.max(1),
            max_payload: (net.max_frame_bytes > 0).then_some(net.max_frame_bytes),
            read_timeout: Duration::from_millis(net.read_timeout_ms.max(1)),
            nominal_fps: if net.expected_fps > 0.0 {
                net.expected_fps
            } else {
                DEFAULT_NOMINAL_FPS
            },
            stats_every: self.monitor.stats_every_frames,
        }
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_secs.max(1))
    }
}

// ── Tests ────────────────────────────────────────────────────────
