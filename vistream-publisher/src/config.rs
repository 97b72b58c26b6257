//! Configuration for the publisher service.

use std::path::Path;

use serde::{Deserialize, Serialize};
use vistream_core::{AddressConfig, PublisherConfig, SyntheticConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherToml {
    /// Stream identity and pacing.
    pub stream: StreamSection,
    /// Address convention shared with subscribers.
    pub transport: AddressConfig,
    /// Synthetic frame source.
    pub source: SourceSection,
    /// Logging settings.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    /// Stream name subscribers connect to.
    pub name: String,
    /// Target frames per second.
    pub fps: u32,
    /// Messages buffered per subscriber before old ones are dropped.
    pub send_queue: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    pub width: usize,
    pub height: usize,
    /// Rows of the point cloud.
    pub points: usize,
    /// Frames sent with the identity pose at startup.
    pub warmup_frames: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            name: "oakd".into(),
            fps: 30,
            send_queue: 2,
        }
    }
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            width: 640,
            height: 400,
            points: 256_000,
            warmup_frames: 30,
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

/// Highest frame rate the service accepts.
pub const MAX_FPS: u32 = 120;

impl PublisherToml {
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

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Endpoint settings, with out-of-range values clamped.
    pub fn to_publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            target_fps: self.stream.fps.clamp(1, MAX_FPS),
            send_queue: self.stream.send_queue.clamp(1, 64),
            address: self.transport.clone(),
            ..PublisherConfig::default()
        }
    }

    pub fn to_source_config(&self) -> SyntheticConfig {
        SyntheticConfig {
            height: self.source.height.max(1),
            width: self.source.width.max(1),
            points: self.source.points,
            warmup_frames: self.source.warmup_frames,
            limit: None,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
