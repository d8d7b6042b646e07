//! Configuration loading and config file resolution
//!
//! Every setting has a built-in default, so a missing file or a partial file is fine.
//! Resolution order for the file itself:
//! 1. Explicit path (command-line argument)
//! 2. Environment variable (`CADENZA_CONFIG`)
//! 3. `<config_dir>/cadenza/config.toml`
//! 4. Built-in defaults (no file)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CADENZA_CONFIG";

/// Output latency correction bounds in milliseconds
pub const MIN_OUTPUT_LATENCY_MS: i32 = -500;
pub const MAX_OUTPUT_LATENCY_MS: i32 = 500;

/// Highest refill threshold as a share of ring buffer capacity
pub const MAX_REFILL_PERCENT: usize = 80;

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub playback: PlaybackSection,
    pub smoothing: SmoothingSection,
    pub output: OutputSection,
    pub logging: LoggingSection,
}

/// Ring buffer, refill and lifecycle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSection {
    /// Per-stream ring buffer capacity in bytes
    pub ring_buffer_bytes: usize,

    /// Worker keeps decoding while fewer than this many bytes are unread
    pub refill_threshold_bytes: usize,

    /// Bytes the consumer reads per tick (one output buffer)
    pub chunk_bytes: usize,

    /// User latency correction added to the backend's own latency
    pub output_latency_ms: i32,

    /// Coarse periodic timeout for the decode worker's wait
    pub worker_wake_interval_ms: u64,

    /// Upper bound for `close_all` to wait for workers to drain
    pub close_all_timeout_ms: u64,

    /// Close non-looping streams automatically once they finish
    pub auto_close_finished: bool,

    /// Global volume applied to new and idle streams (0-100)
    pub global_volume_percent: f32,
}

impl Default for PlaybackSection {
    fn default() -> Self {
        Self {
            ring_buffer_bytes: 1_000_000,
            refill_threshold_bytes: 800_000,
            chunk_bytes: 2048,
            output_latency_ms: 0,
            worker_wake_interval_ms: 50,
            close_all_timeout_ms: 2000,
            auto_close_finished: false,
            global_volume_percent: 100.0,
        }
    }
}

/// PT1 position filter constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingSection {
    /// Filter gain `k`
    pub gain: f64,

    /// Filter time constant `t` in seconds
    pub time_constant: f64,
}

impl Default for SmoothingSection {
    fn default() -> Self {
        Self {
            gain: 1.0,
            time_constant: 0.02,
        }
    }
}

/// Output backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Pull-style hardware callback (cpal)
    #[default]
    Cpal,
    /// Push-style queued buffers held in memory
    Memory,
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cpal" => Ok(BackendKind::Cpal),
            "memory" => Ok(BackendKind::Memory),
            other => Err(Error::InvalidInput(format!("Unknown backend '{}'", other))),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Cpal => write!(f, "cpal"),
            BackendKind::Memory => write!(f, "memory"),
        }
    }
}

/// Output device settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub backend: BackendKind,

    /// Number of queued buffers for push-style backends
    pub queue_buffers: usize,

    /// Output device name (None = default device)
    pub device: Option<String>,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            queue_buffers: 5,
            device: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve the config file (see module docs) and load it, or fall back to defaults
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path) {
            Some(path) => Self::load(&path),
            None => {
                debug!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Check cross-field constraints
    ///
    /// The ring buffer silently drops the oldest bytes when overfilled, so the refill
    /// threshold must leave at least a fifth of the capacity free for decoded chunks.
    pub fn validate(&self) -> Result<()> {
        let p = &self.playback;
        if p.ring_buffer_bytes == 0 {
            return Err(Error::Config("ring_buffer_bytes must be > 0".to_string()));
        }
        if p.refill_threshold_bytes >= p.ring_buffer_bytes
            || p.refill_threshold_bytes.saturating_mul(100)
                > p.ring_buffer_bytes.saturating_mul(MAX_REFILL_PERCENT)
        {
            return Err(Error::Config(format!(
                "refill_threshold_bytes ({}) must be at most {}% of ring_buffer_bytes ({})",
                p.refill_threshold_bytes, MAX_REFILL_PERCENT, p.ring_buffer_bytes
            )));
        }
        if p.chunk_bytes == 0 || p.chunk_bytes % 2 != 0 {
            return Err(Error::Config(format!(
                "chunk_bytes must be a positive even number, got {}",
                p.chunk_bytes
            )));
        }
        if !(MIN_OUTPUT_LATENCY_MS..=MAX_OUTPUT_LATENCY_MS).contains(&p.output_latency_ms) {
            return Err(Error::Config(format!(
                "output_latency_ms must be within {}..={}, got {}",
                MIN_OUTPUT_LATENCY_MS, MAX_OUTPUT_LATENCY_MS, p.output_latency_ms
            )));
        }
        if !self.smoothing.time_constant.is_finite() || self.smoothing.time_constant < 0.0 {
            return Err(Error::Config(format!(
                "smoothing.time_constant must be >= 0, got {}",
                self.smoothing.time_constant
            )));
        }
        if !self.smoothing.gain.is_finite() {
            return Err(Error::Config("smoothing.gain must be finite".to_string()));
        }
        if self.output.queue_buffers == 0 {
            return Err(Error::Config("output.queue_buffers must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Find the config file to use, if any
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path().filter(|path| path.exists())
}

/// `<config_dir>/cadenza/config.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cadenza").join("config.toml"))
}
