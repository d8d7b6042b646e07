//! cadenza-player specific configuration
//!
//! [`PlayerConfig`] is the validated, unit-converted view of the TOML model from
//! `cadenza_common::config`. The engine only ever sees this type.

use cadenza_common::config::{BackendKind, TomlConfig};
use cadenza_common::volume::percent_to_unit;
use std::time::Duration;

use crate::error::Result;

/// PT1 filter constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingConfig {
    /// Gain `k`
    pub gain: f64,
    /// Time constant `t` in seconds
    pub time_constant: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            gain: 1.0,
            time_constant: 0.02,
        }
    }
}

/// Playback engine configuration
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Per-stream ring buffer capacity in bytes
    pub ring_buffer_bytes: usize,
    /// Worker decodes while unread bytes are below this
    pub refill_threshold_bytes: usize,
    /// Bytes read from the ring buffer per output buffer
    pub chunk_bytes: usize,
    /// User latency correction in seconds (may be negative)
    pub output_latency: f64,
    /// Coarse periodic wake-up for idle decode workers
    pub worker_wake_interval: Duration,
    /// Bound for `close_all`
    pub close_all_timeout: Duration,
    /// Close finished, non-looping streams automatically
    pub auto_close_finished: bool,
    /// Initial global volume (0.0-1.0)
    pub global_volume: f32,
    pub smoothing: SmoothingConfig,
    pub backend: BackendKind,
    /// Queued buffers for push-style backends
    pub queue_buffers: usize,
    /// Output device name (None = default device)
    pub device: Option<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        // The TOML defaults are the single source of truth for default values
        Self::from_toml(&TomlConfig::default())
    }
}

impl PlayerConfig {
    /// Build from an already validated TOML model
    pub fn from_toml(toml: &TomlConfig) -> Self {
        let p = &toml.playback;
        Self {
            ring_buffer_bytes: p.ring_buffer_bytes,
            refill_threshold_bytes: p.refill_threshold_bytes,
            chunk_bytes: p.chunk_bytes,
            output_latency: p.output_latency_ms as f64 / 1000.0,
            worker_wake_interval: Duration::from_millis(p.worker_wake_interval_ms.max(1)),
            close_all_timeout: Duration::from_millis(p.close_all_timeout_ms),
            auto_close_finished: p.auto_close_finished,
            global_volume: percent_to_unit(p.global_volume_percent),
            smoothing: SmoothingConfig {
                gain: toml.smoothing.gain,
                time_constant: toml.smoothing.time_constant,
            },
            backend: toml.output.backend,
            queue_buffers: toml.output.queue_buffers,
            device: toml.output.device.clone(),
        }
    }

    /// Validate a TOML model and convert it
    pub fn try_from_toml(toml: &TomlConfig) -> Result<Self> {
        toml.validate()?;
        Ok(Self::from_toml(toml))
    }
}
