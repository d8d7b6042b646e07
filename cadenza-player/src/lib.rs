//! # Cadenza Player Library (cadenza-player)
//!
//! Streaming playback engine: decodes media on one background thread per stream into a
//! ring buffer, drains it from a real-time output path with volume scaling and position
//! smoothing, and multiplexes many streams behind integer handles.
//!
//! **Architecture:** symphonia decoding, cpal (pull) or in-memory (push) output, and a
//! [`PlaybackEngine`] control surface driven by a host tick.

pub mod audio;
pub mod config;
pub mod error;
pub mod playback;

pub use audio::AudioEffect;
pub use config::PlayerConfig;
pub use error::{Error, Result};
pub use playback::{AfterFadeAction, PlaybackEngine, StreamHandle};
