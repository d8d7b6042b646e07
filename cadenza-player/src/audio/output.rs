//! Audio output boundary
//!
//! An [`AudioBackend`] opens one [`OutputSink`] per stream and hands it the stream's
//! [`PlaybackConsumer`]. Pull-style sinks call the consumer from their own real-time
//! callback; push-style sinks pull chunks from it during [`OutputSink::update`].

use std::fmt;

use crate::audio::types::FormatInfo;
use crate::error::Result;
use crate::playback::consumer::PlaybackConsumer;

/// How a sink feeds the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Device callback requests frames
    Pull,
    /// Engine enqueues buffers each tick
    Push,
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkKind::Pull => write!(f, "pull"),
            SinkKind::Push => write!(f, "push"),
        }
    }
}

/// Output for a single stream
pub trait OutputSink: Send {
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    /// Called once per engine tick; errors mean the device is gone
    fn update(&mut self) -> Result<()>;

    /// Audio queued between the consumer and the speaker, in seconds
    fn latency_seconds(&self) -> f64;

    /// Drop audio handed to the device but not yet played
    fn flush(&mut self) {}

    fn kind(&self) -> SinkKind;
}

pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self, format: FormatInfo, consumer: PlaybackConsumer) -> Result<Box<dyn OutputSink>>;
}
