//! Playback event types and the broadcast EventBus
//!
//! Events describe per-stream lifecycle changes. They are informational: the engine never
//! waits on subscribers and a missing subscriber is not an error.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Stream playback state as reported in events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Playing,
    Paused,
    Stopped,
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamState::Playing => write!(f, "playing"),
            StreamState::Paused => write!(f, "paused"),
            StreamState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Playback event types
///
/// Serialized with an internal `type` tag so hosts can forward them as JSON lines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum PlaybackEvent {
    /// A medium was opened and registered under `stream_id`
    StreamLoaded {
        stream_id: i32,
        medium: String,
        /// Duration in seconds from decoder metadata
        duration: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Stream started, paused or stopped
    StreamStateChanged {
        stream_id: i32,
        state: StreamState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Explicit seek requested
    StreamSeeked {
        stream_id: i32,
        /// Seek target in seconds
        position: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Looping stream restarted from the beginning
    StreamLooped {
        stream_id: i32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A fade reached its target volume and its after-action was applied
    FadeCompleted {
        stream_id: i32,
        /// Target volume (0.0-1.0)
        volume: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// No more audio will be produced by this stream
    StreamFinished {
        stream_id: i32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Stream worker released its resources; the handle is now invalid
    StreamClosed {
        stream_id: i32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Decoder or output backend failure
    StreamError {
        stream_id: i32,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlaybackEvent {
    /// Stream the event refers to
    pub fn stream_id(&self) -> i32 {
        match self {
            PlaybackEvent::StreamLoaded { stream_id, .. }
            | PlaybackEvent::StreamStateChanged { stream_id, .. }
            | PlaybackEvent::StreamSeeked { stream_id, .. }
            | PlaybackEvent::StreamLooped { stream_id, .. }
            | PlaybackEvent::FadeCompleted { stream_id, .. }
            | PlaybackEvent::StreamFinished { stream_id, .. }
            | PlaybackEvent::StreamClosed { stream_id, .. }
            | PlaybackEvent::StreamError { stream_id, .. } => *stream_id,
        }
    }
}

/// Event distribution bus backed by `tokio::sync::broadcast`
///
/// - Non-blocking publish (slow subscribers lag instead of blocking the engine)
/// - Multiple concurrent subscribers
/// - Usable from plain threads; no runtime is needed to emit or `try_recv`
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlaybackEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlaybackEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
