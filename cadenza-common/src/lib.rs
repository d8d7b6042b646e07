//! # Cadenza Common Library
//!
//! Shared code for the Cadenza playback engine and its host applications:
//! - Common error type
//! - TOML configuration model and file resolution
//! - Playback event types and the broadcast EventBus
//! - Volume unit conversions

pub mod config;
pub mod error;
pub mod events;
pub mod volume;

pub use error::{Error, Result};
pub use events::{EventBus, PlaybackEvent, StreamState};
