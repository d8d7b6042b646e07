//! Streaming playback: ring buffer, decode workers, consumers, streams and the engine

pub mod clock;
pub mod consumer;
pub mod decode_worker;
pub mod engine;
pub mod fader;
pub mod position;
pub mod ring_buffer;
pub mod shared;
pub mod stream;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{PlaybackEngine, StreamHandle};
pub use fader::{AfterFadeAction, FadeController};
pub use ring_buffer::RingBuffer;
pub use stream::AudioStream;
