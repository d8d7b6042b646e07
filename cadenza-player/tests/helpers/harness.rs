//! Engine harness with a manual clock and the in-memory push backend
//!
//! Simulated ticks advance the clock and call `update()`, so fades, buffer
//! processing and position smoothing are deterministic. Only the decode workers run in
//! real time; tests wait for them explicitly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cadenza_player::audio::{DecoderFactory, MemoryBackend};
use cadenza_player::playback::ManualClock;
use cadenza_player::{PlaybackEngine, PlayerConfig, StreamHandle};

pub const TICK: Duration = Duration::from_millis(20);

pub struct TestEngine {
    pub engine: PlaybackEngine,
    pub clock: Arc<ManualClock>,
    pub backend: Arc<MemoryBackend>,
}

/// Defaults tuned for tests: fast worker wake-ups, short close timeout
pub fn test_config() -> PlayerConfig {
    PlayerConfig {
        worker_wake_interval: Duration::from_millis(5),
        close_all_timeout: Duration::from_secs(2),
        ..PlayerConfig::default()
    }
}

impl TestEngine {
    pub fn new(decoders: Arc<dyn DecoderFactory>) -> Self {
        Self::with_config(test_config(), decoders)
    }

    pub fn with_config(config: PlayerConfig, decoders: Arc<dyn DecoderFactory>) -> Self {
        let clock = Arc::new(ManualClock::new());
        let backend = Arc::new(MemoryBackend::new(config.queue_buffers));
        let engine = PlaybackEngine::new(config, backend.clone())
            .with_clock(clock.clone())
            .with_decoder_factory(decoders);
        engine.init();
        Self {
            engine,
            clock,
            backend,
        }
    }

    /// Advance the clock by one tick and run the engine update
    pub fn tick(&self) {
        self.clock.advance(TICK);
        self.engine.update();
    }

    /// Run simulated ticks covering `seconds`
    pub fn run_for(&self, seconds: f64) {
        let ticks = (seconds / TICK.as_secs_f64()).round() as usize;
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Block until the worker has buffered exactly `bytes` for `handle`
    pub fn wait_buffered(&self, handle: StreamHandle, bytes: usize) {
        let reached = wait_until(|| self.engine.buffered_bytes(handle) == Some(bytes));
        assert!(
            reached,
            "stream {} buffered {:?} bytes, expected {}",
            handle,
            self.engine.buffered_bytes(handle),
            bytes
        );
    }

    /// Block until the worker has buffered at least `bytes` for `handle`
    pub fn wait_buffered_at_least(&self, handle: StreamHandle, bytes: usize) {
        let reached = wait_until(|| self.engine.buffered_bytes(handle).is_some_and(|b| b >= bytes));
        assert!(
            reached,
            "stream {} buffered {:?} bytes, expected at least {}",
            handle,
            self.engine.buffered_bytes(handle),
            bytes
        );
    }
}

/// Poll `cond` in real time for up to five seconds
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(5) {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

/// Decode captured i16 LE bytes
pub fn samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}
