//! Playback engine (stream registry)
//!
//! Owns every live [`AudioStream`] keyed by an integer handle. All control calls are
//! serialized by one lock and silently ignore unknown handles, so a UI thread can keep
//! using a handle after the stream closed itself. Opening a medium happens outside the
//! lock; only the id reservation and the insert hold it.
//!
//! Streams never remove themselves: a decode worker reports its id on a channel when it
//! exits, and [`PlaybackEngine::update`] drains that channel after the per-stream pass.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cadenza_common::config::BackendKind;
use cadenza_common::volume::{percent_to_unit, unit_to_percent};
use cadenza_common::{EventBus, PlaybackEvent};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

use crate::audio::cpal_backend::CpalBackend;
use crate::audio::decoder::{DecoderFactory, SymphoniaDecoderFactory};
use crate::audio::memory_backend::MemoryBackend;
use crate::audio::output::AudioBackend;
use crate::audio::types::AudioEffect;
use crate::config::PlayerConfig;
use crate::error::{Error, Result};
use crate::playback::clock::{Clock, SystemClock};
use crate::playback::fader::AfterFadeAction;
use crate::playback::stream::{AudioStream, OpenOptions, StreamContext};

const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Integer stream handle; never reused while the engine lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamHandle(i32);

impl StreamHandle {
    /// Returned by a failed load
    pub const INVALID: StreamHandle = StreamHandle(-1);

    pub fn from_raw(id: i32) -> Self {
        Self(id)
    }

    pub fn id(self) -> i32 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct EngineInner {
    initialized: bool,
    streams: BTreeMap<i32, AudioStream>,
    next_id: i32,
    /// 0.0-1.0
    global_volume: f32,
    closed_rx: UnboundedReceiver<i32>,
}

impl EngineInner {
    /// Remove streams whose workers reported exit
    fn take_closed(&mut self) -> Vec<AudioStream> {
        let mut removed = Vec::new();
        while let Ok(id) = self.closed_rx.try_recv() {
            if let Some(stream) = self.streams.remove(&id) {
                removed.push(stream);
            }
        }
        removed
    }
}

pub struct PlaybackEngine {
    inner: Mutex<EngineInner>,
    ctx: StreamContext,
}

impl PlaybackEngine {
    /// Engine decoding files with symphonia and timing with the system clock
    pub fn new(config: PlayerConfig, backend: Arc<dyn AudioBackend>) -> Self {
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let global_volume = config.global_volume;
        Self {
            inner: Mutex::new(EngineInner {
                initialized: false,
                streams: BTreeMap::new(),
                next_id: 0,
                global_volume,
                closed_rx,
            }),
            ctx: StreamContext {
                config: Arc::new(config),
                decoders: Arc::new(SymphoniaDecoderFactory),
                backend,
                clock: Arc::new(SystemClock::new()),
                events: EventBus::default(),
                closed_tx,
            },
        }
    }

    /// Engine with the backend named in `config`
    pub fn from_config(config: PlayerConfig) -> Self {
        let backend: Arc<dyn AudioBackend> = match config.backend {
            BackendKind::Cpal => Arc::new(CpalBackend::new(config.device.clone())),
            BackendKind::Memory => Arc::new(MemoryBackend::new(config.queue_buffers)),
        };
        Self::new(config, backend)
    }

    pub fn with_decoder_factory(mut self, decoders: Arc<dyn DecoderFactory>) -> Self {
        self.ctx.decoders = decoders;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.ctx.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.ctx.events = events;
        self
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.ctx.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.ctx.events.subscribe()
    }

    /// Make the engine accept loads; idempotent
    pub fn init(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.initialized {
            inner.initialized = true;
            info!("Playback engine initialized (backend={})", self.ctx.backend.name());
        }
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().initialized
    }

    /// Close every stream and stop accepting loads
    pub fn close(&self) {
        self.close_all();
        self.inner.lock().initialized = false;
        info!("Playback engine closed");
    }

    /// Open a medium; returns [`StreamHandle::INVALID`] on failure
    pub fn load(
        &self,
        medium: &str,
        looping: bool,
        prescan: bool,
        effect: AudioEffect,
    ) -> StreamHandle {
        match self.try_load(medium, looping, prescan, effect) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to load {}: {}", medium, e);
                StreamHandle::INVALID
            }
        }
    }

    pub fn try_load(
        &self,
        medium: &str,
        looping: bool,
        prescan: bool,
        effect: AudioEffect,
    ) -> Result<StreamHandle> {
        let (id, volume_max) = {
            let mut inner = self.inner.lock();
            if !inner.initialized {
                return Err(Error::InvalidState("Playback engine not initialized".to_string()));
            }
            let id = inner.next_id;
            inner.next_id += 1;
            (id, inner.global_volume)
        };

        let options = OpenOptions {
            looping,
            prescan,
            effect,
            volume_max,
        };
        let mut stream = AudioStream::open(id, medium, options, &self.ctx)?;
        let duration = stream.length();

        let rejected = {
            let mut inner = self.inner.lock();
            if inner.initialized {
                // Global volume may have changed while the medium was opening
                stream.set_volume_max(inner.global_volume);
                inner.streams.insert(id, stream);
                None
            } else {
                Some(stream)
            }
        };
        if let Some(mut stream) = rejected {
            stream.close();
            drop(stream);
            return Err(Error::InvalidState("Playback engine closed during load".to_string()));
        }

        self.ctx.events.emit_lossy(PlaybackEvent::StreamLoaded {
            stream_id: id,
            medium: medium.to_string(),
            duration,
            timestamp: chrono::Utc::now(),
        });
        Ok(StreamHandle(id))
    }

    fn with_stream<R>(&self, handle: StreamHandle, f: impl FnOnce(&mut AudioStream) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        inner.streams.get_mut(&handle.0).map(f)
    }

    pub fn play(&self, handle: StreamHandle) {
        self.with_stream(handle, AudioStream::play);
    }

    pub fn pause(&self, handle: StreamHandle) {
        self.with_stream(handle, AudioStream::pause);
    }

    pub fn stop(&self, handle: StreamHandle) {
        self.with_stream(handle, AudioStream::stop);
    }

    pub fn close_stream(&self, handle: StreamHandle) {
        self.with_stream(handle, AudioStream::close);
    }

    /// Fade to `target_percent` over `seconds`, then apply `action`
    pub fn fade(&self, handle: StreamHandle, target_percent: f32, seconds: f64, action: AfterFadeAction) {
        let target = percent_to_unit(target_percent);
        self.with_stream(handle, |s| s.fade(target, seconds, action));
    }

    pub fn cancel_fade(&self, handle: StreamHandle) {
        self.with_stream(handle, AudioStream::cancel_fade);
    }

    pub fn is_fading(&self, handle: StreamHandle) -> bool {
        self.with_stream(handle, |s| s.is_fading()).unwrap_or(false)
    }

    /// Set a stream's volume, cancelling its fade
    pub fn set_volume(&self, handle: StreamHandle, percent: f32) {
        let volume = percent_to_unit(percent);
        self.with_stream(handle, |s| s.set_volume(volume));
    }

    /// Stream volume in percent
    pub fn volume(&self, handle: StreamHandle) -> Option<f32> {
        self.with_stream(handle, |s| unit_to_percent(s.volume()))
    }

    pub fn set_position(&self, handle: StreamHandle, seconds: f64) {
        self.with_stream(handle, |s| s.set_position(seconds));
    }

    /// Apply a volume ceiling to every stream that is not fading
    pub fn set_global_volume(&self, percent: f32) {
        let volume = percent_to_unit(percent);
        let mut inner = self.inner.lock();
        inner.global_volume = volume;
        for stream in inner.streams.values_mut() {
            if !stream.is_fading() {
                stream.set_volume_max(volume);
            }
        }
        debug!("Global volume set to {:.0}%", unit_to_percent(volume));
    }

    /// Global volume in percent
    pub fn global_volume(&self) -> f32 {
        unit_to_percent(self.inner.lock().global_volume)
    }

    pub fn position(&self, handle: StreamHandle) -> Option<f64> {
        self.with_stream(handle, |s| s.position())
    }

    pub fn length(&self, handle: StreamHandle) -> Option<f64> {
        self.with_stream(handle, |s| s.length())
    }

    pub fn buffered_bytes(&self, handle: StreamHandle) -> Option<usize> {
        self.with_stream(handle, |s| s.buffered_bytes())
    }

    pub fn is_playing(&self, handle: StreamHandle) -> bool {
        self.with_stream(handle, |s| s.is_playing()).unwrap_or(false)
    }

    pub fn is_paused(&self, handle: StreamHandle) -> bool {
        self.with_stream(handle, |s| s.is_paused()).unwrap_or(false)
    }

    /// Unknown handles count as finished
    pub fn is_finished(&self, handle: StreamHandle) -> bool {
        self.with_stream(handle, |s| s.is_finished()).unwrap_or(true)
    }

    /// Ticks a stream's consumer found no audio ready while playing
    pub fn underruns(&self, handle: StreamHandle) -> Option<u64> {
        self.with_stream(handle, |s| s.underruns())
    }

    pub fn stream_count(&self) -> usize {
        self.inner.lock().streams.len()
    }

    /// Once per application tick: fades, sinks, completion, and removal of closed streams
    pub fn update(&self) {
        let auto_close = self.ctx.config.auto_close_finished;
        let removed = {
            let mut inner = self.inner.lock();
            for stream in inner.streams.values_mut() {
                stream.update();
                if auto_close && stream.is_finished() && !stream.is_looping() && !stream.is_closed() {
                    debug!("Auto-closing finished stream {}", stream.id());
                    stream.close();
                }
            }
            inner.take_closed()
        };
        self.release(removed);
    }

    /// Close every stream and wait (bounded) until all workers have exited
    pub fn close_all(&self) {
        {
            let mut inner = self.inner.lock();
            for stream in inner.streams.values_mut() {
                stream.close();
            }
        }

        let deadline = Instant::now() + self.ctx.config.close_all_timeout;
        loop {
            let (removed, remaining) = {
                let mut inner = self.inner.lock();
                let removed = inner.take_closed();
                (removed, inner.streams.len())
            };
            self.release(removed);

            if remaining == 0 {
                break;
            }
            if Instant::now() >= deadline {
                warn!(
                    "{} stream(s) still closing after {:?}, joining workers",
                    remaining, self.ctx.config.close_all_timeout
                );
                let leftover = std::mem::take(&mut self.inner.lock().streams);
                self.release(leftover.into_values().collect());
                break;
            }
            std::thread::sleep(CLOSE_POLL_INTERVAL);
        }
    }

    /// Drop streams outside the engine lock; dropping joins their worker threads
    fn release(&self, streams: Vec<AudioStream>) {
        for stream in streams {
            let id = stream.id();
            drop(stream);
            debug!("Stream {} removed", id);
            self.ctx.events.emit_lossy(PlaybackEvent::StreamClosed {
                stream_id: id,
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

