//! AudioStream facade
//!
//! Aggregates one decode worker, one ring buffer, one playback consumer (inside the
//! output sink) and an optional fade behind a per-stream control API. Every operation
//! on a closed stream is a no-op.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cadenza_common::{EventBus, PlaybackEvent, StreamState};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::audio::decoder::DecoderFactory;
use crate::audio::output::{AudioBackend, OutputSink};
use crate::audio::types::AudioEffect;
use crate::config::PlayerConfig;
use crate::error::{Error, Result};
use crate::playback::clock::Clock;
use crate::playback::consumer::PlaybackConsumer;
use crate::playback::decode_worker::DecodeWorker;
use crate::playback::fader::{AfterFadeAction, FadeController};
use crate::playback::shared::StreamShared;

/// Everything a stream needs from its engine
#[derive(Clone)]
pub struct StreamContext {
    pub config: Arc<PlayerConfig>,
    pub decoders: Arc<dyn DecoderFactory>,
    pub backend: Arc<dyn AudioBackend>,
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
    /// Worker threads report their stream id here when they exit
    pub closed_tx: UnboundedSender<i32>,
}

/// Load-time options
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    pub looping: bool,
    pub prescan: bool,
    pub effect: AudioEffect,
    /// Initial volume ceiling (global volume)
    pub volume_max: f32,
}

struct ActiveFade {
    controller: FadeController,
    started: Duration,
}

pub struct AudioStream {
    shared: Arc<StreamShared>,
    medium: String,
    sink: Box<dyn OutputSink>,
    worker: Option<JoinHandle<()>>,
    fade: Option<ActiveFade>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    closed: bool,
    finish_reported: bool,
    loops_reported: u64,
}

impl AudioStream {
    /// Open `medium`, start its decode worker and attach an output sink
    ///
    /// The stream starts paused.
    pub fn open(id: i32, medium: &str, options: OpenOptions, ctx: &StreamContext) -> Result<Self> {
        let mut decoder = ctx.decoders.open(medium)?;

        let format = decoder.format();
        if format.channels == 0 || format.sample_rate == 0 {
            decoder.close();
            return Err(Error::Decode(format!(
                "Unsupported format: {} channels at {} Hz",
                format.channels, format.sample_rate
            )));
        }

        if options.effect == AudioEffect::Karaoke {
            warn!("Stream {}: karaoke effect not supported, playing unprocessed", id);
        }

        let duration = decoder.duration().max(0.0);
        let config = &ctx.config;
        let shared = Arc::new(StreamShared::new(
            id,
            format,
            duration,
            options.looping,
            options.prescan,
            config.ring_buffer_bytes,
            config.smoothing,
            options.volume_max,
        )
        .with_refill_threshold(config.refill_threshold_bytes));

        let consumer = PlaybackConsumer::new(
            Arc::clone(&shared),
            Arc::clone(&ctx.clock),
            config.chunk_bytes,
        );
        let sink = match ctx.backend.open(format, consumer) {
            Ok(sink) => sink,
            Err(e) => {
                decoder.close();
                return Err(e);
            }
        };
        shared.data().output_latency = config.output_latency;

        let worker = DecodeWorker::new(
            Arc::clone(&shared),
            decoder,
            config.refill_threshold_bytes,
            config.worker_wake_interval,
            ctx.closed_tx.clone(),
            ctx.events.clone(),
        )
        .spawn()?;

        info!(
            "Stream {} opened: {} ({:.3}s, {} ch @ {} Hz, backend={}, sink={}, latency={:.3}s)",
            id,
            medium,
            duration,
            format.channels,
            format.sample_rate,
            ctx.backend.name(),
            sink.kind(),
            sink.latency_seconds()
        );

        Ok(Self {
            shared,
            medium: medium.to_string(),
            sink,
            worker: Some(worker),
            fade: None,
            clock: Arc::clone(&ctx.clock),
            events: ctx.events.clone(),
            closed: false,
            finish_reported: false,
            loops_reported: 0,
        })
    }

    pub fn id(&self) -> i32 {
        self.shared.id
    }

    pub fn medium(&self) -> &str {
        &self.medium
    }

    pub fn is_looping(&self) -> bool {
        self.shared.looping
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn play(&mut self) {
        if self.closed {
            return;
        }
        self.shared.set_paused(false);
        if let Err(e) = self.sink.play() {
            self.fail(e);
            return;
        }
        self.shared.wake();
        debug!("Stream {}: play", self.id());
        self.emit_state(StreamState::Playing);
    }

    /// Halt consumption, keeping buffered audio and position
    pub fn pause(&mut self) {
        if self.closed {
            return;
        }
        self.halt();
        debug!("Stream {}: pause", self.id());
        self.emit_state(StreamState::Paused);
    }

    /// Pause and rewind to the start, discarding buffered audio
    pub fn stop(&mut self) {
        if self.closed {
            return;
        }
        self.halt();
        self.fade = None;
        self.seek(0.0);
        debug!("Stream {}: stop", self.id());
        self.emit_state(StreamState::Stopped);
    }

    /// Silence the stream from the next tick and ask the worker to exit
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.fade = None;
        self.shared.terminate();
        if let Err(e) = self.sink.pause() {
            debug!("Stream {}: sink pause on close failed: {}", self.id(), e);
        }
        debug!("Stream {}: close requested", self.id());
    }

    /// Start a fade from the current volume, replacing any fade in flight
    pub fn fade(&mut self, target: f32, seconds: f64, action: AfterFadeAction) {
        if self.closed {
            return;
        }
        let controller = FadeController::start(self.shared.volume(), target, seconds, action);
        debug!(
            "Stream {}: fade to {:.2} over {:.2}s then {}",
            self.id(),
            target,
            controller.duration(),
            action
        );
        self.fade = Some(ActiveFade {
            controller,
            started: self.clock.now(),
        });
    }

    pub fn cancel_fade(&mut self) {
        self.fade = None;
    }

    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    /// Set the volume directly, cancelling any fade
    pub fn set_volume(&mut self, volume: f32) {
        if self.closed {
            return;
        }
        self.fade = None;
        self.shared.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume()
    }

    pub fn set_volume_max(&mut self, volume_max: f32) {
        if self.closed {
            return;
        }
        self.shared.set_volume_max(volume_max);
    }

    pub fn volume_max(&self) -> f32 {
        self.shared.volume_max()
    }

    pub fn set_position(&mut self, seconds: f64) {
        if self.closed {
            return;
        }
        let target = self.seek(seconds);
        self.events.emit_lossy(PlaybackEvent::StreamSeeked {
            stream_id: self.id(),
            position: target,
            timestamp: chrono::Utc::now(),
        });
    }

    pub fn position(&self) -> f64 {
        self.shared.data().position
    }

    pub fn length(&self) -> f64 {
        self.shared.duration
    }

    /// Bytes decoded but not yet consumed
    pub fn buffered_bytes(&self) -> usize {
        self.shared.data().buffer.unread()
    }

    pub fn is_playing(&self) -> bool {
        !self.closed && !self.shared.is_paused() && !self.shared.is_finished()
    }

    pub fn is_paused(&self) -> bool {
        !self.closed && self.shared.is_paused()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.is_finished()
    }

    /// Ticks the consumer found no audio ready while playing
    pub fn underruns(&self) -> u64 {
        self.shared.underruns()
    }

    /// Per-tick work: advance the fade, drive the sink, report completion
    pub fn update(&mut self) {
        if self.closed {
            return;
        }

        let now = self.clock.now();
        let step = self.fade.as_ref().map(|fade| {
            let elapsed = now.saturating_sub(fade.started).as_secs_f64();
            (fade.controller.sample(elapsed), fade.controller.action())
        });

        if let Some(((volume, done), action)) = step {
            self.shared.set_volume(volume);
            if done {
                self.fade = None;
                self.events.emit_lossy(PlaybackEvent::FadeCompleted {
                    stream_id: self.id(),
                    volume,
                    timestamp: chrono::Utc::now(),
                });
                debug!("Stream {}: fade finished, applying {}", self.id(), action);
                match action {
                    AfterFadeAction::None => {}
                    AfterFadeAction::Pause => self.pause(),
                    AfterFadeAction::Stop => self.stop(),
                    AfterFadeAction::Close => {
                        self.close();
                        return;
                    }
                }
            }
        }

        if let Err(e) = self.sink.update() {
            self.fail(e);
        }

        let loops = self.shared.loops();
        while self.loops_reported < loops {
            self.loops_reported += 1;
            debug!("Stream {}: looped to start", self.id());
            self.events.emit_lossy(PlaybackEvent::StreamLooped {
                stream_id: self.id(),
                timestamp: chrono::Utc::now(),
            });
        }

        if self.shared.is_finished() && !self.finish_reported {
            self.finish_reported = true;
            info!("Stream {} finished", self.id());
            self.events.emit_lossy(PlaybackEvent::StreamFinished {
                stream_id: self.id(),
                timestamp: chrono::Utc::now(),
            });
        }
    }

    fn halt(&mut self) {
        self.shared.set_paused(true);
        if let Err(e) = self.sink.pause() {
            self.fail(e);
        }
    }

    /// Reposition: clear buffered audio, force the position, hand the target to the worker
    fn seek(&mut self, seconds: f64) -> f64 {
        let mut target = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        if self.shared.duration > 0.0 {
            target = target.min(self.shared.duration);
        }

        let epoch = {
            let mut data = self.shared.data();
            data.epoch += 1;
            data.buffer.reset();
            data.filter.reset(target);
            data.position = target;
            data.timecode = target;
            data.skip_pending = true;
            data.loop_marks.clear();
            data.no_more_data = false;
            data.epoch
        };
        self.sink.flush();
        self.shared.set_finished(false);
        self.finish_reported = false;
        self.shared.request_skip(target, epoch);
        debug!("Stream {}: seek to {:.3}s", self.id(), target);
        target
    }

    /// Host backend failure: the stream is finished and left for cleanup
    fn fail(&mut self, e: Error) {
        error!("Stream {}: output failed: {}", self.id(), e);
        self.shared.set_finished(true);
        self.events.emit_lossy(PlaybackEvent::StreamError {
            stream_id: self.id(),
            message: e.to_string(),
            timestamp: chrono::Utc::now(),
        });
    }

    fn emit_state(&self, state: StreamState) {
        self.events.emit_lossy(PlaybackEvent::StreamStateChanged {
            stream_id: self.id(),
            state,
            timestamp: chrono::Utc::now(),
        });
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        self.shared.terminate();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Stream {}: decode worker panicked", self.shared.id);
            }
        }
    }
}
