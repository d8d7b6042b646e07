//! Playback consumer
//!
//! Runs once per output tick, either inside a backend's real-time callback (pull) or
//! from the engine's update pass (push). It drains the ring buffer, applies the
//! stream gain, advances the smoothed position and detects completion.
//!
//! The pull path never blocks or allocates: if the data lock is contended it outputs
//! silence for that tick.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::audio::types::{scale_pcm_i16, FormatInfo};
use crate::playback::clock::Clock;
use crate::playback::shared::{DataState, StreamShared};

pub struct PlaybackConsumer {
    shared: Arc<StreamShared>,
    clock: Arc<dyn Clock>,
    chunk_bytes: usize,
    last_tick: Duration,
    scratch: Vec<u8>,
}

impl PlaybackConsumer {
    pub fn new(shared: Arc<StreamShared>, clock: Arc<dyn Clock>, chunk_bytes: usize) -> Self {
        let last_tick = clock.now();
        let scratch = vec![0; chunk_bytes.max(shared.format.frame_bytes())];
        Self {
            shared,
            clock,
            chunk_bytes,
            last_tick,
            scratch,
        }
    }

    pub fn stream_id(&self) -> i32 {
        self.shared.id
    }

    pub fn format(&self) -> FormatInfo {
        self.shared.format
    }

    /// Bytes a push-style sink should request per buffer
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn shared(&self) -> &Arc<StreamShared> {
        &self.shared
    }

    pub fn underruns(&self) -> u64 {
        self.shared.underruns()
    }

    /// Record the device latency the sink currently reports
    pub fn set_sink_latency(&self, seconds: f64) {
        self.shared.set_sink_latency(seconds);
    }

    /// Fill `dest` from the real-time path without blocking
    ///
    /// Anything not covered by audio is silence. Returns the number of audio bytes.
    pub fn render(&mut self, dest: &mut [u8]) -> usize {
        dest.fill(0);
        if self.is_silenced() {
            return 0;
        }
        let Some(mut data) = self.shared.try_data() else {
            return 0;
        };
        let now = self.clock.now();
        Self::consume(&self.shared, &mut data, dest, now, &mut self.last_tick)
    }

    /// Read one chunk for a push-style sink, waiting for the data lock
    ///
    /// Returns the audio bytes in an internal buffer; empty when nothing is ready.
    pub fn next_chunk(&mut self) -> &[u8] {
        if self.is_silenced() {
            return &[];
        }
        let len = self.chunk_bytes.min(self.scratch.len());
        let now = self.clock.now();
        let mut data = self.shared.data();
        let n = Self::consume(
            &self.shared,
            &mut data,
            &mut self.scratch[..len],
            now,
            &mut self.last_tick,
        );
        drop(data);
        &self.scratch[..n]
    }

    /// Render into i16 samples (cpal i16 devices)
    pub fn render_i16(&mut self, out: &mut [i16]) {
        self.render_samples(out, |s| s);
    }

    /// Render into f32 samples (cpal f32 devices)
    pub fn render_f32(&mut self, out: &mut [f32]) {
        self.render_samples(out, |s| s as f32 / 32768.0);
    }

    /// Render into u16 samples (cpal u16 devices)
    pub fn render_u16(&mut self, out: &mut [u16]) {
        self.render_samples(out, |s| (s as i32 + 32768) as u16);
    }

    /// Render through the fixed scratch buffer in whole-frame pieces
    fn render_samples<T>(&mut self, out: &mut [T], convert: impl Fn(i16) -> T) {
        let channels = self.shared.format.channels.max(1) as usize;
        let piece = (self.scratch.len() / 2 / channels).max(1) * channels;
        let mut scratch = std::mem::take(&mut self.scratch);
        for samples in out.chunks_mut(piece) {
            let bytes = &mut scratch[..samples.len() * 2];
            self.render(bytes);
            for (sample, raw) in samples.iter_mut().zip(bytes.chunks_exact(2)) {
                *sample = convert(i16::from_le_bytes([raw[0], raw[1]]));
            }
        }
        self.scratch = scratch;
    }

    fn is_silenced(&self) -> bool {
        self.shared.is_terminated() || self.shared.is_paused()
    }

    fn consume(
        shared: &StreamShared,
        data: &mut DataState,
        dest: &mut [u8],
        now: Duration,
        last_tick: &mut Duration,
    ) -> usize {
        let dt = now.saturating_sub(*last_tick).as_secs_f64();
        *last_tick = now;

        let unread = data.buffer.unread();
        let tail = data.no_more_data;
        let read = if unread > 0 && (unread >= dest.len() || tail) {
            data.buffer.read(dest)
        } else {
            0
        };

        if read > 0 {
            scale_pcm_i16(&mut dest[..read], shared.gain());
        } else if !tail && !data.skip_pending {
            let count = shared.record_underrun();
            trace!("Stream {}: underrun #{}", shared.id, count);
        }

        if !tail && data.buffer.unread() < shared.refill_threshold {
            shared.try_wake();
        }

        let crossed = data.consume_loop_marks(read);
        if crossed > 0 {
            data.filter.reset(0.0);
            data.position = 0.0;
            shared.record_loops(crossed);
        }

        if read > 0 && !data.skip_pending {
            let (timecode, ahead) = data.position_reference();
            let latency = data.output_latency + shared.sink_latency();
            let raw = timecode - shared.format.bytes_to_seconds(ahead) - latency;
            let smoothed = data.filter.update(raw, dt);
            let mut position = data.position.max(smoothed);
            if shared.duration > 0.0 {
                position = position.min(shared.duration);
            }
            data.position = position.max(0.0);
        }

        let finished = data.no_more_data && data.buffer.unread() == 0 && !data.skip_pending;
        if finished && !shared.is_finished() {
            if shared.duration > 0.0 {
                data.position = shared.duration;
            }
            shared.set_finished(true);
        }

        read
    }
}
