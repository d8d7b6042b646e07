//! Per-stream state shared between the control thread, the decode worker and the
//! playback consumer
//!
//! Two locks, never held together by the same thread:
//! - the data lock guards the ring buffer and decode/position state
//! - the signal lock guards pending skip requests and the worker wake flag
//!
//! Flags that the real-time path only reads live in atomics.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::audio::types::FormatInfo;
use crate::config::SmoothingConfig;
use crate::playback::position::PositionFilter;
use crate::playback::ring_buffer::RingBuffer;

/// f32 stored as raw bits in an `AtomicU32`
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Boundary between two loop passes inside the ring buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopMark {
    /// Unread bytes before the boundary
    pub remaining: usize,
    /// Media time at the end of the pass that ends at the boundary
    pub end_timecode: f64,
}

/// State guarded by the data lock
pub struct DataState {
    pub buffer: RingBuffer,
    /// Media time at the end of the last chunk written to the buffer
    pub timecode: f64,
    /// Decoder reached end of stream (and is not looping)
    pub no_more_data: bool,
    pub filter: PositionFilter,
    /// Externally reported position in seconds
    pub position: f64,
    /// Bumped on every seek; chunks decoded under an older epoch are dropped
    pub epoch: u64,
    /// A seek was requested and the worker has not repositioned the decoder yet
    pub skip_pending: bool,
    /// Loop pass boundaries still ahead of the read position, oldest first
    pub loop_marks: VecDeque<LoopMark>,
    /// User latency correction in seconds; the sink's own latency is added per tick
    pub output_latency: f64,
}

impl DataState {
    /// Timecode and unread bytes that position the read head within its pass
    pub fn position_reference(&self) -> (f64, usize) {
        match self.loop_marks.front() {
            Some(mark) => (mark.end_timecode, mark.remaining),
            None => (self.timecode, self.buffer.unread()),
        }
    }

    /// Advance loop boundaries past `read` consumed bytes; returns the passes crossed
    pub fn consume_loop_marks(&mut self, read: usize) -> u64 {
        let mut crossed = 0;
        for mark in self.loop_marks.iter_mut() {
            mark.remaining = mark.remaining.saturating_sub(read);
        }
        while self.loop_marks.front().is_some_and(|m| m.remaining == 0) {
            self.loop_marks.pop_front();
            crossed += 1;
        }
        crossed
    }
}

#[derive(Default)]
struct SignalState {
    pending_skip: Option<(f64, u64)>,
    wake: bool,
}

pub struct StreamShared {
    pub id: i32,
    pub format: FormatInfo,
    pub duration: f64,
    pub looping: bool,
    pub prescan: bool,
    /// The consumer wakes the worker once unread bytes drop below this
    pub refill_threshold: usize,
    data: Mutex<DataState>,
    signal: Mutex<SignalState>,
    signal_cv: Condvar,
    paused: AtomicBool,
    terminated: AtomicBool,
    finished: AtomicBool,
    volume: AtomicF32,
    volume_max: AtomicF32,
    /// Device-side latency reported by the sink, in seconds
    sink_latency: AtomicF32,
    underruns: AtomicU64,
    loops: AtomicU64,
}

impl StreamShared {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: i32,
        format: FormatInfo,
        duration: f64,
        looping: bool,
        prescan: bool,
        buffer_bytes: usize,
        smoothing: SmoothingConfig,
        volume_max: f32,
    ) -> Self {
        Self {
            id,
            format,
            duration,
            looping,
            prescan,
            refill_threshold: buffer_bytes,
            data: Mutex::new(DataState {
                buffer: RingBuffer::new(buffer_bytes),
                timecode: 0.0,
                no_more_data: false,
                filter: PositionFilter::new(smoothing),
                position: 0.0,
                epoch: 0,
                skip_pending: false,
                loop_marks: VecDeque::new(),
                output_latency: 0.0,
            }),
            signal: Mutex::new(SignalState::default()),
            signal_cv: Condvar::new(),
            paused: AtomicBool::new(true),
            terminated: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            volume: AtomicF32::new(1.0),
            volume_max: AtomicF32::new(volume_max),
            sink_latency: AtomicF32::new(0.0),
            underruns: AtomicU64::new(0),
            loops: AtomicU64::new(0),
        }
    }

    pub fn with_refill_threshold(mut self, bytes: usize) -> Self {
        self.refill_threshold = bytes;
        self
    }

    pub fn data(&self) -> MutexGuard<'_, DataState> {
        self.data.lock()
    }

    /// Data lock without waiting; used by the real-time pull path
    pub fn try_data(&self) -> Option<MutexGuard<'_, DataState>> {
        self.data.try_lock()
    }

    /// Record a seek target for the worker and wake it; a newer request replaces an older one
    pub fn request_skip(&self, target: f64, epoch: u64) {
        let mut signal = self.signal.lock();
        signal.pending_skip = Some((target, epoch));
        signal.wake = true;
        self.signal_cv.notify_one();
    }

    pub fn take_skip(&self) -> Option<(f64, u64)> {
        self.signal.lock().pending_skip.take()
    }

    pub fn wake(&self) {
        let mut signal = self.signal.lock();
        signal.wake = true;
        self.signal_cv.notify_one();
    }

    /// Wake without waiting for the signal lock; used by the real-time pull path
    ///
    /// A contended lock means the worker is being signalled or is about to re-check
    /// its state anyway.
    pub fn try_wake(&self) {
        if let Some(mut signal) = self.signal.try_lock() {
            signal.wake = true;
            self.signal_cv.notify_one();
        }
    }

    /// Block until woken or `timeout` elapses; the wake flag auto-resets
    pub fn wait(&self, timeout: Duration) {
        let mut signal = self.signal.lock();
        if !signal.wake && signal.pending_skip.is_none() {
            let _ = self.signal_cv.wait_for(&mut signal, timeout);
        }
        signal.wake = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        self.wake();
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn set_finished(&self, finished: bool) {
        self.finished.store(finished, Ordering::SeqCst);
    }

    pub fn volume(&self) -> f32 {
        self.volume.load()
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume);
    }

    pub fn volume_max(&self) -> f32 {
        self.volume_max.load()
    }

    pub fn set_volume_max(&self, volume_max: f32) {
        self.volume_max.store(volume_max);
    }

    pub fn sink_latency(&self) -> f64 {
        self.sink_latency.load() as f64
    }

    pub fn set_sink_latency(&self, seconds: f64) {
        self.sink_latency.store(seconds as f32);
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn record_underrun(&self) -> u64 {
        self.underruns.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Loop passes the consumer has crossed into
    pub fn loops(&self) -> u64 {
        self.loops.load(Ordering::SeqCst)
    }

    pub fn record_loops(&self, passes: u64) {
        self.loops.fetch_add(passes, Ordering::SeqCst);
    }

    /// Effective gain applied to samples
    pub fn gain(&self) -> f32 {
        self.volume() * self.volume_max()
    }
}
