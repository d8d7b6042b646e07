//! Push-style backend that plays into memory
//!
//! Emulates a queued-buffer audio API: each sink owns a fixed number of buffer slots.
//! A queued buffer counts as processed once the consumer's clock has advanced past the
//! time it would take to play it; processed slots are refilled on the next update.
//! Processed bytes are captured per stream for inspection.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::audio::output::{AudioBackend, OutputSink, SinkKind};
use crate::audio::types::FormatInfo;
use crate::error::{Error, Result};
use crate::playback::consumer::PlaybackConsumer;

type Captures = Arc<Mutex<HashMap<i32, Vec<u8>>>>;

pub struct MemoryBackend {
    slots: usize,
    captures: Captures,
}

impl MemoryBackend {
    pub fn new(slots: usize) -> Self {
        Self {
            slots: slots.max(1),
            captures: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Bytes a stream has played so far (after volume scaling)
    pub fn played(&self, stream_id: i32) -> Vec<u8> {
        self.captures
            .lock()
            .get(&stream_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn played_len(&self, stream_id: i32) -> usize {
        self.captures.lock().get(&stream_id).map_or(0, Vec::len)
    }
}

impl AudioBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn open(&self, format: FormatInfo, consumer: PlaybackConsumer) -> Result<Box<dyn OutputSink>> {
        if format.bytes_per_second() == 0 {
            return Err(Error::AudioOutput(format!(
                "Unsupported format: {} channels at {} Hz",
                format.channels, format.sample_rate
            )));
        }

        let id = consumer.stream_id();
        self.captures.lock().insert(id, Vec::new());
        consumer.set_sink_latency(format.bytes_to_seconds(self.slots * consumer.chunk_bytes()));
        debug!("Memory sink opened for stream {} ({} slots)", id, self.slots);

        Ok(Box::new(MemorySink {
            consumer,
            format,
            slots: self.slots,
            queue: VecDeque::with_capacity(self.slots),
            playing: false,
            paused_at: None,
            captures: Arc::clone(&self.captures),
        }))
    }
}

struct QueuedBuffer {
    data: Vec<u8>,
    ends_at: Duration,
}

struct MemorySink {
    consumer: PlaybackConsumer,
    format: FormatInfo,
    slots: usize,
    queue: VecDeque<QueuedBuffer>,
    playing: bool,
    paused_at: Option<Duration>,
    captures: Captures,
}

impl MemorySink {
    fn now(&self) -> Duration {
        self.consumer.clock().now()
    }

    fn drain_processed(&mut self, now: Duration) {
        let mut processed = Vec::new();
        while self.queue.front().is_some_and(|b| b.ends_at <= now) {
            if let Some(buffer) = self.queue.pop_front() {
                processed.extend_from_slice(&buffer.data);
            }
        }
        if !processed.is_empty() {
            let id = self.consumer.stream_id();
            self.captures
                .lock()
                .entry(id)
                .or_default()
                .extend_from_slice(&processed);
        }
    }

    fn refill(&mut self, now: Duration) {
        while self.queue.len() < self.slots {
            let chunk = self.consumer.next_chunk();
            if chunk.is_empty() {
                break;
            }
            let data = chunk.to_vec();
            let start = self.queue.back().map_or(now, |b| b.ends_at.max(now));
            let length = Duration::from_secs_f64(self.format.bytes_to_seconds(data.len()));
            self.queue.push_back(QueuedBuffer {
                data,
                ends_at: start + length,
            });
        }
    }
}

impl OutputSink for MemorySink {
    fn play(&mut self) -> Result<()> {
        if self.playing {
            return Ok(());
        }
        let now = self.now();
        if let Some(paused_at) = self.paused_at.take() {
            let shift = now.saturating_sub(paused_at);
            for buffer in &mut self.queue {
                buffer.ends_at += shift;
            }
        }
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        if self.playing {
            self.playing = false;
            self.paused_at = Some(self.now());
        }
        Ok(())
    }

    fn update(&mut self) -> Result<()> {
        if !self.playing {
            return Ok(());
        }
        let now = self.now();
        self.drain_processed(now);
        self.refill(now);
        Ok(())
    }

    fn latency_seconds(&self) -> f64 {
        self.format
            .bytes_to_seconds(self.slots * self.consumer.chunk_bytes())
    }

    /// Processed buffers still count as played; the rest are discarded
    fn flush(&mut self) {
        let now = self.now();
        self.drain_processed(now);
        self.queue.clear();
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Push
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmoothingConfig;
    use crate::playback::clock::ManualClock;
    use crate::playback::shared::StreamShared;

    fn open(slots: usize, chunk: usize) -> (Arc<StreamShared>, Arc<ManualClock>, MemoryBackend, Box<dyn OutputSink>) {
        let format = FormatInfo::new(1, 500);
        let shared = Arc::new(StreamShared::new(
            3,
            format,
            1.0,
            false,
            false,
            4096,
            SmoothingConfig::default(),
            1.0,
        ));
        shared.set_paused(false);
        let clock = Arc::new(ManualClock::new());
        let consumer = PlaybackConsumer::new(Arc::clone(&shared), clock.clone(), chunk);
        let backend = MemoryBackend::new(slots);
        let sink = backend.open(format, consumer).unwrap();
        (shared, clock, backend, sink)
    }

    #[test]
    fn test_buffers_processed_at_byte_rate() {
        // 1000 bytes/s, 100-byte buffers take 100 ms each
        let (shared, clock, backend, mut sink) = open(2, 100);
        shared.data().buffer.write(&[7u8; 500]);

        sink.play().unwrap();
        sink.update().unwrap();
        assert_eq!(backend.played_len(3), 0);
        assert_eq!(shared.data().buffer.unread(), 300);

        clock.advance(Duration::from_millis(100));
        sink.update().unwrap();
        assert_eq!(backend.played_len(3), 100);
        assert_eq!(shared.data().buffer.unread(), 200);
    }

    #[test]
    fn test_paused_sink_does_not_consume() {
        let (shared, clock, backend, mut sink) = open(2, 100);
        shared.data().buffer.write(&[1u8; 300]);

        sink.update().unwrap();
        clock.advance(Duration::from_secs(1));
        sink.update().unwrap();
        assert_eq!(backend.played_len(3), 0);
        assert_eq!(shared.data().buffer.unread(), 300);
    }

    #[test]
    fn test_pause_shifts_queued_buffers() {
        let (shared, clock, backend, mut sink) = open(1, 100);
        shared.data().buffer.write(&[1u8; 200]);

        sink.play().unwrap();
        sink.update().unwrap();
        sink.pause().unwrap();
        clock.advance(Duration::from_secs(1));
        sink.play().unwrap();
        sink.update().unwrap();
        assert_eq!(backend.played_len(3), 0);

        clock.advance(Duration::from_millis(100));
        sink.update().unwrap();
        assert_eq!(backend.played_len(3), 100);
    }

    #[test]
    fn test_latency_covers_all_slots() {
        let (shared, _clock, _backend, sink) = open(5, 100);
        assert!((sink.latency_seconds() - 0.5).abs() < 1e-9);
        assert!((shared.sink_latency() - 0.5).abs() < 1e-6);
        assert_eq!(sink.kind(), SinkKind::Push);
    }

    #[test]
    fn test_flush_discards_unplayed_buffers() {
        let (shared, clock, backend, mut sink) = open(3, 100);
        shared.data().buffer.write(&[5u8; 300]);

        sink.play().unwrap();
        sink.update().unwrap();
        clock.advance(Duration::from_millis(100));
        sink.flush();
        assert_eq!(backend.played_len(3), 100);

        shared.data().buffer.write(&[9u8; 100]);
        sink.update().unwrap();
        clock.advance(Duration::from_millis(100));
        sink.update().unwrap();
        assert_eq!(backend.played(3), [[5u8; 100], [9u8; 100]].concat());
    }
}
