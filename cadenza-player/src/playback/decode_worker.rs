//! Decode worker thread
//!
//! One thread per open stream. It owns the decoder and keeps the stream's ring buffer
//! above the refill threshold:
//!
//! ```text
//! Idle/Waiting <-> Decoding -> Finished
//!                     |            |
//!                  Skipping <------+
//!                     |
//!                 Terminated
//! ```
//!
//! Decoding runs without holding the data lock; a chunk is only written if no seek
//! happened while it was being decoded. A looping stream keeps decoding across the
//! end of the medium and leaves a [`LoopMark`] in the buffer for the consumer.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cadenza_common::{EventBus, PlaybackEvent};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, trace, warn};

use crate::audio::decoder::Decoder;
use crate::audio::types::PcmChunk;
use crate::playback::shared::{LoopMark, StreamShared};

pub struct DecodeWorker {
    shared: Arc<StreamShared>,
    decoder: Box<dyn Decoder>,
    refill_threshold: usize,
    wake_interval: Duration,
    closed_tx: UnboundedSender<i32>,
    events: EventBus,
    /// Decoded chunk waiting for room in the ring buffer, with its epoch
    held: Option<(PcmChunk, u64)>,
    /// Bytes written since the last loop restart or seek
    pass_bytes: usize,
    empty_passes: u32,
}

impl DecodeWorker {
    pub fn new(
        shared: Arc<StreamShared>,
        decoder: Box<dyn Decoder>,
        refill_threshold: usize,
        wake_interval: Duration,
        closed_tx: UnboundedSender<i32>,
        events: EventBus,
    ) -> Self {
        Self {
            shared,
            decoder,
            refill_threshold,
            wake_interval,
            closed_tx,
            events,
            held: None,
            pass_bytes: 0,
            empty_passes: 0,
        }
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name(format!("cadenza-decode-{}", self.shared.id))
            .spawn(move || self.run())
    }

    fn run(mut self) {
        let id = self.shared.id;
        debug!("Decode worker {} started", id);

        while !self.shared.is_terminated() {
            if let Some((target, epoch)) = self.shared.take_skip() {
                self.apply_skip(target, epoch);
                continue;
            }

            if let Some(epoch) = self.needs_data() {
                if self.decode_step(epoch) {
                    continue;
                }
            }

            self.shared.wait(self.wake_interval);
        }

        self.decoder.close();
        debug!("Decode worker {} terminated", id);

        // The registry may already be gone during shutdown
        let _ = self.closed_tx.send(id);
    }

    /// Epoch to decode under, if the buffer wants more data right now
    fn needs_data(&self) -> Option<u64> {
        if self.shared.is_paused() && !self.shared.prescan {
            return None;
        }
        let data = self.shared.data();
        if data.skip_pending || data.no_more_data || data.buffer.unread() >= self.refill_threshold {
            return None;
        }
        Some(data.epoch)
    }

    /// Decode and store one chunk; false when the chunk is held for lack of room
    fn decode_step(&mut self, epoch: u64) -> bool {
        let next = match self.held.take() {
            Some((chunk, held_epoch)) if held_epoch == epoch => Ok(Some(chunk)),
            _ => self.decoder.decode(),
        };
        match next {
            Ok(Some(chunk)) => self.store(chunk, epoch),
            Ok(None) => {
                self.end_of_stream(epoch);
                true
            }
            Err(e) => {
                error!("Stream {}: decoder failed: {}", self.shared.id, e);
                self.events.emit_lossy(PlaybackEvent::StreamError {
                    stream_id: self.shared.id,
                    message: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                self.mark_no_more_data(epoch);
                true
            }
        }
    }

    fn store(&mut self, chunk: PcmChunk, epoch: u64) -> bool {
        let mut data = self.shared.data();
        if data.epoch != epoch {
            trace!("Stream {}: dropping chunk from before seek", self.shared.id);
            return true;
        }
        let len = chunk.data.len();
        // Writing past capacity would overwrite unread audio
        if !data.buffer.is_empty() && data.buffer.unread() + len > data.buffer.capacity() {
            drop(data);
            trace!("Stream {}: holding {} byte chunk until the buffer drains", self.shared.id, len);
            self.held = Some((chunk, epoch));
            return false;
        }
        data.buffer.write(&chunk.data);
        data.timecode = chunk.timecode;
        self.pass_bytes += len;
        true
    }

    fn end_of_stream(&mut self, epoch: u64) {
        let id = self.shared.id;

        if !self.shared.looping {
            debug!("Stream {}: decoder reached end of stream", id);
            self.mark_no_more_data(epoch);
            return;
        }

        if self.pass_bytes == 0 {
            self.empty_passes += 1;
        } else {
            self.empty_passes = 0;
        }
        if self.empty_passes >= 2 {
            warn!("Stream {}: looping medium produced no audio, finishing", id);
            self.mark_no_more_data(epoch);
            return;
        }

        if let Err(e) = self.decoder.seek(0.0) {
            warn!("Stream {}: loop restart failed, finishing: {}", id, e);
            self.mark_no_more_data(epoch);
            return;
        }
        self.pass_bytes = 0;

        let mut data = self.shared.data();
        if data.epoch == epoch {
            let mark = LoopMark {
                remaining: data.buffer.unread(),
                end_timecode: data.timecode,
            };
            trace!("Stream {}: loop boundary {} bytes ahead", id, mark.remaining);
            data.loop_marks.push_back(mark);
            data.timecode = 0.0;
        }
    }

    fn apply_skip(&mut self, target: f64, epoch: u64) {
        self.held = None;
        self.pass_bytes = 0;
        self.empty_passes = 0;
        let result = self.decoder.seek(target);

        let mut data = self.shared.data();
        if data.epoch != epoch {
            // A newer request is queued behind this one
            return;
        }
        data.buffer.reset();
        data.loop_marks.clear();
        data.timecode = target;
        data.skip_pending = false;
        match result {
            Ok(()) => data.no_more_data = false,
            Err(e) => {
                warn!("Stream {}: seek to {:.3}s failed: {}", self.shared.id, target, e);
                data.no_more_data = true;
            }
        }
    }

    fn mark_no_more_data(&self, epoch: u64) {
        let mut data = self.shared.data();
        if data.epoch == epoch {
            data.no_more_data = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::FormatInfo;
    use crate::config::SmoothingConfig;
    use crate::error::{Error, Result};
    use std::time::Instant;
    use tokio::sync::mpsc;

    /// Emits `chunks` chunks of `size` bytes, 0.1 s each, filled with the chunk number
    struct CountingDecoder {
        chunks: usize,
        next: usize,
        size: usize,
        fail_at: Option<usize>,
        delay: Duration,
    }

    fn counting(chunks: usize) -> CountingDecoder {
        CountingDecoder {
            chunks,
            next: 0,
            size: 100,
            fail_at: None,
            delay: Duration::ZERO,
        }
    }

    impl Decoder for CountingDecoder {
        fn format(&self) -> FormatInfo {
            FormatInfo::new(1, 500)
        }

        fn duration(&self) -> f64 {
            self.chunks as f64 * 0.1
        }

        fn decode(&mut self) -> Result<Option<PcmChunk>> {
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            if self.fail_at == Some(self.next) {
                return Err(Error::Decode("corrupt frame".to_string()));
            }
            if self.next >= self.chunks {
                return Ok(None);
            }
            self.next += 1;
            Ok(Some(PcmChunk {
                data: vec![self.next as u8; self.size],
                timecode: self.next as f64 * 0.1,
            }))
        }

        fn seek(&mut self, seconds: f64) -> Result<()> {
            self.next = (seconds * 10.0).round() as usize;
            Ok(())
        }
    }

    fn shared_with_capacity(looping: bool, prescan: bool, capacity: usize) -> Arc<StreamShared> {
        Arc::new(StreamShared::new(
            4,
            FormatInfo::new(1, 500),
            1.0,
            looping,
            prescan,
            capacity,
            SmoothingConfig::default(),
            1.0,
        ))
    }

    fn shared(looping: bool, prescan: bool) -> Arc<StreamShared> {
        shared_with_capacity(looping, prescan, 10_000)
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(5) {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn start(
        shared: &Arc<StreamShared>,
        decoder: CountingDecoder,
        threshold: usize,
    ) -> (JoinHandle<()>, mpsc::UnboundedReceiver<i32>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = DecodeWorker::new(
            Arc::clone(shared),
            Box::new(decoder),
            threshold,
            Duration::from_millis(5),
            tx,
            EventBus::new(16),
        );
        (worker.spawn().unwrap(), rx)
    }

    /// Invalidate buffered audio and queue a skip, as a seek on the stream does
    fn seek(s: &StreamShared, target: f64) {
        let epoch = {
            let mut data = s.data();
            data.epoch += 1;
            data.buffer.reset();
            data.skip_pending = true;
            data.no_more_data = false;
            data.epoch
        };
        s.request_skip(target, epoch);
    }

    fn drain(s: &StreamShared) -> Vec<u8> {
        let mut data = s.data();
        let mut out = vec![0u8; data.buffer.unread()];
        data.buffer.read(&mut out);
        out
    }

    #[test]
    fn test_paused_without_prescan_does_not_decode() {
        let s = shared(false, false);
        let (handle, _rx) = start(&s, counting(5), 10_000);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(s.data().buffer.unread(), 0);

        s.terminate();
        handle.join().unwrap();
    }

    #[test]
    fn test_prescan_fills_to_threshold_while_paused() {
        let s = shared(false, true);
        let (handle, _rx) = start(&s, counting(50), 300);

        assert!(wait_until(|| s.data().buffer.unread() >= 300));
        std::thread::sleep(Duration::from_millis(20));
        // Stops at the first chunk that crosses the threshold
        assert_eq!(s.data().buffer.unread(), 300);

        s.terminate();
        handle.join().unwrap();
    }

    #[test]
    fn test_end_of_stream_sets_no_more_data() {
        let s = shared(false, false);
        s.set_paused(false);
        let (handle, _rx) = start(&s, counting(3), 10_000);

        assert!(wait_until(|| s.data().no_more_data));
        let data = s.data();
        assert_eq!(data.buffer.unread(), 300);
        assert!((data.timecode - 0.3).abs() < 1e-9);
        drop(data);

        s.terminate();
        handle.join().unwrap();
    }

    #[test]
    fn test_decoder_error_is_end_of_stream() {
        let s = shared(false, false);
        s.set_paused(false);
        let decoder = CountingDecoder {
            fail_at: Some(2),
            ..counting(10)
        };
        let (handle, _rx) = start(&s, decoder, 10_000);

        assert!(wait_until(|| s.data().no_more_data));
        assert_eq!(s.data().buffer.unread(), 200);

        s.terminate();
        handle.join().unwrap();
    }

    #[test]
    fn test_skip_repositions_and_clears() {
        let s = shared(false, false);
        s.set_paused(false);
        let (handle, _rx) = start(&s, counting(10), 10_000);
        assert!(wait_until(|| s.data().no_more_data));

        seek(&s, 0.5);

        assert!(wait_until(|| {
            let data = s.data();
            !data.skip_pending && data.no_more_data
        }));
        // Chunks 6..=10 remain
        assert_eq!(s.data().buffer.unread(), 500);

        s.terminate();
        handle.join().unwrap();
    }

    #[test]
    fn test_chunk_decoded_during_seek_is_dropped() {
        let s = shared(false, false);
        s.set_paused(false);
        let decoder = CountingDecoder {
            delay: Duration::from_millis(40),
            ..counting(10)
        };
        let (handle, _rx) = start(&s, decoder, 10_000);

        // The first chunk is still being decoded
        std::thread::sleep(Duration::from_millis(10));
        seek(&s, 0.5);

        assert!(wait_until(|| s.data().no_more_data));
        let audio = drain(&s);
        assert_eq!(audio.len(), 500);
        assert_eq!(audio[0], 6);

        s.terminate();
        handle.join().unwrap();
    }

    #[test]
    fn test_back_to_back_skips_land_on_the_last() {
        let s = shared(false, false);
        s.set_paused(false);
        let decoder = CountingDecoder {
            delay: Duration::from_millis(20),
            ..counting(10)
        };
        let (handle, _rx) = start(&s, decoder, 10_000);

        std::thread::sleep(Duration::from_millis(5));
        seek(&s, 0.3);
        seek(&s, 0.7);

        assert!(wait_until(|| s.data().no_more_data));
        let audio = drain(&s);
        assert_eq!(audio.len(), 300);
        assert!(audio[..100].iter().all(|&b| b == 8));

        s.terminate();
        handle.join().unwrap();
    }

    #[test]
    fn test_loop_decodes_next_pass_ahead() {
        let s = shared(true, false);
        s.set_paused(false);
        let (handle, _rx) = start(&s, counting(2), 1000);

        // No reads happen; the worker crosses loop ends on its own
        assert!(wait_until(|| s.data().buffer.unread() >= 1000));
        std::thread::sleep(Duration::from_millis(20));
        {
            let data = s.data();
            assert_eq!(data.buffer.unread(), 1000);
            assert!(!data.no_more_data);
            let remaining: Vec<usize> = data.loop_marks.iter().map(|m| m.remaining).collect();
            assert_eq!(remaining, vec![200, 400, 600, 800]);
            assert!(data.loop_marks.iter().all(|m| (m.end_timecode - 0.2).abs() < 1e-9));
        }

        let audio = drain(&s);
        assert_eq!(&audio[..300], [[1u8; 100], [2; 100], [1; 100]].concat().as_slice());

        s.terminate();
        handle.join().unwrap();
    }

    #[test]
    fn test_empty_looping_medium_finishes() {
        let s = shared(true, false);
        s.set_paused(false);
        let (handle, _rx) = start(&s, counting(0), 1000);

        assert!(wait_until(|| s.data().no_more_data));
        assert!(s.data().buffer.is_empty());

        s.terminate();
        handle.join().unwrap();
    }

    #[test]
    fn test_chunk_held_until_buffer_has_room() {
        let s = shared_with_capacity(false, false, 1000);
        s.set_paused(false);
        let decoder = CountingDecoder {
            size: 300,
            ..counting(10)
        };
        // A threshold this close to capacity would let a fourth chunk overwrite unread audio
        let (handle, _rx) = start(&s, decoder, 950);

        assert!(wait_until(|| s.data().buffer.unread() >= 900));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(s.data().buffer.unread(), 900);

        let mut first = [0u8; 300];
        s.data().buffer.read(&mut first);
        s.wake();
        assert!(wait_until(|| s.data().buffer.unread() == 900));

        let audio = drain(&s);
        let expected: Vec<u8> = [2u8, 3, 4].iter().flat_map(|&c| [c; 300]).collect();
        assert_eq!(first, [1u8; 300]);
        assert_eq!(audio, expected);

        s.terminate();
        handle.join().unwrap();
    }

    #[test]
    fn test_terminate_reports_closed_once() {
        let s = shared(false, false);
        let (handle, mut rx) = start(&s, counting(1), 10_000);

        s.terminate();
        handle.join().unwrap();

        assert_eq!(rx.try_recv().unwrap(), 4);
        assert!(rx.try_recv().is_err());
    }
}
