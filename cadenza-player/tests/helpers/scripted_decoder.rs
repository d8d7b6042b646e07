//! In-memory decoder producing constant-valued PCM
//!
//! Media are registered by name; every sample of a medium has the same value, which
//! makes volume scaling visible in captured output. A medium may instead step its
//! value once per second so captured audio shows where playback was in the medium.

use std::collections::HashMap;
use std::time::Duration;

use cadenza_player::audio::{Decoder, DecoderFactory, FormatInfo, PcmChunk};
use cadenza_player::{Error, Result};

/// Description of one scripted medium
#[derive(Debug, Clone, Copy)]
pub struct ScriptedMedium {
    pub format: FormatInfo,
    pub seconds: f64,
    pub sample: i16,
    /// Added to `sample` for every whole second into the medium
    pub step_per_second: i16,
    pub chunk_frames: usize,
}

impl ScriptedMedium {
    /// Mono 8 kHz medium (16000 bytes per second)
    pub fn mono(seconds: f64, sample: i16) -> Self {
        Self {
            format: FormatInfo::new(1, 8000),
            seconds,
            sample,
            step_per_second: 0,
            chunk_frames: 1024,
        }
    }

    /// Mono 8 kHz medium whose value is `100 * (second + 1)`
    pub fn seconds_marked(seconds: f64) -> Self {
        Self {
            step_per_second: 100,
            ..Self::mono(seconds, 100)
        }
    }

    /// Sample value at `frame`
    pub fn sample_at(&self, frame: usize) -> i16 {
        let second = (frame / self.format.sample_rate as usize) as i16;
        self.sample + self.step_per_second * second
    }

    pub fn total_frames(&self) -> usize {
        (self.seconds * self.format.sample_rate as f64).round() as usize
    }

    pub fn total_bytes(&self) -> usize {
        self.total_frames() * self.format.frame_bytes()
    }
}

#[derive(Default)]
pub struct ScriptedDecoderFactory {
    media: HashMap<String, ScriptedMedium>,
    open_delay: Duration,
}

impl ScriptedDecoderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, medium: ScriptedMedium) -> Self {
        self.media.insert(name.to_string(), medium);
        self
    }

    /// Make every open block for `delay`, like a slow disk or network share
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }
}

impl DecoderFactory for ScriptedDecoderFactory {
    fn open(&self, medium: &str) -> Result<Box<dyn Decoder>> {
        if !self.open_delay.is_zero() {
            std::thread::sleep(self.open_delay);
        }
        let script = self
            .media
            .get(medium)
            .copied()
            .ok_or_else(|| Error::NotFound(medium.to_string()))?;
        Ok(Box::new(ScriptedDecoder {
            script,
            frame: 0,
        }))
    }
}

pub struct ScriptedDecoder {
    script: ScriptedMedium,
    frame: usize,
}

impl Decoder for ScriptedDecoder {
    fn format(&self) -> FormatInfo {
        self.script.format
    }

    fn duration(&self) -> f64 {
        self.script.seconds
    }

    fn decode(&mut self) -> Result<Option<PcmChunk>> {
        let total = self.script.total_frames();
        if self.frame >= total {
            return Ok(None);
        }
        let frames = self.script.chunk_frames.min(total - self.frame);
        let channels = self.script.format.channels as usize;
        let data = (self.frame..self.frame + frames)
            .flat_map(|frame| std::iter::repeat(self.script.sample_at(frame).to_le_bytes()).take(channels))
            .flatten()
            .collect();
        self.frame += frames;
        Ok(Some(PcmChunk {
            data,
            timecode: self.frame as f64 / self.script.format.sample_rate as f64,
        }))
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        let frame = (seconds * self.script.format.sample_rate as f64).round() as usize;
        self.frame = frame.min(self.script.total_frames());
        Ok(())
    }
}
