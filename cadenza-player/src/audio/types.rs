//! Core audio data types
//!
//! All PCM moving through the engine is interleaved signed 16-bit little-endian.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Bytes per PCM sample (i16)
pub const BYTES_PER_SAMPLE: usize = 2;

/// Stream format reported by a decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub channels: u16,
    pub sample_rate: u32,
}

impl FormatInfo {
    pub fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    /// Bytes per interleaved frame
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * BYTES_PER_SAMPLE
    }

    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.frame_bytes()
    }

    /// Playback time covered by `bytes` of PCM
    pub fn bytes_to_seconds(&self, bytes: usize) -> f64 {
        let bps = self.bytes_per_second();
        if bps == 0 {
            0.0
        } else {
            bytes as f64 / bps as f64
        }
    }
}

/// One decoded block of PCM
#[derive(Debug, Clone, PartialEq)]
pub struct PcmChunk {
    /// Interleaved i16 LE samples
    pub data: Vec<u8>,
    /// Media time in seconds at the end of this chunk
    pub timecode: f64,
}

/// Optional processing requested at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioEffect {
    #[default]
    None,
    /// Vocal removal; not supported by the built-in backends
    Karaoke,
}

impl FromStr for AudioEffect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(AudioEffect::None),
            "karaoke" => Ok(AudioEffect::Karaoke),
            other => Err(Error::Playback(format!("Unknown audio effect: {}", other))),
        }
    }
}

impl fmt::Display for AudioEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioEffect::None => write!(f, "none"),
            AudioEffect::Karaoke => write!(f, "karaoke"),
        }
    }
}

/// Scale every i16 LE sample in `pcm` by `gain`, clamping to the i16 range
///
/// Operates on raw sample pairs, so it is independent of channel layout. A trailing
/// odd byte is left untouched.
pub fn scale_pcm_i16(pcm: &mut [u8], gain: f32) {
    if gain == 1.0 {
        return;
    }
    for sample in pcm.chunks_exact_mut(BYTES_PER_SAMPLE) {
        let value = i16::from_le_bytes([sample[0], sample[1]]);
        let scaled = (value as f32 * gain).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        sample.copy_from_slice(&scaled.to_le_bytes());
    }
}
