//! Audio Test File Generation Utilities
//!
//! Generates deterministic 16-bit WAV files with known characteristics so decoded
//! output can be compared sample for sample.

use hound::{WavReader, WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

/// Generate a sine wave WAV file
///
/// # Arguments
/// * `path` - Output file path
/// * `seconds` - Duration in seconds
/// * `sample_rate` - Sample rate in Hz
/// * `channels` - Channel count
/// * `frequency_hz` - Sine frequency
/// * `amplitude` - Amplitude 0.0-1.0
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    seconds: f32,
    sample_rate: u32,
    channels: u16,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let total_frames = (sample_rate as f32 * seconds) as u64;

    for frame in 0..total_frames {
        let t = frame as f32 / sample_rate as f32;
        let value = (amplitude * (2.0 * PI * frequency_hz * t).sin() * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(value)?;
        }
    }

    writer.finalize()?;
    Ok(())
}

/// Read all samples of a 16-bit WAV file as interleaved little-endian bytes
pub fn read_wav_bytes<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, hound::Error> {
    let mut reader = WavReader::open(path)?;
    let mut bytes = Vec::new();
    for sample in reader.samples::<i16>() {
        bytes.extend_from_slice(&sample?.to_le_bytes());
    }
    Ok(bytes)
}
