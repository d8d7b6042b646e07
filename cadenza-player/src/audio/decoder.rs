//! Decoder boundary and the symphonia implementation
//!
//! The engine treats decoding as a black box: a [`Decoder`] yields interleaved i16 PCM
//! chunks tagged with the media time at the end of each chunk, or `None` at end of
//! stream. [`DecoderFactory`] turns a medium name into an open decoder.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder as CodecDecoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, warn};

use crate::audio::types::{FormatInfo, PcmChunk};
use crate::error::{Error, Result};

/// Source of PCM for one stream
///
/// Owned by exactly one decode worker thread.
pub trait Decoder: Send {
    fn format(&self) -> FormatInfo;

    /// Total length in seconds (0.0 when unknown)
    fn duration(&self) -> f64;

    /// Next chunk, or `Ok(None)` at end of stream
    fn decode(&mut self) -> Result<Option<PcmChunk>>;

    /// Reposition so the next chunk starts at `seconds`
    fn seek(&mut self, seconds: f64) -> Result<()>;

    /// Release decoder resources; further calls may fail
    fn close(&mut self) {}
}

/// Opens decoders for media names
pub trait DecoderFactory: Send + Sync {
    fn open(&self, medium: &str) -> Result<Box<dyn Decoder>>;
}

/// Opens local files with symphonia
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoderFactory;

impl DecoderFactory for SymphoniaDecoderFactory {
    fn open(&self, medium: &str) -> Result<Box<dyn Decoder>> {
        Ok(Box::new(SymphoniaDecoder::open(Path::new(medium))?))
    }
}

/// File decoder producing interleaved i16 LE
pub struct SymphoniaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn CodecDecoder>,
    track_id: u32,
    info: FormatInfo,
    duration: f64,
    time_base: Option<TimeBase>,
    /// Timestamp the first emitted frame must have after an accurate seek
    trim_until_ts: Option<u64>,
    /// Used when packets carry no time base
    last_timecode: f64,
}

fn time_to_seconds(time: Time) -> f64 {
    time.seconds as f64 + time.frac
}

impl SymphoniaDecoder {
    pub fn open(path: &Path) -> Result<Self> {
        debug!("Opening decoder: {}", path.display());

        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(path.display().to_string())
            } else {
                Error::Decode(format!("Failed to open file {}: {}", path.display(), e))
            }
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

        let params = &track.codec_params;
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;
        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;

        let duration = match (params.time_base, params.n_frames) {
            (Some(tb), Some(frames)) => time_to_seconds(tb.calc_time(frames)),
            (None, Some(frames)) => frames as f64 / sample_rate as f64,
            _ => 0.0,
        };

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        let track_id = track.id;
        let time_base = params.time_base;

        debug!(
            "Audio format: sample_rate={}, channels={}, duration={:.3}s",
            sample_rate, channels, duration
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            info: FormatInfo::new(channels, sample_rate),
            duration,
            time_base,
            trim_until_ts: None,
            last_timecode: 0.0,
        })
    }

    fn timecode_at(&self, ts: u64, frames: usize) -> f64 {
        match self.time_base {
            Some(tb) => time_to_seconds(tb.calc_time(ts)),
            None => self.last_timecode + frames as f64 / self.info.sample_rate.max(1) as f64,
        }
    }
}

impl Decoder for SymphoniaDecoder {
    fn format(&self) -> FormatInfo {
        self.info
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn decode(&mut self) -> Result<Option<PcmChunk>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(Error::Decode(format!("Failed to read packet: {}", e))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let ts = packet.ts();
            let dur = packet.dur();

            let mut skip_frames = 0usize;
            if let Some(required) = self.trim_until_ts {
                if ts + dur <= required {
                    continue;
                }
                skip_frames = required.saturating_sub(ts) as usize;
                self.trim_until_ts = None;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(format!("Decode failed: {}", e))),
            };

            let spec = *decoded.spec();
            let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            samples.copy_interleaved_ref(decoded);

            let channels = spec.channels.count().max(1);
            let all = samples.samples();
            let skip = (skip_frames * channels).min(all.len());
            let kept = &all[skip..];
            if kept.is_empty() {
                continue;
            }

            let data: Vec<u8> = kept.iter().flat_map(|s| s.to_le_bytes()).collect();
            let timecode = self.timecode_at(ts + dur, kept.len() / channels);
            self.last_timecode = timecode;

            return Ok(Some(PcmChunk { data, timecode }));
        }
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        let target = seconds.max(0.0);
        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(target),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| Error::Decode(format!("Seek to {:.3}s failed: {}", target, e)))?;

        self.decoder.reset();
        self.trim_until_ts = (seeked.required_ts > seeked.actual_ts).then_some(seeked.required_ts);
        self.last_timecode = target;
        debug!(
            "Seeked to {:.3}s (required_ts={}, actual_ts={})",
            target, seeked.required_ts, seeked.actual_ts
        );
        Ok(())
    }
}
