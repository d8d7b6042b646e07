//! Pull-style output through cpal
//!
//! Each stream gets its own output thread that owns the `cpal::Stream` (which is not
//! `Send` on every platform) and obeys commands sent over a channel. The device
//! callback calls the stream consumer's non-blocking render and reports the callback
//! period as the sink latency.
//!
//! Device errors raised by cpal set an error flag; the sink reports it from `update()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use tracing::{debug, error, info, warn};

use crate::audio::output::{AudioBackend, OutputSink, SinkKind};
use crate::audio::types::FormatInfo;
use crate::error::{Error, Result};
use crate::playback::consumer::PlaybackConsumer;
use crate::playback::shared::StreamShared;

/// Output backend using the default cpal host
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    /// Requested device name (None = default)
    device: Option<String>,
}

impl CpalBackend {
    pub fn new(device: Option<String>) -> Self {
        Self { device }
    }

    /// List available audio output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn open(&self, format: FormatInfo, consumer: PlaybackConsumer) -> Result<Box<dyn OutputSink>> {
        let id = consumer.stream_id();
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let error_flag = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(consumer.shared());

        let thread = {
            let device = self.device.clone();
            let error_flag = Arc::clone(&error_flag);
            std::thread::Builder::new()
                .name(format!("cadenza-output-{}", id))
                .spawn(move || {
                    output_thread(
                        device,
                        format,
                        consumer,
                        command_rx,
                        ready_tx,
                        error_flag,
                    )
                })?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalSink {
                commands: command_tx,
                thread: Some(thread),
                error_flag,
                shared,
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(Error::AudioOutput("Output thread exited during setup".to_string()))
            }
        }
    }
}

enum SinkCommand {
    Play,
    Pause,
    Shutdown,
}

struct CpalSink {
    commands: Sender<SinkCommand>,
    thread: Option<JoinHandle<()>>,
    error_flag: Arc<AtomicBool>,
    shared: Arc<StreamShared>,
}

impl CpalSink {
    fn send(&self, command: SinkCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::AudioOutput("Output thread is gone".to_string()))
    }
}

impl OutputSink for CpalSink {
    fn play(&mut self) -> Result<()> {
        self.send(SinkCommand::Play)
    }

    fn pause(&mut self) -> Result<()> {
        self.send(SinkCommand::Pause)
    }

    fn update(&mut self) -> Result<()> {
        if self.error_flag.load(Ordering::SeqCst) {
            return Err(Error::AudioOutput("Audio device reported an error".to_string()));
        }
        Ok(())
    }

    /// One callback period, as last reported by the device
    fn latency_seconds(&self) -> f64 {
        self.shared.sink_latency()
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Pull
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.commands.send(SinkCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn output_thread(
    device_name: Option<String>,
    format: FormatInfo,
    consumer: PlaybackConsumer,
    commands: Receiver<SinkCommand>,
    ready: SyncSender<Result<()>>,
    error_flag: Arc<AtomicBool>,
) {
    let stream = match open_device(device_name.as_deref())
        .and_then(|device| build_stream(&device, format, consumer, error_flag.clone()))
    {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    // Some hosts start streams on creation
    let _ = stream.pause();
    if ready.send(Ok(())).is_err() {
        return;
    }

    while let Ok(command) = commands.recv() {
        let result = match command {
            SinkCommand::Play => stream.play().map_err(|e| e.to_string()),
            SinkCommand::Pause => stream.pause().map_err(|e| e.to_string()),
            SinkCommand::Shutdown => break,
        };
        if let Err(e) = result {
            error!("Audio stream control failed: {}", e);
            error_flag.store(true, Ordering::SeqCst);
        }
    }

    debug!("Output thread exiting");
}

fn open_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Found requested audio device: {}", name);
            return Ok(device);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
    debug!(
        "Using audio device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(device)
}

fn build_stream(
    device: &Device,
    format: FormatInfo,
    mut consumer: PlaybackConsumer,
    error_flag: Arc<AtomicBool>,
) -> Result<Stream> {
    let sample_format = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?
        .sample_format();

    let config = StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let channels = format.channels.max(1) as usize;
    let rate = format.sample_rate.max(1) as f64;

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        format.sample_rate, format.channels, sample_format
    );

    let err_fn = move |err: cpal::StreamError| {
        error!("Audio stream error: {}", err);
        error_flag.store(true, Ordering::SeqCst);
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                consumer.set_sink_latency((data.len() / channels) as f64 / rate);
                consumer.render_f32(data);
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                consumer.set_sink_latency((data.len() / channels) as f64 / rate);
                consumer.render_i16(data);
            },
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_output_stream(
            &config,
            move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                consumer.set_sink_latency((data.len() / channels) as f64 / rate);
                consumer.render_u16(data);
            },
            err_fn,
            None,
        ),
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream.map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}
