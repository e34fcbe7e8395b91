//! Microphone capture pipeline using CPAL.
//!
//! The pipeline opens the default input device, prefers a device
//! configuration matching the requested rate and channel count, and
//! falls back to the device default otherwise. Every input callback
//! downmixes to mono, resamples to the configured target rate, encodes
//! PCM16, and pushes one frame into the relay channel.
//!
//! `cpal::Stream` is not `Send`, so the stream lives on a dedicated
//! audio thread for the lifetime of the capture; `start`/`stop` talk to
//! that thread over channels.

use std::sync::mpsc as std_mpsc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};

use super::pcm::{downmix, encode_pcm, resample};
use crate::relay::FrameSender;

/// Errors that can occur while setting up audio capture.
#[derive(Debug, Clone)]
pub enum AudioError {
    NoInputDevice,
    PermissionDenied(String),
    NoSupportedConfig,
    StreamCreationFailed(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NoInputDevice => write!(f, "No audio input device found"),
            AudioError::PermissionDenied(e) => {
                write!(f, "Microphone access was denied: {}", e)
            }
            AudioError::NoSupportedConfig => write!(f, "No supported audio configuration"),
            AudioError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio stream: {}", e)
            }
        }
    }
}

impl std::error::Error for AudioError {}

/// Requested capture shape. The device may grant something else; the
/// callback converts so that `sample_rate` always governs the encoded
/// output.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
        }
    }
}

/// Handle to the thread that owns the live stream.
struct CaptureHandle {
    stop_tx: std_mpsc::Sender<()>,
    thread: thread::JoinHandle<()>,
}

/// Microphone capture pipeline. Construction touches no device; the
/// device is opened by `start` and released by `stop`.
pub struct CapturePipeline {
    config: CaptureConfig,
    active: Option<CaptureHandle>,
}

impl CapturePipeline {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    /// Open the default input device and start capturing.
    ///
    /// Returns once the stream is live or setup has failed. Encoded
    /// frames are pushed into `frames` until `stop` is called. Calling
    /// `start` while already active is a logged no-op.
    pub fn start(&mut self, frames: FrameSender) -> Result<(), AudioError> {
        if self.active.is_some() {
            log::warn!("Capture already active, ignoring start");
            return Ok(());
        }

        let (stop_tx, stop_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let config = self.config.clone();

        let thread = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || run_capture(config, frames, ready_tx, stop_rx))
            .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.active = Some(CaptureHandle { stop_tx, thread });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioError::StreamCreationFailed(
                    "audio thread exited before reporting readiness".to_string(),
                ))
            }
        }
    }

    /// Stop capturing and release the device. Idempotent: calling with
    /// no active pipeline does nothing.
    pub fn stop(&mut self) {
        match self.active.take() {
            Some(handle) => {
                let _ = handle.stop_tx.send(());
                if handle.thread.join().is_err() {
                    log::warn!("Audio capture thread panicked during shutdown");
                }
                log::info!("Capture stopped");
            }
            None => log::debug!("Capture stop called with no active pipeline"),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Body of the audio thread: build the stream, report readiness, then
/// park until stopped. The stream must be dropped on this thread.
fn run_capture(
    config: CaptureConfig,
    frames: FrameSender,
    ready_tx: std_mpsc::Sender<Result<(), AudioError>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let stream = match open_stream(&config, frames) {
        Ok(stream) => {
            if ready_tx.send(Ok(())).is_err() {
                return;
            }
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Blocks until stop is signalled or the pipeline handle is gone.
    let _ = stop_rx.recv();
    drop(stream);
    log::debug!("Audio capture thread exiting");
}

fn open_stream(config: &CaptureConfig, frames: FrameSender) -> Result<Stream, AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(AudioError::NoInputDevice)?;

    log::info!("Using audio input device: {:?}", device.name());

    let (stream_config, sample_format) = select_config(&device, config)?;

    log::info!(
        "Capturing at {} Hz, {} channel(s), {:?} (target {} Hz mono)",
        stream_config.sample_rate.0,
        stream_config.channels,
        sample_format,
        config.sample_rate
    );

    let target_rate = config.sample_rate;
    let stream = match sample_format {
        SampleFormat::F32 => build_stream_typed::<f32>(&device, &stream_config, target_rate, frames),
        SampleFormat::I16 => build_stream_typed::<i16>(&device, &stream_config, target_rate, frames),
        SampleFormat::U16 => build_stream_typed::<u16>(&device, &stream_config, target_rate, frames),
        _ => Err(AudioError::NoSupportedConfig),
    }?;

    stream.play().map_err(|e| {
        AudioError::StreamCreationFailed(format!("Failed to start stream: {}", e))
    })?;

    Ok(stream)
}

/// Prefer a device config that matches the requested shape exactly;
/// otherwise capture at the device default and convert in the callback.
fn select_config(
    device: &Device,
    requested: &CaptureConfig,
) -> Result<(StreamConfig, SampleFormat), AudioError> {
    let wanted = cpal::SampleRate(requested.sample_rate);

    if let Ok(mut supported) = device.supported_input_configs() {
        if let Some(range) = supported.find(|c| {
            c.channels() == requested.channels
                && c.min_sample_rate() <= wanted
                && wanted <= c.max_sample_rate()
                && matches!(
                    c.sample_format(),
                    SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
                )
        }) {
            let config = range.with_sample_rate(wanted);
            return Ok((config.config(), config.sample_format()));
        }
    }

    let default = device
        .default_input_config()
        .map_err(|_| AudioError::NoSupportedConfig)?;

    log::warn!(
        "Device does not support {} Hz x{}, capturing at {} Hz x{} instead",
        requested.sample_rate,
        requested.channels,
        default.sample_rate().0,
        default.channels()
    );

    Ok((default.config(), default.sample_format()))
}

fn build_stream_typed<T>(
    device: &Device,
    config: &StreamConfig,
    target_rate: u32,
    frames: FrameSender,
) -> Result<Stream, AudioError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = config.channels;
    let source_rate = config.sample_rate.0;
    let err_fn = |err| log::error!("Audio stream error: {}", err);

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let floats: Vec<f32> = data.iter().map(|&s| f32::from_sample(s)).collect();
                let mono = downmix(&floats, channels);
                let at_rate = resample(&mono, source_rate, target_rate);
                let frame = encode_pcm(&at_rate);
                // Receiver gone means teardown is in progress; frames
                // produced in that window are dropped.
                let _ = frames.send(frame);
            },
            err_fn,
            None,
        )
        .map_err(map_build_error)?;

    Ok(stream)
}

fn map_build_error(err: cpal::BuildStreamError) -> AudioError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => AudioError::NoInputDevice,
        cpal::BuildStreamError::StreamConfigNotSupported => AudioError::NoSupportedConfig,
        other => {
            let text = other.to_string();
            if text.to_lowercase().contains("permission") {
                AudioError::PermissionDenied(text)
            } else {
                AudioError::StreamCreationFailed(text)
            }
        }
    }
}
