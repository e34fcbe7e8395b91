//! Audio capture for the streaming pipeline.
//!
//! Microphone input via CPAL plus the pure sample transforms (PCM16
//! encoding, downmix, resampling) that run inside the capture callback.

pub mod capture;
pub mod pcm;

pub use capture::{AudioError, CaptureConfig, CapturePipeline};
pub use pcm::{downmix, encode_pcm, resample};
