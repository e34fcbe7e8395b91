//! Real-time microphone transcription streaming client.
//!
//! Captures live microphone audio, encodes it as little-endian 16-bit
//! PCM, and streams the frames over a persistent, self-reconnecting
//! WebSocket connection to a transcription backend, accumulating
//! transcript text as it arrives.

pub mod audio;
pub mod relay;
pub mod session;
pub mod settings;
pub mod streaming;

pub use audio::{AudioError, CaptureConfig, CapturePipeline};
pub use relay::{frame_channel, FrameReceiver, FrameSender, PcmFrame};
pub use session::Session;
pub use settings::Settings;
pub use streaming::{
    ClientConfig, ConnectionState, ControlAction, StreamClient, StreamEvent, StreamHandle,
    StreamingError, TranscriptLog,
};
