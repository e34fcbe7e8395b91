//! Frame relay between the audio callback thread and the async domain.
//!
//! The capture callback runs under a hard latency budget and must never
//! block. Encoded frames cross into the tokio runtime through an
//! unbounded ordered channel: the producer side always succeeds
//! immediately, and if the consumer falls behind frames queue in
//! capture order rather than being dropped.
//!
//! This channel is the only interaction between the two domains; no
//! other state is shared with the audio thread.

use tokio::sync::mpsc;

/// One encoded PCM frame: little-endian signed 16-bit mono samples,
/// two bytes per sample, one frame per capture callback.
pub type PcmFrame = Vec<u8>;

/// Sender half, owned by the capture pipeline. `send` never blocks.
pub type FrameSender = mpsc::UnboundedSender<PcmFrame>;

/// Receiver half, drained by the relay pump on the tokio runtime.
pub type FrameReceiver = mpsc::UnboundedReceiver<PcmFrame>;

/// Create the capture-to-network frame channel.
pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    mpsc::unbounded_channel()
}
