//! Streaming transport to the transcription backend.
//!
//! # Architecture
//!
//! ```text
//! PCM frames ──▶ StreamHandle::send_frame ──▶ connection task ──▶ WebSocket
//!                                                   │
//!                                                   ▼
//!                                   StreamEvent (transcripts, errors)
//! ```
//!
//! The connection task reconnects on every close after a fixed delay
//! and never gives up while the session is alive. Frames produced while
//! the connection is down are dropped, not queued.

mod client;
mod protocol;
mod transcript;

pub use client::{
    ClientConfig, ConnectionState, EventReceiver, StreamClient, StreamEvent, StreamHandle,
};
pub use protocol::{parse_server_message, ClientMessage, ControlAction, ServerEvent};
pub use transcript::TranscriptLog;

/// Errors inside the streaming transport. All of them are handled by
/// the reconnect cycle; none are surfaced to the user as fatal.
#[derive(Debug, Clone)]
pub enum StreamingError {
    /// Failed to establish the WebSocket connection.
    ConnectFailed(String),
    /// Failed to transmit a frame or control message.
    SendFailed(String),
    /// The connection was closed by the peer or the transport.
    Disconnected(String),
    /// Failed to encode an outbound message.
    ProtocolError(String),
}

impl std::fmt::Display for StreamingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamingError::ConnectFailed(e) => {
                write!(f, "Failed to connect to transcription backend: {}", e)
            }
            StreamingError::SendFailed(e) => write!(f, "Failed to send message: {}", e),
            StreamingError::Disconnected(e) => write!(f, "WebSocket disconnected: {}", e),
            StreamingError::ProtocolError(e) => write!(f, "Protocol error: {}", e),
        }
    }
}

impl std::error::Error for StreamingError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_error_display() {
        let err = StreamingError::ConnectFailed("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));

        let err = StreamingError::SendFailed("broken pipe".to_string());
        assert!(err.to_string().contains("broken pipe"));

        let err = StreamingError::Disconnected("code=1006".to_string());
        assert!(err.to_string().contains("1006"));
    }
}
