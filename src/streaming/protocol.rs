//! Wire messages exchanged with the transcription backend.
//!
//! Outbound text messages are tagged JSON; audio itself travels as raw
//! binary frames and never passes through this module. Inbound text
//! messages are JSON objects with an optional `text` field carrying a
//! transcript fragment; all other fields are ignored.

use serde::{Deserialize, Serialize};

/// Actions carried by a control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    /// End the current transcription session.
    Stop,
}

/// Messages sent from client to backend as JSON text.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Control { action: ControlAction },
}

impl ClientMessage {
    pub fn control(action: ControlAction) -> Self {
        Self::Control { action }
    }
}

/// Raw shape of an inbound backend message. Unknown fields are
/// tolerated so the backend can evolve without breaking the client.
#[derive(Debug, Clone, Deserialize)]
struct ServerMessage {
    #[serde(default)]
    text: Option<String>,
}

/// What an inbound message means to this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A transcript fragment to append.
    Transcript(String),
    /// Well-formed JSON that carries nothing we consume.
    Unknown,
}

/// Parse one inbound text payload.
///
/// Malformed JSON is an error for the caller to surface; it must not
/// crash the pipeline or be silently swallowed.
pub fn parse_server_message(raw: &str) -> Result<ServerEvent, serde_json::Error> {
    let msg: ServerMessage = serde_json::from_str(raw)?;
    Ok(match msg.text {
        Some(text) => ServerEvent::Transcript(text),
        None => ServerEvent::Unknown,
    })
}
