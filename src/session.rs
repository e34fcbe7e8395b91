//! Session controller: the coordinating object behind the user-facing
//! start/stop surface.
//!
//! A session owns one streaming client and one capture pipeline. The
//! connection is established eagerly at construction and reconnects on
//! its own schedule, independent of whether recording is active;
//! recording can start and stop any number of times within one session.

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::audio::{AudioError, CaptureConfig, CapturePipeline};
use crate::relay;
use crate::settings::Settings;
use crate::streaming::{
    ClientConfig, ConnectionState, ControlAction, EventReceiver, StreamClient, StreamEvent,
    TranscriptLog,
};

pub struct Session {
    id: Uuid,
    client: StreamClient,
    events: EventReceiver,
    capture: CapturePipeline,
    relay_pump: Option<JoinHandle<()>>,
    transcript: TranscriptLog,
    recording: bool,
    last_error: Option<String>,
}

impl Session {
    /// Create a session and open the connection eagerly.
    pub fn start(settings: Settings) -> Self {
        let id = Uuid::new_v4();
        log::info!(
            "Session {}: starting (endpoint: {}, {} Hz, {} channel(s))",
            id,
            settings.endpoint,
            settings.sample_rate,
            settings.channel_count
        );

        let (client, events) = StreamClient::spawn(ClientConfig {
            endpoint: settings.endpoint.clone(),
            reconnect_delay: settings.reconnect_delay(),
        });

        let capture = CapturePipeline::new(CaptureConfig {
            sample_rate: settings.sample_rate,
            channels: settings.channel_count,
        });

        Self {
            id,
            client,
            events,
            capture,
            relay_pump: None,
            transcript: TranscriptLog::new(),
            recording: false,
            last_error: None,
        }
    }

    /// Start capturing and forwarding audio frames.
    ///
    /// On failure the capture error is stored as a user-facing message
    /// in `last_error` and recording stays off.
    pub fn start_recording(&mut self) -> Result<(), AudioError> {
        if self.recording {
            log::debug!("Session {}: already recording", self.id);
            return Ok(());
        }

        let (frame_tx, mut frame_rx) = relay::frame_channel();

        if let Err(e) = self.capture.start(frame_tx) {
            log::error!("Session {}: failed to start capture: {}", self.id, e);
            self.last_error = Some(format!(
                "Unable to access microphone or initialize recording: {}",
                e
            ));
            return Err(e);
        }

        // Pump relayed frames into the streaming client. Ends on its
        // own once the capture thread drops the sender.
        let handle = self.client.handle();
        self.relay_pump = Some(tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                handle.send_frame(frame);
            }
            log::debug!("Frame relay drained");
        }));

        self.recording = true;
        self.last_error = None;
        log::info!("Session {}: recording started", self.id);
        Ok(())
    }

    /// Stop capturing. Sends a best-effort control stop to the backend
    /// and tears down the capture pipeline; the connection stays up.
    pub fn stop_recording(&mut self) {
        if !self.recording {
            log::debug!("Session {}: not recording", self.id);
            return;
        }

        // Logged and dropped by the client when the connection is not
        // open; stopping never fails on account of the network.
        self.client.handle().send_control(ControlAction::Stop);

        self.capture.stop();
        self.relay_pump.take();
        self.recording = false;
        log::info!("Session {}: recording stopped", self.id);
    }

    /// Wait for the next streaming event, fold it into session state,
    /// and hand it back. Returns `None` if the client task is gone.
    pub async fn next_update(&mut self) -> Option<StreamEvent> {
        let event = self.events.recv().await?;
        self.apply_event(&event);
        Some(event)
    }

    fn apply_event(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Transcript(fragment) => {
                self.transcript.append_fragment(fragment);
            }
            StreamEvent::DecodeError(e) => {
                log::warn!("Session {}: discarding undecodable message: {}", self.id, e);
            }
            StreamEvent::Connected => {
                log::info!("Session {}: connection open", self.id);
            }
            StreamEvent::Disconnected { reason } => {
                log::warn!("Session {}: connection lost: {}", self.id, reason);
            }
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.client.state()
    }

    pub fn transcript(&self) -> &str {
        self.transcript.text()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Tear the session down: stop recording if active, then shut the
    /// streaming client down so no reconnect timer outlives the owner.
    pub async fn shutdown(mut self) {
        log::info!("Session {}: shutting down", self.id);
        if self.recording {
            self.stop_recording();
        }
        self.client.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> Settings {
        // A bound-then-dropped port: the client keeps cycling through
        // its reconnect loop without ever opening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        Settings {
            endpoint,
            reconnect_delay_ms: 50,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_session_starts_idle() {
        let session = Session::start(test_settings());

        assert!(!session.is_recording());
        assert_eq!(session.transcript(), "");
        assert!(session.last_error().is_none());

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_transcript_accumulates_from_events() {
        let mut session = Session::start(test_settings());

        session.apply_event(&StreamEvent::Transcript("hello".to_string()));
        session.apply_event(&StreamEvent::Transcript("world".to_string()));

        assert_eq!(session.transcript(), " hello world");

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_recording_when_idle_is_harmless() {
        let mut session = Session::start(test_settings());

        session.stop_recording();
        session.stop_recording();
        assert!(!session.is_recording());

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_decode_error_does_not_touch_transcript() {
        let mut session = Session::start(test_settings());

        session.apply_event(&StreamEvent::Transcript("hello".to_string()));
        session.apply_event(&StreamEvent::DecodeError("bad payload".to_string()));

        assert_eq!(session.transcript(), " hello");

        session.shutdown().await;
    }
}
