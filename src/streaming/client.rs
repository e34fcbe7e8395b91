//! Reconnecting WebSocket client for the transcription backend.
//!
//! A single background task owns the connection for the lifetime of the
//! client and publishes its state through a watch channel:
//!
//! ```text
//! Connecting ──▶ Open ──▶ Closed ──(reconnect delay)──▶ Connecting ─▶ …
//! ```
//!
//! Every close schedules exactly one reconnection attempt after the
//! configured fixed delay; the loop structure makes duplicate timers
//! impossible. There is no terminal failure state: the client retries
//! until it is shut down, and shutdown cancels a pending attempt.
//!
//! Sends are accepted only while the connection is open. Frames or
//! control messages produced at any other time are dropped with a
//! logged warning, never queued.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::protocol::{parse_server_message, ClientMessage, ControlAction, ServerEvent};
use super::StreamingError;
use crate::relay::PcmFrame;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Connection lifecycle state, readable at any time via the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Events surfaced to the session.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Connected,
    Disconnected { reason: String },
    /// A transcript fragment from the backend.
    Transcript(String),
    /// An inbound payload that failed to parse as JSON.
    DecodeError(String),
}

/// Receiver for events produced by the connection task.
pub type EventReceiver = mpsc::UnboundedReceiver<StreamEvent>;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:8000`.
    pub endpoint: String,
    /// Fixed delay between a close and the next connection attempt.
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8000".to_string(),
            reconnect_delay: Duration::from_millis(2000),
        }
    }
}

enum Command {
    Frame(PcmFrame),
    Control(ControlAction),
    Shutdown,
}

/// Cloneable sending side of the client. Checks the open-state
/// precondition and forwards to the connection task.
#[derive(Clone)]
pub struct StreamHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl StreamHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch the connection state machine.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Transmit one binary PCM frame, preserving submission order.
    ///
    /// While the connection is not open the frame is dropped with a
    /// warning, never queued.
    pub fn send_frame(&self, frame: PcmFrame) {
        if self.state() != ConnectionState::Open {
            log::warn!(
                "Connection is not open ({}), dropping {}-byte audio frame",
                self.state().as_str(),
                frame.len()
            );
            return;
        }
        if self.cmd_tx.send(Command::Frame(frame)).is_err() {
            log::warn!("Streaming task is gone, dropping audio frame");
        }
    }

    /// Send a control message as JSON text. Same open-state rule as
    /// `send_frame`.
    pub fn send_control(&self, action: ControlAction) {
        if self.state() != ConnectionState::Open {
            log::warn!(
                "Connection is not open ({}), unable to send control message {:?}",
                self.state().as_str(),
                action
            );
            return;
        }
        if self.cmd_tx.send(Command::Control(action)).is_err() {
            log::warn!("Streaming task is gone, dropping control message {:?}", action);
        }
    }
}

/// Owns the background connection task.
pub struct StreamClient {
    handle: StreamHandle,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl StreamClient {
    /// Spawn the connection task. The state machine starts in
    /// `Connecting` immediately; events arrive on the returned
    /// receiver.
    pub fn spawn(config: ClientConfig) -> (Self, EventReceiver) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let task = tokio::spawn(run_connection(config, cmd_rx, state_tx, event_tx));

        let client = Self {
            handle: StreamHandle { cmd_tx, state_rx },
            task: Some(task),
        };
        (client, event_rx)
    }

    /// Get a cloneable sending handle.
    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    /// Tear down the client: cancels a pending reconnect, closes the
    /// socket if open, and waits for the task to finish.
    pub async fn shutdown(mut self) {
        log::info!("Shutting down streaming client");
        let _ = self.handle.cmd_tx.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    log::warn!("Streaming task ended abnormally: {}", e);
                }
            }
        }
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        // Backstop for clients dropped without shutdown(); no timer may
        // outlive the owner.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum ConnectionEnd {
    Shutdown,
    Closed(StreamingError),
}

async fn run_connection(
    config: ClientConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    event_tx: mpsc::UnboundedSender<StreamEvent>,
) {
    loop {
        state_tx.send_replace(ConnectionState::Connecting);
        log::info!("Connecting to {}", config.endpoint);

        match connect_async(config.endpoint.as_str()).await {
            Ok((ws, _response)) => {
                log::info!("WebSocket connected");
                state_tx.send_replace(ConnectionState::Open);
                let _ = event_tx.send(StreamEvent::Connected);

                match drive_open_connection(ws, &mut cmd_rx, &event_tx).await {
                    ConnectionEnd::Shutdown => return,
                    ConnectionEnd::Closed(reason) => {
                        log::warn!("WebSocket closed: {}", reason);
                        let _ = event_tx.send(StreamEvent::Disconnected {
                            reason: reason.to_string(),
                        });
                    }
                }
            }
            Err(e) => {
                log::warn!("{}", StreamingError::ConnectFailed(e.to_string()));
            }
        }

        state_tx.send_replace(ConnectionState::Closed);

        // Fixed-delay reconnect. Commands arriving while closed are
        // dropped here; a shutdown cancels the pending attempt.
        let sleep = tokio::time::sleep(config.reconnect_delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Frame(frame)) => {
                        log::warn!("Connection is not open, dropping {}-byte audio frame", frame.len());
                    }
                    Some(Command::Control(action)) => {
                        log::warn!("Connection is not open, dropping control message {:?}", action);
                    }
                    Some(Command::Shutdown) | None => return,
                }
            }
        }
        log::info!("Attempting to reconnect");
    }
}

/// Pump commands out and messages in until the connection ends one way
/// or another.
async fn drive_open_connection(
    ws: WsStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    event_tx: &mpsc::UnboundedSender<StreamEvent>,
) -> ConnectionEnd {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Frame(frame)) => {
                    if let Err(e) = transmit(&mut write, Message::Binary(frame)).await {
                        return ConnectionEnd::Closed(e);
                    }
                }
                Some(Command::Control(action)) => {
                    match serde_json::to_string(&ClientMessage::control(action)) {
                        Ok(json) => {
                            log::info!("Sending control message: {}", json);
                            if let Err(e) = transmit(&mut write, Message::Text(json)).await {
                                return ConnectionEnd::Closed(e);
                            }
                        }
                        Err(e) => {
                            log::warn!("{}", StreamingError::ProtocolError(e.to_string()));
                        }
                    }
                }
                Some(Command::Shutdown) | None => {
                    if let Err(e) = write.close().await {
                        log::warn!("Error closing WebSocket: {}", e);
                    }
                    return ConnectionEnd::Shutdown;
                }
            },
            msg = next_message(&mut read) => match msg {
                Inbound::Text(text) => handle_text_message(&text, event_tx),
                Inbound::Ended(reason) => return ConnectionEnd::Closed(reason),
            }
        }
    }
}

enum Inbound {
    Text(String),
    Ended(StreamingError),
}

async fn next_message(read: &mut WsSource) -> Inbound {
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => return Inbound::Text(text),
            Some(Ok(Message::Close(frame))) => {
                let detail = frame
                    .map(|f| format!("code={}, reason={}", u16::from(f.code), f.reason))
                    .unwrap_or_else(|| "no close frame".to_string());
                return Inbound::Ended(StreamingError::Disconnected(detail));
            }
            // Binary, ping and pong from the backend carry nothing for us.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                // An error precedes the close; the closed stream is what
                // triggers reconnection.
                log::warn!("WebSocket error: {}", e);
                return Inbound::Ended(StreamingError::Disconnected(e.to_string()));
            }
            None => return Inbound::Ended(StreamingError::Disconnected("stream ended".to_string())),
        }
    }
}

async fn transmit(write: &mut WsSink, msg: Message) -> Result<(), StreamingError> {
    write
        .send(msg)
        .await
        .map_err(|e| StreamingError::SendFailed(e.to_string()))
}

fn handle_text_message(text: &str, event_tx: &mpsc::UnboundedSender<StreamEvent>) {
    match parse_server_message(text) {
        Ok(ServerEvent::Transcript(fragment)) => {
            let _ = event_tx.send(StreamEvent::Transcript(fragment));
        }
        Ok(ServerEvent::Unknown) => {
            log::debug!("Ignoring server message without transcript text");
        }
        Err(e) => {
            log::warn!("Failed to decode server message: {}", e);
            let _ = event_tx.send(StreamEvent::DecodeError(e.to_string()));
        }
    }
}
