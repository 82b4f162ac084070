//! Connection manager: owns the single real-time channel to the backend.
//!
//! `connect` opens a WebSocket, speaks Engine.IO/Socket.IO through
//! [`ChannelProtocol`] and hands back one receiver of [`ChannelEvent`]s.
//! Connecting again closes the previous channel first. Transport failures
//! surface as `Disconnected`; retrying is the caller's business.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::socketio::{
    self, CONNECT_DEFAULT_NAMESPACE, ChannelFrame, DEFAULT_NAMESPACE, EnginePacket, SocketPacket,
    channel_frame,
};

const EVENT_BUFFER: usize = 256;
const OUTBOUND_BUFFER: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("websocket connect to {url} failed: {source}")]
    Connect {
        url: String,
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("channel is not connected")]
    NotConnected,
}

/// What the host sees from the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    Frame(ChannelFrame),
    Disconnected { reason: String },
}

// ─── Protocol State Machine ───────────────────────────────────────

/// Reaction to one inbound text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolAction {
    /// Text to write back on the socket.
    Reply(String),
    Emit(ChannelEvent),
    /// Channel is finished; emit `Disconnected` with this reason and stop.
    Close(String),
}

/// Pure Engine.IO/Socket.IO client handshake and dispatch.
#[derive(Debug, Default)]
pub struct ChannelProtocol {
    connected: bool,
}

impl ChannelProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn on_text(&mut self, text: &str) -> Vec<ProtocolAction> {
        let packet = match socketio::decode_engine(text) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!("ignoring engine.io packet: {e}");
                return Vec::new();
            }
        };

        match packet {
            EnginePacket::Open(handshake) => {
                tracing::debug!(%handshake, "engine.io open");
                vec![ProtocolAction::Reply(CONNECT_DEFAULT_NAMESPACE.to_string())]
            }
            EnginePacket::Ping(data) => vec![ProtocolAction::Reply(socketio::encode_pong(&data))],
            EnginePacket::Close => vec![ProtocolAction::Close("server closed".to_string())],
            EnginePacket::Message(inner) => self.on_socket_packet(&inner),
            EnginePacket::Pong | EnginePacket::Upgrade | EnginePacket::Noop => Vec::new(),
        }
    }

    fn on_socket_packet(&mut self, text: &str) -> Vec<ProtocolAction> {
        let packet = match socketio::decode_socket(text) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("ignoring socket.io packet: {e}");
                return Vec::new();
            }
        };

        if packet.namespace() != DEFAULT_NAMESPACE {
            tracing::debug!(namespace = packet.namespace(), "ignoring packet for other namespace");
            return Vec::new();
        }

        match packet {
            SocketPacket::Connect { body, .. } => {
                self.connected = true;
                let sid = body
                    .as_ref()
                    .and_then(|b| b.get("sid"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                tracing::debug!(sid, "socket.io connected");
                vec![ProtocolAction::Emit(ChannelEvent::Connected)]
            }
            SocketPacket::Event {
                name, args, ack_id, ..
            } => {
                if let Some(ack_id) = ack_id {
                    tracing::debug!(ack_id, event = %name, "server asked for an ack; not sent");
                }
                vec![ProtocolAction::Emit(ChannelEvent::Frame(channel_frame(&name, &args)))]
            }
            SocketPacket::Disconnect { .. } => {
                self.connected = false;
                vec![ProtocolAction::Close("server disconnected".to_string())]
            }
            SocketPacket::ConnectError { message, .. } => {
                self.connected = false;
                vec![ProtocolAction::Close(format!("connect error: {message}"))]
            }
            SocketPacket::Ack { ack_id, .. } => {
                tracing::debug!(?ack_id, "unexpected ack");
                Vec::new()
            }
        }
    }
}

// ─── Connection Manager ───────────────────────────────────────────

/// Outbound side of the channel.
#[allow(async_fn_in_trait)]
pub trait EventSink {
    /// Emit one event. `Ok` means the frame was queued on a live channel.
    async fn emit(&self, event: &str, payload: &Value) -> Result<(), ConnectionError>;
}

struct ActiveChannel {
    cancel: CancellationToken,
    outbound: mpsc::Sender<String>,
    connected: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

pub struct ConnectionManager {
    url: String,
    active: Option<ActiveChannel>,
}

impl ConnectionManager {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            active: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open a fresh channel, closing any previous one.
    pub async fn connect(&mut self) -> Result<mpsc::Receiver<ChannelEvent>, ConnectionError> {
        self.disconnect();

        let (ws, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|source| ConnectionError::Connect {
                url: self.url.clone(),
                source,
            })?;
        tracing::info!(url = %self.url, "channel transport open");

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let cancel = CancellationToken::new();
        let connected = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(pump(
            ws,
            events_tx,
            outbound_rx,
            cancel.clone(),
            connected.clone(),
        ));

        self.active = Some(ActiveChannel {
            cancel,
            outbound: outbound_tx,
            connected,
            task,
        });
        Ok(events_rx)
    }

    /// Close the current channel, if any. The receiver then yields
    /// `Disconnected` and ends.
    pub fn disconnect(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            tracing::debug!(url = %self.url, "channel closed by client");
            drop(active.task);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.connected.load(Ordering::Acquire) && !a.task.is_finished())
    }

    /// Emit a Socket.IO event with a single argument.
    pub async fn send(&self, event: &str, payload: &Value) -> Result<(), ConnectionError> {
        let active = self.active.as_ref().ok_or(ConnectionError::NotConnected)?;
        if !active.connected.load(Ordering::Acquire) {
            return Err(ConnectionError::NotConnected);
        }
        active
            .outbound
            .send(socketio::encode_event(event, payload))
            .await
            .map_err(|_| ConnectionError::NotConnected)
    }
}

impl EventSink for ConnectionManager {
    async fn emit(&self, event: &str, payload: &Value) -> Result<(), ConnectionError> {
        self.send(event, payload).await
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn pump<S>(
    ws: tokio_tungstenite::WebSocketStream<S>,
    events: mpsc::Sender<ChannelEvent>,
    mut outbound: mpsc::Receiver<String>,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws.split();
    let mut protocol = ChannelProtocol::new();

    let reason = 'outer: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break 'outer "client disconnected".to_string();
            }
            Some(text) = outbound.recv() => {
                if let Err(e) = write.send(Message::Text(text)).await {
                    break 'outer format!("send failed: {e}");
                }
            }
            msg = read.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break 'outer "transport closed".to_string(),
                    Some(Ok(_)) => continue 'outer,
                    Some(Err(e)) => break 'outer format!("transport error: {e}"),
                };
                for action in protocol.on_text(&text) {
                    match action {
                        ProtocolAction::Reply(reply) => {
                            if let Err(e) = write.send(Message::Text(reply)).await {
                                break 'outer format!("send failed: {e}");
                            }
                        }
                        ProtocolAction::Emit(event) => {
                            if matches!(event, ChannelEvent::Connected) {
                                connected.store(protocol.is_connected(), Ordering::Release);
                                tracing::info!("channel connected");
                            }
                            if events.send(event).await.is_err() {
                                break 'outer "receiver dropped".to_string();
                            }
                        }
                        ProtocolAction::Close(reason) => break 'outer reason,
                    }
                }
            }
        }
    };

    connected.store(false, Ordering::Release);
    tracing::info!(%reason, "channel disconnected");
    let _ = events.send(ChannelEvent::Disconnected { reason }).await;
}
