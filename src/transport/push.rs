// Relay Push Channel
// Socket.IO connection to the relay carrying `connection_status`, `sensor_data`,
// `send_command` and `command_response` events

use crate::telemetry::SensorPayload;
use crate::transport::socketio::{EngineHandshake, EnginePacket, SocketPacket};
use crate::transport::TransportError;
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

const INBOUND_BUFFER: usize = 64;
const OUTBOUND_BUFFER: usize = 16;

// ============================================================================
// PUSH EVENTS
// ============================================================================

/// Events exchanged with the relay
///
/// Serialized adjacently tagged (`{"event": .., "data": ..}`), which maps
/// one-to-one onto a Socket.IO `[name, data]` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    /// Relay's link to the rover went up or down
    ConnectionStatus { connected: bool },
    /// Latest decoded sensor reading
    SensorData(SensorPayload),
    /// Fire-and-forget command (client to relay)
    SendCommand { command: String },
    /// Relay's verdict on a `SendCommand`
    CommandResponse {
        success: bool,
        command: String,
        #[serde(default)]
        error: Option<String>,
    },
}

// ============================================================================
// PUSH CHANNEL
// ============================================================================

/// Both directions of an open push channel
///
/// The channel is gone once `inbound` yields `None`.
#[derive(Debug)]
pub struct PushChannel {
    pub inbound: mpsc::Receiver<PushEvent>,
    pub outbound: mpsc::Sender<PushEvent>,
}

/// Opens push channels to a relay
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn open(&self, url: &str) -> Result<PushChannel, TransportError>;
}

// ============================================================================
// SOCKET.IO CONNECTOR
// ============================================================================

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket.IO client over tokio-tungstenite
///
/// Expects a `ws://host/socket.io/?EIO=4&transport=websocket` URL. The open
/// completes once the default namespace is joined.
#[derive(Debug, Clone)]
pub struct SocketIoConnector {
    open_timeout: Duration,
}

impl SocketIoConnector {
    pub fn new(open_timeout: Duration) -> Self {
        Self { open_timeout }
    }
}

#[async_trait]
impl PushConnector for SocketIoConnector {
    async fn open(&self, url: &str) -> Result<PushChannel, TransportError> {
        let (socket, handshake) = timeout(self.open_timeout, join(url))
            .await
            .map_err(|_| TransportError::Timeout)??;

        debug!(%url, sid = %handshake.sid, "push channel open");

        let (inbound_tx, inbound_rx) = mpsc::channel::<PushEvent>(INBOUND_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::channel::<PushEvent>(OUTBOUND_BUFFER);
        tokio::spawn(pump(socket, handshake.liveness_window(), inbound_tx, outbound_rx));

        Ok(PushChannel {
            inbound: inbound_rx,
            outbound: outbound_tx,
        })
    }
}

/// Engine.IO handshake followed by the default namespace join
async fn join(url: &str) -> Result<(Socket, EngineHandshake), TransportError> {
    let (mut socket, _) = connect_async(url)
        .await
        .map_err(|e| TransportError::Unreachable(format!("push channel {}: {}", url, e)))?;

    let handshake = match next_packet(&mut socket).await? {
        EnginePacket::Open(handshake) => handshake,
        other => {
            return Err(TransportError::Protocol(format!(
                "expected engine open, got {:?}",
                other
            )))
        }
    };

    send_packet(&mut socket, &EnginePacket::Message(SocketPacket::Connect)).await?;

    loop {
        match next_packet(&mut socket).await? {
            EnginePacket::Message(SocketPacket::Connect) => break,
            EnginePacket::Message(SocketPacket::ConnectError(message)) => {
                return Err(TransportError::Refused(message))
            }
            EnginePacket::Ping => send_packet(&mut socket, &EnginePacket::Pong).await?,
            EnginePacket::Close => {
                return Err(TransportError::SessionClosed(
                    "relay closed the push channel during the handshake".to_string(),
                ))
            }
            other => debug!(?other, "skipping packet before namespace join"),
        }
    }

    Ok((socket, handshake))
}

async fn next_packet(socket: &mut Socket) -> Result<EnginePacket, TransportError> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => return EnginePacket::decode(&text),
            Some(Ok(Message::Close(_))) | None => {
                return Err(TransportError::SessionClosed(
                    "relay closed the push channel".to_string(),
                ))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(TransportError::Unreachable(e.to_string())),
        }
    }
}

async fn send_packet<S>(writer: &mut S, packet: &EnginePacket) -> Result<(), TransportError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let text = packet.encode()?;
    writer
        .send(Message::Text(text))
        .await
        .map_err(|e| TransportError::SessionClosed(format!("push channel write failed: {}", e)))
}

/// Moves events between the socket and the channel pair, answering pings
///
/// Ends when the relay closes, goes silent past its liveness window, or
/// either side of the channel pair is dropped.
async fn pump(
    socket: Socket,
    window: Duration,
    inbound: mpsc::Sender<PushEvent>,
    mut outbound: mpsc::Receiver<PushEvent>,
) {
    let (mut writer, mut reader) = socket.split();
    let mut deadline = Instant::now() + window;

    loop {
        tokio::select! {
            frame = reader.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "push channel read failed");
                        break;
                    }
                };
                deadline = Instant::now() + window;

                match EnginePacket::decode(&text) {
                    Ok(EnginePacket::Ping) => {
                        if send_packet(&mut writer, &EnginePacket::Pong).await.is_err() {
                            break;
                        }
                    }
                    Ok(EnginePacket::Message(SocketPacket::Event(event))) => {
                        if inbound.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(EnginePacket::Close) | Ok(EnginePacket::Message(SocketPacket::Disconnect)) => {
                        debug!("relay closed the push channel");
                        break;
                    }
                    Ok(other) => debug!(?other, "ignoring push packet"),
                    Err(e) => warn!(error = %e, frame = %text, "unrecognised push frame"),
                }
            }
            event = outbound.recv() => {
                let Some(event) = event else { break };
                let packet = EnginePacket::Message(SocketPacket::Event(event));
                if let Err(e) = send_packet(&mut writer, &packet).await {
                    warn!(error = %e, "push channel write failed");
                    break;
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                warn!(window_ms = window.as_millis() as u64, "relay stopped pinging");
                break;
            }
            _ = inbound.closed() => break,
        }
    }

    if let Err(e) = writer.close().await {
        debug!(error = %e, "push channel close failed");
    }
    debug!("push channel pump finished");
}
