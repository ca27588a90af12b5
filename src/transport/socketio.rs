// Socket.IO Framing
// Engine.IO v4 packets wrapping Socket.IO v5 packets, one per WebSocket text frame

use crate::transport::{PushEvent, TransportError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Query selecting Engine.IO v4 straight over WebSocket, with no polling upgrade
pub const ENGINE_QUERY: &str = "EIO=4&transport=websocket";

fn protocol(message: impl Into<String>) -> TransportError {
    TransportError::Protocol(message.into())
}

/// Split off the one-digit packet type
fn packet_type(frame: &str) -> Result<(u8, &str), TransportError> {
    match frame.as_bytes().first() {
        Some(kind) if kind.is_ascii_digit() => Ok((*kind, &frame[1..])),
        _ => Err(protocol(format!("not a socket.io packet: {:?}", frame))),
    }
}

// ============================================================================
// ENGINE HANDSHAKE
// ============================================================================

/// Body of the Engine.IO `open` packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineHandshake {
    pub sid: String,
    /// Server ping period in milliseconds
    pub ping_interval: u64,
    /// Grace after a missed ping in milliseconds
    pub ping_timeout: u64,
}

impl EngineHandshake {
    /// Longest silence from the server before the link counts as dead
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

// ============================================================================
// ENGINE PACKETS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(EngineHandshake),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self, TransportError> {
        let (kind, body) = packet_type(frame)?;
        match kind {
            b'0' => serde_json::from_str(body)
                .map(Self::Open)
                .map_err(|e| protocol(format!("engine open: {}", e))),
            b'1' => Ok(Self::Close),
            b'2' => Ok(Self::Ping),
            b'3' => Ok(Self::Pong),
            b'4' => SocketPacket::decode(body).map(Self::Message),
            b'5' => Ok(Self::Upgrade),
            b'6' => Ok(Self::Noop),
            _ => Err(protocol(format!("unknown engine packet type in {:?}", frame))),
        }
    }

    pub fn encode(&self) -> Result<String, TransportError> {
        match self {
            Self::Open(handshake) => serde_json::to_string(handshake)
                .map(|body| format!("0{}", body))
                .map_err(|e| protocol(e.to_string())),
            Self::Close => Ok("1".to_string()),
            Self::Ping => Ok("2".to_string()),
            Self::Pong => Ok("3".to_string()),
            Self::Message(packet) => packet.encode().map(|body| format!("4{}", body)),
            Self::Upgrade => Ok("5".to_string()),
            Self::Noop => Ok("6".to_string()),
        }
    }
}

// ============================================================================
// SOCKET PACKETS
// ============================================================================

/// Socket.IO packets on the default namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketPacket {
    /// Join request from the client, or the server's acknowledgement
    Connect,
    Disconnect,
    Event(PushEvent),
    /// The server refused the namespace join
    ConnectError(String),
}

impl SocketPacket {
    pub fn decode(body: &str) -> Result<Self, TransportError> {
        let (kind, rest) = packet_type(body)?;

        // Optional "/namespace," then optional ack id
        let rest = match rest.strip_prefix('/') {
            Some(named) => named.split_once(',').map_or("", |(_, payload)| payload),
            None => rest,
        };
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

        match kind {
            b'0' => Ok(Self::Connect),
            b'1' => Ok(Self::Disconnect),
            b'2' => decode_event(rest).map(Self::Event),
            b'4' => Ok(Self::ConnectError(connect_error_message(rest))),
            b'5' | b'6' => Err(protocol("binary socket.io packets are not supported")),
            _ => Err(protocol(format!("unexpected socket.io packet {:?}", body))),
        }
    }

    pub fn encode(&self) -> Result<String, TransportError> {
        match self {
            Self::Connect => Ok("0".to_string()),
            Self::Disconnect => Ok("1".to_string()),
            Self::Event(event) => encode_event(event).map(|args| format!("2{}", args)),
            Self::ConnectError(message) => Ok(format!("4{}", json!({ "message": message }))),
        }
    }
}

/// `["sensor_data", {...}]` into a `PushEvent`
fn decode_event(payload: &str) -> Result<PushEvent, TransportError> {
    let args: Vec<Value> =
        serde_json::from_str(payload).map_err(|e| protocol(format!("event arguments: {}", e)))?;
    let mut args = args.into_iter();

    let name = match args.next() {
        Some(Value::String(name)) => name,
        _ => return Err(protocol("event without a name")),
    };
    let data = args.next().unwrap_or(Value::Null);

    serde_json::from_value(json!({ "event": name, "data": data }))
        .map_err(|e| protocol(format!("event {}: {}", name, e)))
}

fn encode_event(event: &PushEvent) -> Result<String, TransportError> {
    let mut tagged = match serde_json::to_value(event) {
        Ok(Value::Object(map)) => map,
        Ok(other) => return Err(protocol(format!("push event encoded as {}", other))),
        Err(e) => return Err(protocol(e.to_string())),
    };
    let name = tagged.remove("event").unwrap_or(Value::Null);
    let data = tagged.remove("data").unwrap_or(Value::Null);
    Ok(json!([name, data]).to_string())
}

fn connect_error_message(payload: &str) -> String {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => match map.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => payload.to_string(),
        },
        Ok(Value::String(message)) => message,
        _ if payload.is_empty() => "namespace refused".to_string(),
        _ => payload.to_string(),
    }
}
