// Transport Traits and Core Types
// Defines the DeviceTransport contract shared by the BLE, relay and direct adapters

use crate::command::Command;
use crate::telemetry::SensorState;
use crate::transport::ApiTimeouts;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// TRANSPORT CONFIG
// ============================================================================

/// Request time bounds shared by the network transports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Bound on session establishment, in milliseconds
    pub connect_timeout_ms: u64,
    /// Bound on commands and teardown, in milliseconds
    pub request_timeout_ms: u64,
    /// Bound on a single status poll, in milliseconds
    pub poll_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 3_000,
            request_timeout_ms: 2_000,
            poll_timeout_ms: 1_000,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    pub fn with_poll_timeout_ms(mut self, ms: u64) -> Self {
        self.poll_timeout_ms = ms;
        self
    }

    pub fn timeouts(&self) -> ApiTimeouts {
        ApiTimeouts {
            connect: Duration::from_millis(self.connect_timeout_ms),
            request: Duration::from_millis(self.request_timeout_ms),
            poll: Duration::from_millis(self.poll_timeout_ms),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 || self.poll_timeout_ms == 0 {
            return Err(TransportError::InvalidConfig(
                "request timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// TRANSPORT KIND
// ============================================================================

/// Which medium an adapter drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Radio pairing straight to the rover
    Ble,
    /// Local relay process bridging to the rover's serial link
    Relay,
    /// Rover's own Wi-Fi access point
    Direct,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ble => write!(f, "ble"),
            Self::Relay => write!(f, "relay"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

// ============================================================================
// CONNECT TARGET
// ============================================================================

/// Where to connect
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectTarget {
    /// Use the adapter's configured endpoint (or the device chooser for BLE)
    #[default]
    Default,
    /// Override the endpoint, e.g. `http://192.168.4.1`
    Address(String),
}

impl ConnectTarget {
    pub fn address(addr: &str) -> Self {
        Self::Address(addr.to_string())
    }

    /// Resolve against a configured base URL
    pub fn resolve<'a>(&'a self, configured: &'a str) -> &'a str {
        match self {
            Self::Default => configured,
            Self::Address(addr) => addr,
        }
    }
}

// ============================================================================
// TRANSPORT EVENTS
// ============================================================================

/// Events an adapter pushes while a session is up
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A decoded telemetry frame or poll response
    Telemetry(SensorState),
    /// The session ended without the caller asking for it
    SessionLost(String),
}

/// Callback handle an adapter uses to deliver events
///
/// Delivery is synchronous: `emit` runs the receiver on the adapter's own task.
#[derive(Clone)]
pub struct EventSink {
    handler: Arc<dyn Fn(TransportEvent) + Send + Sync>,
}

impl EventSink {
    pub fn new(handler: impl Fn(TransportEvent) + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// A sink that drops everything
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    pub fn emit(&self, event: TransportEvent) {
        (self.handler)(event);
    }

    pub fn telemetry(&self, state: SensorState) {
        self.emit(TransportEvent::Telemetry(state));
    }

    pub fn session_lost(&self, reason: impl Into<String>) {
        self.emit(TransportEvent::SessionLost(reason.into()));
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

// ============================================================================
// TRANSPORT ERRORS
// ============================================================================

/// Raw failures reported by adapters
///
/// The bridge folds these into its smaller taxonomy; see `BridgeError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Cancelled by operator")]
    Cancelled,

    #[error("Unreachable: {0}")]
    Unreachable(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Refused: {0}")]
    Refused(String),

    #[error("Channel missing: {0}")]
    ChannelMissing(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Session closed: {0}")]
    SessionClosed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TransportError {
    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Check if the operator backed out
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Re-classify a failure that happened while writing a command
    ///
    /// Once a session exists, a reachable endpoint that answers badly is
    /// refusing the write, not unreachable.
    pub fn into_write_failure(self) -> Self {
        match self {
            Self::Http { status, message } => Self::WriteFailed(format!("HTTP {}: {}", status, message)),
            Self::Refused(message) | Self::Protocol(message) => Self::WriteFailed(message),
            other => other,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Unreachable(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_decode() {
            Self::Protocol(e.to_string())
        } else {
            Self::Unreachable(e.to_string())
        }
    }
}

// ============================================================================
// TRANSPORT TRAIT
// ============================================================================

/// One physical or logical channel to the rover
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Which medium this adapter drives
    fn kind(&self) -> TransportKind;

    /// Establish a session; resolves once the session is usable
    ///
    /// Events for the session are delivered through `events` until the
    /// session ends. Implementations reject a second concurrent session with
    /// `AlreadyConnected`, and a connect overtaken by `disconnect` resolves
    /// `Cancelled` after tearing down whatever it had built.
    async fn connect(&self, target: ConnectTarget, events: EventSink) -> Result<(), TransportError>;

    /// Tear the session down; local state is always released even on error
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Write one command on the channel its category maps to
    async fn send(&self, command: Command) -> Result<(), TransportError>;
}
