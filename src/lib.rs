// FireBot Link
// Connectivity bridge between an operator console and the FireBot rover

pub mod bridge;
pub mod command;
pub mod config;
pub mod telemetry;
pub mod transport;

pub use bridge::{BridgeError, ConnectionState, ConnectivityBridge};
pub use command::{Command, CommandCategory, CommandError};
pub use config::{ConfigError, LinkConfig};
pub use telemetry::{SensorState, TelemetryCodec};
pub use transport::{ConnectTarget, DeviceTransport, TransportError, TransportKind};
