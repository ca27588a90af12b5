// Link Configuration
// Which transport to drive and how each adapter is set up, loadable from TOML

use crate::transport::{
    BleTransport, BleTransportConfig, DeviceTransport, DirectTransport, DirectTransportConfig,
    GattCentral, RelayTransport, RelayTransportConfig, TransportError, TransportKind,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] TransportError),
}

/// Everything needed to build the active transport
///
/// ```toml
/// transport = "direct"
///
/// [direct]
/// base_url = "http://192.168.4.1"
/// poll_interval_ms = 500
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Adapter used on startup
    pub transport: TransportKind,
    pub ble: BleTransportConfig,
    pub relay: RelayTransportConfig,
    pub direct: DirectTransportConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Relay,
            ble: BleTransportConfig::default(),
            relay: RelayTransportConfig::default(),
            direct: DirectTransportConfig::default(),
        }
    }
}

impl LinkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(mut self, kind: TransportKind) -> Self {
        self.transport = kind;
        self
    }

    pub fn with_ble(mut self, ble: BleTransportConfig) -> Self {
        self.ble = ble;
        self
    }

    pub fn with_relay(mut self, relay: RelayTransportConfig) -> Self {
        self.relay = relay;
        self
    }

    pub fn with_direct(mut self, direct: DirectTransportConfig) -> Self {
        self.direct = direct;
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate every adapter section
    pub fn validate(&self) -> Result<(), TransportError> {
        self.ble.validate()?;
        self.relay.validate()?;
        self.direct.validate()
    }

    /// Build the adapter selected by `transport`
    ///
    /// `central` is only used for BLE.
    pub fn build_transport(
        &self,
        central: Arc<dyn GattCentral>,
    ) -> Result<Arc<dyn DeviceTransport>, TransportError> {
        let transport: Arc<dyn DeviceTransport> = match self.transport {
            TransportKind::Ble => {
                self.ble.validate()?;
                Arc::new(BleTransport::new(self.ble.clone(), central))
            }
            TransportKind::Relay => Arc::new(RelayTransport::new(self.relay.clone())?),
            TransportKind::Direct => Arc::new(DirectTransport::new(self.direct.clone())?),
        };
        Ok(transport)
    }
}
