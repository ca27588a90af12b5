// BLE Transport Implementation
// Radio pairing straight to the rover: two write characteristics for commands,
// one notify characteristic for telemetry

use crate::command::{Command, CommandCategory};
use crate::telemetry::TelemetryCodec;
use crate::transport::{
    ConnectTarget, DeviceFilter, DeviceTransport, EventSink, GattCentral, GattPeripheral,
    NotificationStream, TransportError, TransportKind,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::{uuid, Uuid};

// ============================================================================
// BLE SERVICE AND CHARACTERISTIC
// ============================================================================

/// BLE GATT Service definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleService {
    uuid: Uuid,
    characteristics: Vec<BleCharacteristic>,
}

impl BleService {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristics: Vec::new(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn characteristics(&self) -> &[BleCharacteristic] {
        &self.characteristics
    }

    pub fn with_characteristic(mut self, characteristic: BleCharacteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }
}

/// BLE GATT Characteristic definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleCharacteristic {
    label: String,
    uuid: Uuid,
    write: bool,
    notify: bool,
}

impl BleCharacteristic {
    pub fn new(label: &str, uuid: Uuid) -> Self {
        Self {
            label: label.to_string(),
            uuid,
            write: false,
            notify: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn with_write(mut self) -> Self {
        self.write = true;
        self
    }

    pub fn with_notify(mut self) -> Self {
        self.notify = true;
        self
    }

    pub fn can_write(&self) -> bool {
        self.write
    }

    pub fn can_notify(&self) -> bool {
        self.notify
    }
}

// ============================================================================
// BLE TRANSPORT CONFIG
// ============================================================================

/// Configuration for BLE transport
///
/// Defaults match the rover firmware's GATT table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleTransportConfig {
    /// Advertised name prefix offered in the device chooser
    pub name_prefix: String,
    /// Primary service
    pub service_uuid: Uuid,
    /// Write characteristic for F/B/L/R/S
    pub movement_uuid: Uuid,
    /// Write characteristic for P1/P0/EXTINGUISH
    pub actuator_uuid: Uuid,
    /// Notify characteristic carrying telemetry lines
    pub telemetry_uuid: Uuid,
    /// Scan window before choosing, for stacks that scan
    pub scan_duration_secs: u32,
}

impl Default for BleTransportConfig {
    fn default() -> Self {
        Self {
            name_prefix: "FireBot".to_string(),
            service_uuid: uuid!("4fafc201-1fb5-459e-8fcc-c5c9c331914b"),
            movement_uuid: uuid!("beb5483e-36e1-4688-b7f5-ea07361b26a8"),
            actuator_uuid: uuid!("beb5483e-36e1-4688-b7f5-ea07361b26a9"),
            telemetry_uuid: uuid!("beb5483e-36e1-4688-b7f5-ea07361b26aa"),
            scan_duration_secs: 5,
        }
    }
}

impl BleTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name_prefix(mut self, prefix: &str) -> Self {
        self.name_prefix = prefix.to_string();
        self
    }

    pub fn with_service_uuid(mut self, uuid: Uuid) -> Self {
        self.service_uuid = uuid;
        self
    }

    pub fn with_movement_uuid(mut self, uuid: Uuid) -> Self {
        self.movement_uuid = uuid;
        self
    }

    pub fn with_actuator_uuid(mut self, uuid: Uuid) -> Self {
        self.actuator_uuid = uuid;
        self
    }

    pub fn with_telemetry_uuid(mut self, uuid: Uuid) -> Self {
        self.telemetry_uuid = uuid;
        self
    }

    pub fn with_scan_duration_secs(mut self, secs: u32) -> Self {
        self.scan_duration_secs = secs;
        self
    }

    pub fn device_filter(&self) -> DeviceFilter {
        DeviceFilter::new(&self.name_prefix, self.service_uuid)
    }

    /// The GATT layout the rover must expose
    pub fn service(&self) -> BleService {
        BleService::new(self.service_uuid)
            .with_characteristic(BleCharacteristic::new("movement", self.movement_uuid).with_write())
            .with_characteristic(BleCharacteristic::new("actuator", self.actuator_uuid).with_write())
            .with_characteristic(
                BleCharacteristic::new("telemetry", self.telemetry_uuid).with_notify(),
            )
    }

    /// Which characteristic a command category is written to
    pub fn characteristic_for(&self, category: CommandCategory) -> Uuid {
        match category {
            CommandCategory::Movement => self.movement_uuid,
            CommandCategory::Actuator => self.actuator_uuid,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.name_prefix.is_empty() {
            return Err(TransportError::InvalidConfig("name_prefix is empty".to_string()));
        }
        if self.scan_duration_secs == 0 {
            return Err(TransportError::InvalidConfig(
                "scan_duration_secs must be > 0".to_string(),
            ));
        }
        let channels = [self.movement_uuid, self.actuator_uuid, self.telemetry_uuid];
        if channels[0] == channels[1] || channels[0] == channels[2] || channels[1] == channels[2] {
            return Err(TransportError::InvalidConfig(
                "movement, actuator and telemetry characteristics must differ".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// BLE TRANSPORT
// ============================================================================

struct BleSession {
    generation: u64,
    peripheral: Arc<dyn GattPeripheral>,
    listener: JoinHandle<()>,
}

type SessionSlot = Arc<Mutex<Option<BleSession>>>;

/// Radio-pairing transport
pub struct BleTransport {
    config: BleTransportConfig,
    central: Arc<dyn GattCentral>,
    generation: AtomicU64,
    session: SessionSlot,
}

impl BleTransport {
    pub fn new(config: BleTransportConfig, central: Arc<dyn GattCentral>) -> Self {
        Self {
            config,
            central,
            generation: AtomicU64::new(0),
            session: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &BleTransportConfig {
        &self.config
    }

    /// Name of the paired device, if any
    pub fn device_name(&self) -> Option<String> {
        self.session.lock().as_ref().and_then(|s| s.peripheral.name())
    }

    /// Check every characteristic in the layout is present
    async fn resolve_channels(&self, peripheral: &dyn GattPeripheral) -> Result<(), TransportError> {
        let service = self.config.service();
        for characteristic in service.characteristics() {
            if !peripheral
                .has_characteristic(service.uuid(), characteristic.uuid())
                .await?
            {
                return Err(TransportError::ChannelMissing(format!(
                    "{} characteristic {}",
                    characteristic.label(),
                    characteristic.uuid()
                )));
            }
        }
        Ok(())
    }

    /// Resolve channels and subscribe to telemetry on a freshly connected peripheral
    async fn open_channels(&self, peripheral: &dyn GattPeripheral) -> Result<NotificationStream, TransportError> {
        self.resolve_channels(peripheral).await?;
        peripheral.subscribe(self.config.telemetry_uuid).await
    }
}

#[async_trait]
impl DeviceTransport for BleTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ble
    }

    async fn connect(&self, target: ConnectTarget, events: EventSink) -> Result<(), TransportError> {
        if let ConnectTarget::Address(address) = &target {
            return Err(TransportError::Unsupported(format!(
                "BLE pairing goes through the device chooser, not an address ({})",
                address
            )));
        }
        if self.session.lock().is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let peripheral = self.central.request_device(&self.config.device_filter()).await?;
        let name = peripheral.name().unwrap_or_else(|| "unknown".to_string());
        info!(device = %name, "negotiating GATT session");

        peripheral.connect().await?;

        let notifications = match self.open_channels(peripheral.as_ref()).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(device = %name, error = %e, "GATT channel setup failed");
                if let Err(e) = peripheral.disconnect().await {
                    warn!(device = %name, error = %e, "teardown after failed setup failed");
                }
                return Err(e);
            }
        };

        let listener = tokio::spawn(listen_for_telemetry(
            notifications,
            events,
            self.session.clone(),
            generation,
        ));

        let rejected = {
            let mut slot = self.session.lock();
            if listener.is_finished() {
                Some((
                    listener,
                    TransportError::SessionClosed("peripheral dropped while pairing".to_string()),
                ))
            } else if self.generation.load(Ordering::SeqCst) != generation || slot.is_some() {
                Some((listener, TransportError::Cancelled))
            } else {
                *slot = Some(BleSession {
                    generation,
                    peripheral: peripheral.clone(),
                    listener,
                });
                None
            }
        };

        if let Some((listener, error)) = rejected {
            listener.abort();
            if let Err(e) = peripheral.disconnect().await {
                warn!(device = %name, error = %e, "teardown of abandoned GATT session failed");
            }
            return Err(error);
        }

        info!(device = %name, "paired");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let session = self.session.lock().take();

        match session {
            Some(session) => {
                session.listener.abort();
                session.peripheral.disconnect().await
            }
            None => Ok(()),
        }
    }

    async fn send(&self, command: Command) -> Result<(), TransportError> {
        let peripheral = self
            .session
            .lock()
            .as_ref()
            .map(|s| s.peripheral.clone())
            .ok_or(TransportError::NotConnected)?;

        let characteristic = self.config.characteristic_for(command.category());
        peripheral
            .write(characteristic, command.wire_bytes())
            .await
            .map_err(|e| match e {
                TransportError::SessionClosed(_) | TransportError::ChannelMissing(_) => e,
                other => TransportError::WriteFailed(other.to_string()),
            })?;

        debug!(%command, %characteristic, "command written");
        Ok(())
    }
}

/// Decode every notification until the peripheral drops the link
async fn listen_for_telemetry(
    mut notifications: NotificationStream,
    events: EventSink,
    session: SessionSlot,
    generation: u64,
) {
    while let Some(payload) = notifications.next().await {
        events.telemetry(TelemetryCodec::decode_bytes(&payload));
    }

    let owned = {
        let mut slot = session.lock();
        let owned = matches!(slot.as_ref(), Some(s) if s.generation == generation);
        if owned {
            *slot = None;
        }
        owned
    };

    if owned {
        warn!("peripheral dropped the GATT session");
        events.session_lost("peripheral disconnected");
    }
}
