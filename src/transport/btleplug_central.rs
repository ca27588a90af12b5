// btleplug GATT backend
// Host BLE stack for the radio-pairing transport (enabled with the `btleplug` feature)

use crate::transport::{DeviceFilter, GattCentral, GattPeripheral, NotificationStream, TransportError};
use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Manager, Peripheral};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

impl From<btleplug::Error> for TransportError {
    fn from(e: btleplug::Error) -> Self {
        match e {
            btleplug::Error::PermissionDenied => Self::Unsupported("Bluetooth permission denied".to_string()),
            btleplug::Error::NotSupported(what) => Self::Unsupported(what),
            btleplug::Error::DeviceNotFound => Self::Unreachable("device not found".to_string()),
            btleplug::Error::NotConnected => Self::SessionClosed("peripheral not connected".to_string()),
            btleplug::Error::TimedOut(_) => Self::Timeout,
            other => Self::Unreachable(other.to_string()),
        }
    }
}

/// Scans for a short window and picks the first device whose name matches
///
/// There is no interactive chooser on a console host, so "no match" is
/// reported as unreachable rather than as an operator cancel.
#[derive(Debug, Clone)]
pub struct BtleplugCentral {
    scan_duration: Duration,
}

impl BtleplugCentral {
    pub fn new(scan_duration: Duration) -> Self {
        Self { scan_duration }
    }
}

#[async_trait]
impl GattCentral for BtleplugCentral {
    async fn request_device(
        &self,
        filter: &DeviceFilter,
    ) -> Result<Arc<dyn GattPeripheral>, TransportError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Unsupported("no Bluetooth adapter present".to_string()))?;

        info!(prefix = %filter.name_prefix, secs = self.scan_duration.as_secs(), "scanning");
        adapter.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(self.scan_duration).await;
        let peripherals = adapter.peripherals().await;
        if let Err(e) = adapter.stop_scan().await {
            debug!(error = %e, "stop_scan failed");
        }

        for peripheral in peripherals? {
            let name = match peripheral.properties().await {
                Ok(Some(properties)) => properties.local_name,
                _ => None,
            };
            if name.as_deref().is_some_and(|n| filter.matches_name(n)) {
                debug!(device = ?name, "matched");
                return Ok(Arc::new(BtleplugPeripheral { peripheral, name }));
            }
        }

        Err(TransportError::Unreachable(format!(
            "no device advertising as {}*",
            filter.name_prefix
        )))
    }
}

struct BtleplugPeripheral {
    peripheral: Peripheral,
    name: Option<String>,
}

impl BtleplugPeripheral {
    fn find(&self, uuid: Uuid) -> Result<Characteristic, TransportError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| TransportError::ChannelMissing(uuid.to_string()))
    }
}

#[async_trait]
impl GattPeripheral for BtleplugPeripheral {
    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn connect(&self) -> Result<(), TransportError> {
        self.peripheral.connect().await?;
        self.peripheral.discover_services().await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn has_characteristic(&self, service: Uuid, characteristic: Uuid) -> Result<bool, TransportError> {
        Ok(self
            .peripheral
            .characteristics()
            .iter()
            .any(|c| c.service_uuid == service && c.uuid == characteristic))
    }

    async fn write(&self, characteristic: Uuid, value: &[u8]) -> Result<(), TransportError> {
        let target = self.find(characteristic)?;
        self.peripheral
            .write(&target, value, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream, TransportError> {
        let target = self.find(characteristic)?;
        self.peripheral.subscribe(&target).await?;
        let notifications = self.peripheral.notifications().await?;

        Ok(notifications
            .filter_map(move |n| {
                futures_util::future::ready((n.uuid == characteristic).then_some(n.value))
            })
            .boxed())
    }
}
