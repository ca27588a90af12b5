// GATT Seam
// The slice of a BLE central stack the radio-pairing transport needs

use crate::transport::TransportError;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::sync::Arc;
use uuid::Uuid;

/// Raw notification payloads from one characteristic
///
/// The stream ends when the peripheral drops the link.
pub type NotificationStream = BoxStream<'static, Vec<u8>>;

/// What the device chooser offers to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    /// Advertised local name prefix
    pub name_prefix: String,
    /// Primary service the device must expose
    pub service: Uuid,
}

impl DeviceFilter {
    pub fn new(name_prefix: &str, service: Uuid) -> Self {
        Self {
            name_prefix: name_prefix.to_string(),
            service,
        }
    }

    pub fn matches_name(&self, name: &str) -> bool {
        name.starts_with(&self.name_prefix)
    }
}

/// Host-side BLE stack: finds a device for the operator
#[async_trait]
pub trait GattCentral: Send + Sync {
    /// Let the operator pick a device; `Cancelled` when they back out
    async fn request_device(
        &self,
        filter: &DeviceFilter,
    ) -> Result<Arc<dyn GattPeripheral>, TransportError>;
}

/// A chosen device
#[async_trait]
pub trait GattPeripheral: Send + Sync {
    fn name(&self) -> Option<String>;

    /// Negotiate the GATT session and discover services
    async fn connect(&self) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    async fn has_characteristic(&self, service: Uuid, characteristic: Uuid) -> Result<bool, TransportError>;

    async fn write(&self, characteristic: Uuid, value: &[u8]) -> Result<(), TransportError>;

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream, TransportError>;
}

/// Central for hosts built without a BLE stack
#[derive(Debug, Clone, Default)]
pub struct UnavailableCentral;

#[async_trait]
impl GattCentral for UnavailableCentral {
    async fn request_device(
        &self,
        _filter: &DeviceFilter,
    ) -> Result<Arc<dyn GattPeripheral>, TransportError> {
        Err(TransportError::Unsupported(
            "Bluetooth is not available in this build".to_string(),
        ))
    }
}
