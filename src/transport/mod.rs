// Transport module - THE WIRE (abstract)
// One DeviceTransport contract over BLE pairing, the local relay and the rover's own Wi-Fi

mod traits;
mod api;
mod push;
mod socketio;
mod gatt;
mod ble;
mod relay;
mod direct;
mod mock;

#[cfg(feature = "btleplug")]
mod btleplug_central;

pub use traits::{
    // Core trait
    DeviceTransport,
    // Configuration
    TransportConfig, TransportKind, ConnectTarget,
    // Events and errors
    TransportEvent, EventSink, TransportError,
};

pub use api::{ApiResponse, ApiTimeouts, DeviceApi, HttpDeviceApi, StatusResponse};

pub use push::{PushChannel, PushConnector, PushEvent, SocketIoConnector};

pub use socketio::{EngineHandshake, EnginePacket, SocketPacket, ENGINE_QUERY};

pub use gatt::{DeviceFilter, GattCentral, GattPeripheral, NotificationStream, UnavailableCentral};

pub use ble::{
    BleTransport, BleTransportConfig,
    BleService, BleCharacteristic,
};

pub use relay::{RelayTransport, RelayTransportConfig};

pub use direct::{DirectTransport, DirectTransportConfig};

pub use mock::{
    MockDeviceApi, MockGattCentral, MockGattPeripheral, MockPushConnector, MockTransport,
};

#[cfg(feature = "btleplug")]
pub use btleplug_central::BtleplugCentral;
