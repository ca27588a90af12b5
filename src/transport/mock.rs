// Transport Mocks
// In-process stand-ins for adapters, the device REST surface, the relay push channel and the GATT stack

use crate::command::Command;
use crate::transport::{
    BleTransportConfig, ConnectTarget, DeviceApi, DeviceFilter, DeviceTransport, EventSink,
    GattCentral, GattPeripheral, NotificationStream, PushChannel, PushConnector, PushEvent,
    StatusResponse, TransportError, TransportEvent, TransportKind,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

async fn delay(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

/// Mock implementation of DeviceTransport for bridge tests
pub struct MockTransport {
    kind: TransportKind,
    connect_result: Result<(), TransportError>,
    send_result: Result<(), TransportError>,
    disconnect_result: Result<(), TransportError>,
    connect_delay_ms: u64,
    sink: Mutex<Option<EventSink>>,
    sent: Mutex<Vec<Command>>,
    connect_calls: AtomicUsize,
    send_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
}

impl MockTransport {
    /// Create a mock that accepts every call
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            connect_result: Ok(()),
            send_result: Ok(()),
            disconnect_result: Ok(()),
            connect_delay_ms: 0,
            sink: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            connect_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_connect_error(mut self, error: TransportError) -> Self {
        self.connect_result = Err(error);
        self
    }

    pub fn with_send_error(mut self, error: TransportError) -> Self {
        self.send_result = Err(error);
        self
    }

    pub fn with_disconnect_error(mut self, error: TransportError) -> Self {
        self.disconnect_result = Err(error);
        self
    }

    /// Hold `connect` open for a while before resolving
    pub fn with_connect_delay_ms(mut self, ms: u64) -> Self {
        self.connect_delay_ms = ms;
        self
    }

    /// Push an event through the sink of the last `connect`
    ///
    /// Returns false when no sink has been handed over yet.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let sink = self.sink.lock().clone();
        match sink {
            Some(sink) => {
                sink.emit(event);
                true
            }
            None => false,
        }
    }

    pub fn sent_commands(&self) -> Vec<Command> {
        self.sent.lock().clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceTransport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn connect(&self, _target: ConnectTarget, events: EventSink) -> Result<(), TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock() = Some(events);
        delay(self.connect_delay_ms).await;
        self.connect_result.clone()
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.disconnect_result.clone()
    }

    async fn send(&self, command: Command) -> Result<(), TransportError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.send_result.clone()?;
        self.sent.lock().push(command);
        Ok(())
    }
}

// ============================================================================
// MOCK DEVICE API
// ============================================================================

/// Mock implementation of the device REST surface
pub struct MockDeviceApi {
    connect_result: Result<(), TransportError>,
    disconnect_result: Result<(), TransportError>,
    send_result: Result<(), TransportError>,
    status: Mutex<Result<StatusResponse, TransportError>>,
    healthy: bool,
    connect_delay_ms: u64,
    commands: Mutex<Vec<String>>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl MockDeviceApi {
    /// Create a mock endpoint that accepts everything and reports no sensor data
    pub fn new() -> Self {
        Self {
            connect_result: Ok(()),
            disconnect_result: Ok(()),
            send_result: Ok(()),
            status: Mutex::new(Ok(StatusResponse::default())),
            healthy: true,
            connect_delay_ms: 0,
            commands: Mutex::new(Vec::new()),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_connect_error(mut self, error: TransportError) -> Self {
        self.connect_result = Err(error);
        self
    }

    pub fn with_disconnect_error(mut self, error: TransportError) -> Self {
        self.disconnect_result = Err(error);
        self
    }

    pub fn with_send_error(mut self, error: TransportError) -> Self {
        self.send_result = Err(error);
        self
    }

    pub fn with_status(self, status: StatusResponse) -> Self {
        *self.status.lock() = Ok(status);
        self
    }

    pub fn with_status_error(self, error: TransportError) -> Self {
        *self.status.lock() = Err(error);
        self
    }

    pub fn with_unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn with_connect_delay_ms(mut self, ms: u64) -> Self {
        self.connect_delay_ms = ms;
        self
    }

    /// Change what later status polls return
    pub fn set_status(&self, status: Result<StatusResponse, TransportError>) {
        *self.status.lock() = status;
    }

    /// Wire tokens received, in order
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockDeviceApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceApi for MockDeviceApi {
    async fn connect(&self, _base_url: &str) -> Result<(), TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        delay(self.connect_delay_ms).await;
        self.connect_result.clone()
    }

    async fn disconnect(&self, _base_url: &str) -> Result<(), TransportError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.disconnect_result.clone()
    }

    async fn send_command(&self, _base_url: &str, token: &str) -> Result<(), TransportError> {
        self.send_result.clone()?;
        self.commands.lock().push(token.to_string());
        Ok(())
    }

    async fn status(&self, _base_url: &str) -> Result<StatusResponse, TransportError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.status.lock().clone()
    }

    async fn health(&self, _base_url: &str) -> bool {
        self.healthy
    }
}

// ============================================================================
// MOCK PUSH CONNECTOR
// ============================================================================

struct PushPeer {
    inbound: mpsc::Sender<PushEvent>,
    outbound: mpsc::Receiver<PushEvent>,
}

/// Mock relay push endpoint
///
/// Each `open` consumes one unit of the open budget; once it is spent every
/// further open fails as unreachable.
pub struct MockPushConnector {
    remaining_opens: AtomicUsize,
    opens: AtomicUsize,
    peer: Mutex<Option<PushPeer>>,
    mirrored: Mutex<Vec<PushEvent>>,
}

impl MockPushConnector {
    /// Create a connector that accepts every open
    pub fn new() -> Self {
        Self::with_open_budget(usize::MAX)
    }

    /// Accept only the first `opens` opens
    pub fn with_open_budget(opens: usize) -> Self {
        Self {
            remaining_opens: AtomicUsize::new(opens),
            opens: AtomicUsize::new(0),
            peer: Mutex::new(None),
            mirrored: Mutex::new(Vec::new()),
        }
    }

    /// Number of open attempts so far, successful or not
    pub fn open_calls(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Deliver a frame on the current channel as if the relay sent it
    pub async fn push(&self, event: PushEvent) -> bool {
        let sender = self.peer.lock().as_ref().map(|p| p.inbound.clone());
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Close the current channel from the relay side
    pub fn drop_channel(&self) {
        self.peer.lock().take();
    }

    /// Frames the client wrote on the current channel
    pub fn mirrored(&self) -> Vec<PushEvent> {
        let mut peer = self.peer.lock();
        if let Some(peer) = peer.as_mut() {
            while let Ok(event) = peer.outbound.try_recv() {
                self.mirrored.lock().push(event);
            }
        }
        self.mirrored.lock().clone()
    }
}

impl Default for MockPushConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushConnector for MockPushConnector {
    async fn open(&self, url: &str) -> Result<PushChannel, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let granted = self
            .remaining_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !granted {
            return Err(TransportError::Unreachable(format!("push channel {} refused", url)));
        }

        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let (outbound_tx, outbound_rx) = mpsc::channel(16);
        *self.peer.lock() = Some(PushPeer {
            inbound: inbound_tx,
            outbound: outbound_rx,
        });

        Ok(PushChannel {
            inbound: inbound_rx,
            outbound: outbound_tx,
        })
    }
}

// ============================================================================
// MOCK GATT
// ============================================================================

/// Mock BLE central standing in for the device chooser
pub struct MockGattCentral {
    peripheral: Option<Arc<MockGattPeripheral>>,
    error: Option<TransportError>,
    delay_ms: u64,
    requests: AtomicUsize,
}

impl MockGattCentral {
    /// Chooser that always picks `peripheral`
    pub fn with_peripheral(peripheral: Arc<MockGattPeripheral>) -> Self {
        Self {
            peripheral: Some(peripheral),
            error: None,
            delay_ms: 0,
            requests: AtomicUsize::new(0),
        }
    }

    /// Chooser the operator always backs out of
    pub fn cancelled() -> Self {
        Self::with_error(TransportError::Cancelled)
    }

    pub fn with_error(error: TransportError) -> Self {
        Self {
            peripheral: None,
            error: Some(error),
            delay_ms: 0,
            requests: AtomicUsize::new(0),
        }
    }

    /// Keep the chooser open for a while
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    pub fn request_calls(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GattCentral for MockGattCentral {
    async fn request_device(
        &self,
        _filter: &DeviceFilter,
    ) -> Result<Arc<dyn GattPeripheral>, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        delay(self.delay_ms).await;

        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        match &self.peripheral {
            Some(peripheral) => Ok(peripheral.clone()),
            None => Err(TransportError::Cancelled),
        }
    }
}

/// Mock rover peripheral
pub struct MockGattPeripheral {
    name: String,
    characteristics: HashSet<(Uuid, Uuid)>,
    connect_error: Option<TransportError>,
    write_error: Option<TransportError>,
    writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    notifier: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    disconnects: AtomicUsize,
}

impl MockGattPeripheral {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            characteristics: HashSet::new(),
            connect_error: None,
            write_error: None,
            writes: Mutex::new(Vec::new()),
            notifier: Mutex::new(None),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// A peripheral exposing the full layout of `config`
    pub fn for_config(name: &str, config: &BleTransportConfig) -> Self {
        let service = config.service();
        service
            .characteristics()
            .iter()
            .fold(Self::new(name), |p, c| p.with_characteristic(service.uuid(), c.uuid()))
    }

    pub fn with_characteristic(mut self, service: Uuid, characteristic: Uuid) -> Self {
        self.characteristics.insert((service, characteristic));
        self
    }

    pub fn with_connect_error(mut self, error: TransportError) -> Self {
        self.connect_error = Some(error);
        self
    }

    pub fn with_write_error(mut self, error: TransportError) -> Self {
        self.write_error = Some(error);
        self
    }

    /// Send a notification on the subscribed characteristic
    pub fn notify(&self, payload: &[u8]) -> bool {
        self.notifier
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(payload.to_vec()).is_ok())
    }

    /// Drop the link from the peripheral side
    pub fn drop_link(&self) {
        self.notifier.lock().take();
    }

    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.writes.lock().clone()
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GattPeripheral for MockGattPeripheral {
    fn name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    async fn connect(&self) -> Result<(), TransportError> {
        match &self.connect_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.notifier.lock().take();
        Ok(())
    }

    async fn has_characteristic(&self, service: Uuid, characteristic: Uuid) -> Result<bool, TransportError> {
        Ok(self.characteristics.contains(&(service, characteristic)))
    }

    async fn write(&self, characteristic: Uuid, value: &[u8]) -> Result<(), TransportError> {
        if let Some(error) = &self.write_error {
            return Err(error.clone());
        }
        if !self.characteristics.iter().any(|(_, c)| *c == characteristic) {
            return Err(TransportError::ChannelMissing(characteristic.to_string()));
        }
        self.writes.lock().push((characteristic, value.to_vec()));
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream, TransportError> {
        if !self.characteristics.iter().any(|(_, c)| *c == characteristic) {
            return Err(TransportError::ChannelMissing(characteristic.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.notifier.lock() = Some(tx);

        Ok(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|payload| (payload, rx))
        })
        .boxed())
    }
}
