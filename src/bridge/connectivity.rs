// Connectivity Bridge
// Owns the connection state, dispatches commands to the active adapter and
// fans adapter events out to the registered callbacks

use crate::bridge::{BridgeError, ConnectionState};
use crate::command::Command;
use crate::telemetry::SensorState;
use crate::transport::{
    ConnectTarget, DeviceTransport, EventSink, TransportError, TransportEvent, TransportKind,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Receives every sensor record while connected
pub type SensorCallback = Arc<dyn Fn(SensorState) + Send + Sync>;

/// Receives `true` on connect and `false` when a live session ends
pub type ConnectionCallback = Arc<dyn Fn(bool) + Send + Sync>;

// ============================================================================
// INTERNAL STATE
// ============================================================================

/// Connection state plus the attempt it belongs to
///
/// `epoch` moves on every connect and every transition to `Disconnected`,
/// so events and completions from an older attempt can be recognised.
#[derive(Debug, Default)]
struct Lifecycle {
    state: ConnectionState,
    epoch: u64,
}

impl Lifecycle {
    fn enter(&mut self, next: ConnectionState) {
        debug_assert!(self.state.can_transition_to(next));
        debug!(from = %self.state, to = %next, "connection state");
        self.state = next;
    }
}

struct BridgeInner {
    lifecycle: Mutex<Lifecycle>,
    transport: Mutex<Arc<dyn DeviceTransport>>,
    latest: Mutex<Option<SensorState>>,
    /// Telemetry that arrived before the session was confirmed
    pending: Mutex<Option<SensorState>>,
    /// Loss reported before the session was confirmed
    pending_loss: Mutex<Option<String>>,
    last_error: Mutex<Option<BridgeError>>,
    on_sensor: Mutex<Option<SensorCallback>>,
    on_connection: Mutex<Option<ConnectionCallback>>,
}

impl BridgeInner {
    fn notify_sensor(&self, state: SensorState) {
        let callback = self.on_sensor.lock().clone();
        if let Some(callback) = callback {
            callback(state);
        }
    }

    fn notify_connection(&self, connected: bool) {
        let callback = self.on_connection.lock().clone();
        if let Some(callback) = callback {
            callback(connected);
        }
    }

    fn handle_event(&self, epoch: u64, event: TransportEvent) {
        match event {
            TransportEvent::Telemetry(state) => self.handle_telemetry(epoch, state),
            TransportEvent::SessionLost(reason) => self.handle_session_lost(epoch, reason),
        }
    }

    fn handle_telemetry(&self, epoch: u64, state: SensorState) {
        let deliver = {
            let lifecycle = self.lifecycle.lock();
            if lifecycle.epoch != epoch {
                return;
            }
            match lifecycle.state {
                ConnectionState::Connected => {
                    self.pending.lock().take();
                    true
                }
                ConnectionState::Connecting => {
                    *self.pending.lock() = Some(state);
                    false
                }
                ConnectionState::Disconnected => return,
            }
        };

        *self.latest.lock() = Some(state);
        if deliver {
            self.notify_sensor(state);
        }
    }

    fn handle_session_lost(&self, epoch: u64, reason: String) {
        let lost = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.epoch != epoch || lifecycle.state == ConnectionState::Disconnected {
                debug!(%reason, "ignoring session loss from a stale session");
                return;
            }
            if lifecycle.state == ConnectionState::Connecting {
                // Settled by `connect` once the adapter returns
                debug!(%reason, "session lost before confirmation");
                *self.pending_loss.lock() = Some(reason);
                return;
            }
            lifecycle.enter(ConnectionState::Disconnected);
            lifecycle.epoch += 1;
            BridgeError::SessionLost(reason)
        };

        warn!(error = %lost, "session lost");
        *self.last_error.lock() = Some(lost);
        self.notify_connection(false);
    }
}

/// How a connect attempt ended once the adapter returned
enum Settled {
    /// A disconnect moved the bridge on; `live` if the adapter built a session anyway
    Overtaken { live: bool },
    Confirmed,
    /// The adapter reported the session gone before returning
    LostEarly(String),
    Failed(TransportError),
}

// ============================================================================
// CONNECTIVITY BRIDGE
// ============================================================================

/// The transport-agnostic facade the operator UI drives
///
/// Cloning yields another handle to the same bridge.
#[derive(Clone)]
pub struct ConnectivityBridge {
    inner: Arc<BridgeInner>,
}

impl ConnectivityBridge {
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                lifecycle: Mutex::new(Lifecycle::default()),
                transport: Mutex::new(transport),
                latest: Mutex::new(None),
                pending: Mutex::new(None),
                pending_loss: Mutex::new(None),
                last_error: Mutex::new(None),
                on_sensor: Mutex::new(None),
                on_connection: Mutex::new(None),
            }),
        }
    }

    /// Swap the active adapter; only allowed while disconnected
    pub fn set_transport(&self, transport: Arc<dyn DeviceTransport>) -> Result<(), BridgeError> {
        let lifecycle = self.inner.lifecycle.lock();
        if lifecycle.state != ConnectionState::Disconnected {
            return Err(BridgeError::CommandRejected(format!(
                "cannot switch transport while {}",
                lifecycle.state
            )));
        }
        info!(kind = %transport.kind(), "transport selected");
        *self.inner.transport.lock() = transport;
        Ok(())
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.inner.transport.lock().kind()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lifecycle.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Most recent sensor record, if any arrived
    pub fn latest_sensor_state(&self) -> Option<SensorState> {
        *self.inner.latest.lock()
    }

    /// The failure that ended the last session or connect attempt
    pub fn last_error(&self) -> Option<BridgeError> {
        self.inner.last_error.lock().clone()
    }

    /// Register the sensor callback, replacing any earlier one
    pub fn on_sensor_data(&self, callback: impl Fn(SensorState) + Send + Sync + 'static) {
        *self.inner.on_sensor.lock() = Some(Arc::new(callback));
    }

    /// Register the connection-change callback, replacing any earlier one
    pub fn on_connection_change(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        *self.inner.on_connection.lock() = Some(Arc::new(callback));
    }

    fn event_sink(&self, epoch: u64) -> EventSink {
        let inner: Weak<BridgeInner> = Arc::downgrade(&self.inner);
        EventSink::new(move |event| {
            if let Some(inner) = inner.upgrade() {
                inner.handle_event(epoch, event);
            }
        })
    }

    /// Establish a session through the active adapter
    ///
    /// Resolves once the adapter confirms the session. Calling it while
    /// connected is a no-op; calling it while another connect is in flight
    /// is rejected.
    pub async fn connect(&self, target: ConnectTarget) -> Result<(), BridgeError> {
        let (epoch, transport) = {
            let mut lifecycle = self.inner.lifecycle.lock();
            match lifecycle.state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting => {
                    return Err(BridgeError::CommandRejected(
                        "connect already in progress".to_string(),
                    ))
                }
                ConnectionState::Disconnected => {}
            }
            lifecycle.enter(ConnectionState::Connecting);
            lifecycle.epoch += 1;
            (lifecycle.epoch, self.inner.transport.lock().clone())
        };

        *self.inner.pending.lock() = None;
        *self.inner.pending_loss.lock() = None;
        info!(kind = %transport.kind(), ?target, "connecting");

        let result = transport.connect(target, self.event_sink(epoch)).await;

        let settled = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.epoch != epoch || lifecycle.state != ConnectionState::Connecting {
                Settled::Overtaken {
                    live: result.is_ok(),
                }
            } else {
                let lost = self.inner.pending_loss.lock().take();
                let settled = match (result, lost) {
                    (Ok(()), None) => Settled::Confirmed,
                    (Ok(()), Some(reason)) => Settled::LostEarly(reason),
                    (Err(e), _) => Settled::Failed(e),
                };
                if matches!(settled, Settled::Confirmed) {
                    lifecycle.enter(ConnectionState::Connected);
                } else {
                    lifecycle.enter(ConnectionState::Disconnected);
                    lifecycle.epoch += 1;
                }
                settled
            }
        };

        match settled {
            Settled::Overtaken { live } => {
                if live {
                    if let Err(e) = transport.disconnect().await {
                        warn!(error = %e, "teardown of overtaken session failed");
                    }
                }
                info!(kind = %transport.kind(), "connect abandoned");
                Err(BridgeError::UserAborted(
                    "connect cancelled by disconnect".to_string(),
                ))
            }
            Settled::Confirmed => {
                info!(kind = %transport.kind(), "connected");
                *self.inner.last_error.lock() = None;
                self.inner.notify_connection(true);
                let pending = self.inner.pending.lock().take();
                if let Some(state) = pending {
                    self.inner.notify_sensor(state);
                }
                Ok(())
            }
            Settled::LostEarly(reason) => {
                *self.inner.pending.lock() = None;
                if let Err(e) = transport.disconnect().await {
                    warn!(error = %e, "teardown of lost session failed");
                }
                let error = BridgeError::SessionLost(reason);
                warn!(kind = %transport.kind(), error = %error, "session lost while connecting");
                *self.inner.last_error.lock() = Some(error.clone());
                Err(error)
            }
            Settled::Failed(e) => {
                let error = BridgeError::from(e);
                if error.should_alert() {
                    warn!(kind = %transport.kind(), error = %error, "connect failed");
                } else {
                    info!(kind = %transport.kind(), "connect aborted by operator");
                }
                *self.inner.last_error.lock() = Some(error.clone());
                Err(error)
            }
        }
    }

    /// End the session; state is `Disconnected` afterwards whatever the adapter reports
    pub async fn disconnect(&self) {
        let (previous, transport) = {
            let mut lifecycle = self.inner.lifecycle.lock();
            let previous = lifecycle.state;
            if previous != ConnectionState::Disconnected {
                lifecycle.enter(ConnectionState::Disconnected);
                lifecycle.epoch += 1;
            }
            (previous, self.inner.transport.lock().clone())
        };

        if previous == ConnectionState::Disconnected {
            debug!("disconnect while already disconnected");
            return;
        }

        *self.inner.pending.lock() = None;
        *self.inner.pending_loss.lock() = None;
        if let Err(e) = transport.disconnect().await {
            warn!(kind = %transport.kind(), error = %e, "transport teardown failed");
        }
        info!(kind = %transport.kind(), "disconnected");

        if previous == ConnectionState::Connected {
            self.inner.notify_connection(false);
        }
    }

    /// Forward a command to the active adapter
    ///
    /// Fails immediately without touching the adapter unless connected.
    pub async fn send_command(&self, command: Command) -> Result<(), BridgeError> {
        let transport = {
            let lifecycle = self.inner.lifecycle.lock();
            if lifecycle.state != ConnectionState::Connected {
                return Err(BridgeError::not_connected());
            }
            self.inner.transport.lock().clone()
        };

        transport.send(command).await.map_err(|e| {
            let error = BridgeError::from(e);
            warn!(%command, error = %error, "command failed");
            error
        })
    }

    /// Validate a name or wire token, then send it
    pub async fn send_token(&self, token: &str) -> Result<(), BridgeError> {
        let command = Command::parse_any(token)?;
        self.send_command(command).await
    }
}

impl std::fmt::Debug for ConnectivityBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityBridge")
            .field("state", &self.state())
            .field("transport", &self.transport_kind())
            .finish_non_exhaustive()
    }
}
