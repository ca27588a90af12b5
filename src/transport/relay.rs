// Relay Transport Implementation
// Talks to the local relay process: REST calls for session control and commands,
// a persistent push channel for sensor events

use crate::command::Command;
use crate::transport::{
    ConnectTarget, DeviceApi, DeviceTransport, EventSink, HttpDeviceApi, PushChannel,
    PushConnector, PushEvent, SocketIoConnector, StatusResponse, TransportConfig,
    TransportError, TransportKind, ENGINE_QUERY,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ============================================================================
// RELAY TRANSPORT CONFIG
// ============================================================================

/// Configuration for the relay transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayTransportConfig {
    /// Base transport configuration
    pub base: TransportConfig,
    /// Relay REST root
    pub base_url: String,
    /// Socket.IO endpoint path under the relay root
    pub push_path: String,
    /// Reopen attempts after the push channel drops
    pub reconnect_attempts: u32,
    /// Fixed delay before each reopen attempt
    pub reconnect_delay_ms: u64,
    /// Also emit each command over the push channel
    pub mirror_commands: bool,
}

impl Default for RelayTransportConfig {
    fn default() -> Self {
        Self {
            base: TransportConfig::default(),
            base_url: "http://localhost:5000".to_string(),
            push_path: "/socket.io/".to_string(),
            reconnect_attempts: 5,
            reconnect_delay_ms: 1_000,
            mirror_commands: false,
        }
    }
}

impl RelayTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_config(mut self, base: TransportConfig) -> Self {
        self.base = base;
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    pub fn with_push_path(mut self, path: &str) -> Self {
        self.push_path = path.to_string();
        self
    }

    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }

    pub fn with_mirror_commands(mut self, enabled: bool) -> Self {
        self.mirror_commands = enabled;
        self
    }

    /// Socket.IO WebSocket URL for a given REST root
    pub fn push_url(&self, base_url: &str) -> String {
        let root = base_url.trim_end_matches('/');
        let root = if let Some(rest) = root.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = root.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            root.to_string()
        };
        format!("{}{}?{}", root, self.push_path, ENGINE_QUERY)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), TransportError> {
        self.base.validate()?;
        if self.base_url.is_empty() {
            return Err(TransportError::InvalidConfig("relay base_url is empty".to_string()));
        }
        if !self.push_path.starts_with('/') {
            return Err(TransportError::InvalidConfig(
                "push_path must start with '/'".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SESSION
// ============================================================================

type Outbound = Arc<Mutex<Option<mpsc::Sender<PushEvent>>>>;

struct RelaySession {
    generation: u64,
    base_url: String,
    supervisor: JoinHandle<()>,
    outbound: Outbound,
}

type SessionSlot = Arc<Mutex<Option<RelaySession>>>;

/// Written under the session lock so `connect` and the supervisor agree
#[derive(Default)]
struct SessionFlags {
    /// `connect` accepted the session
    established: AtomicBool,
    /// The supervisor gave up
    ended: AtomicBool,
}

// ============================================================================
// RELAY TRANSPORT
// ============================================================================

/// Relay-socket transport
pub struct RelayTransport {
    config: RelayTransportConfig,
    api: Arc<dyn DeviceApi>,
    push: Arc<dyn PushConnector>,
    generation: AtomicU64,
    session: SessionSlot,
}

impl RelayTransport {
    /// Relay transport over HTTP and Socket.IO
    pub fn new(config: RelayTransportConfig) -> Result<Self, TransportError> {
        config.validate()?;
        let timeouts = config.base.timeouts();
        let api = Arc::new(HttpDeviceApi::new(timeouts)?);
        let push = Arc::new(SocketIoConnector::new(timeouts.connect));
        Ok(Self::with_parts(config, api, push))
    }

    /// Relay transport over caller-supplied REST and push implementations
    pub fn with_parts(
        config: RelayTransportConfig,
        api: Arc<dyn DeviceApi>,
        push: Arc<dyn PushConnector>,
    ) -> Self {
        Self {
            config,
            api,
            push,
            generation: AtomicU64::new(0),
            session: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &RelayTransportConfig {
        &self.config
    }

    /// Whether the relay process answers on its health endpoint
    pub async fn health(&self) -> bool {
        self.api.health(&self.config.base_url).await
    }

    /// One-shot status read, independent of any session
    pub async fn status(&self) -> Result<StatusResponse, TransportError> {
        self.api.status(&self.config.base_url).await
    }

    pub fn has_session(&self) -> bool {
        self.session.lock().is_some()
    }
}

#[async_trait]
impl DeviceTransport for RelayTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Relay
    }

    async fn connect(&self, target: ConnectTarget, events: EventSink) -> Result<(), TransportError> {
        if self.session.lock().is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let base_url = target.resolve(&self.config.base_url).to_string();
        let push_url = self.config.push_url(&base_url);
        info!(%base_url, "connecting through relay");

        let channel = self.push.open(&push_url).await?;
        let outbound: Outbound = Arc::new(Mutex::new(Some(channel.outbound.clone())));
        let flags = Arc::new(SessionFlags::default());

        let supervisor = tokio::spawn(
            PushSupervisor {
                connector: self.push.clone(),
                url: push_url,
                attempts: self.config.reconnect_attempts,
                delay: Duration::from_millis(self.config.reconnect_delay_ms),
                events,
                flags: flags.clone(),
                outbound: outbound.clone(),
                session: self.session.clone(),
                generation,
            }
            .run(channel),
        );

        // The relay opens its own serial session to the rover
        if let Err(e) = self.api.connect(&base_url).await {
            supervisor.abort();
            warn!(error = %e, "relay refused to open a rover session");
            return Err(e);
        }

        let rejected = {
            let mut slot = self.session.lock();
            if flags.ended.load(Ordering::SeqCst) {
                Some((
                    supervisor,
                    TransportError::SessionClosed("push channel lost while connecting".to_string()),
                ))
            } else if self.generation.load(Ordering::SeqCst) != generation || slot.is_some() {
                Some((supervisor, TransportError::Cancelled))
            } else {
                flags.established.store(true, Ordering::SeqCst);
                *slot = Some(RelaySession {
                    generation,
                    base_url: base_url.clone(),
                    supervisor,
                    outbound,
                });
                None
            }
        };

        if let Some((supervisor, error)) = rejected {
            supervisor.abort();
            if let Err(e) = self.api.disconnect(&base_url).await {
                warn!(error = %e, "teardown of abandoned relay session failed");
            }
            return Err(error);
        }

        info!(%base_url, "relay session established");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let session = self.session.lock().take();

        match session {
            Some(session) => {
                session.supervisor.abort();
                info!(base_url = %session.base_url, "closing relay session");
                self.api.disconnect(&session.base_url).await
            }
            None => Ok(()),
        }
    }

    async fn send(&self, command: Command) -> Result<(), TransportError> {
        let (base_url, outbound) = {
            let slot = self.session.lock();
            let session = slot.as_ref().ok_or(TransportError::NotConnected)?;
            (session.base_url.clone(), session.outbound.clone())
        };

        let token = command.wire_token();
        self.api
            .send_command(&base_url, token)
            .await
            .map_err(TransportError::into_write_failure)?;

        if self.config.mirror_commands {
            let sender = outbound.lock().clone();
            if let Some(sender) = sender {
                let mirrored = PushEvent::SendCommand {
                    command: token.to_string(),
                };
                if sender.try_send(mirrored).is_err() {
                    debug!(%command, "push channel busy, mirror skipped");
                }
            }
        }

        debug!(%command, token, "command sent through relay");
        Ok(())
    }
}

// ============================================================================
// PUSH SUPERVISOR
// ============================================================================

/// Owns the push channel for one session and reopens it when it drops
struct PushSupervisor {
    connector: Arc<dyn PushConnector>,
    url: String,
    attempts: u32,
    delay: Duration,
    events: EventSink,
    flags: Arc<SessionFlags>,
    outbound: Outbound,
    session: SessionSlot,
    generation: u64,
}

impl PushSupervisor {
    async fn run(self, first: PushChannel) {
        let mut channel = first;

        loop {
            while let Some(event) = channel.inbound.recv().await {
                if let Some(reason) = self.handle(event) {
                    self.end_session(&reason);
                    return;
                }
            }

            warn!(url = %self.url, "push channel dropped");
            *self.outbound.lock() = None;

            match self.reopen().await {
                Some(reopened) => {
                    *self.outbound.lock() = Some(reopened.outbound.clone());
                    channel = reopened;
                }
                None => {
                    let reason = format!(
                        "push channel lost after {} reconnect attempts",
                        self.attempts
                    );
                    self.end_session(&reason);
                    return;
                }
            }
        }
    }

    /// Returns a reason when the event ends the session
    fn handle(&self, event: PushEvent) -> Option<String> {
        match event {
            PushEvent::SensorData(payload) => {
                self.events.telemetry(payload.into_state().stamped(Utc::now()));
                None
            }
            PushEvent::ConnectionStatus { connected: false } => {
                if self.flags.established.load(Ordering::SeqCst) {
                    Some("relay lost its link to the rover".to_string())
                } else {
                    debug!("relay reports no rover link yet");
                    None
                }
            }
            PushEvent::ConnectionStatus { connected: true } => {
                debug!("relay reports rover link up");
                None
            }
            PushEvent::CommandResponse {
                success,
                command,
                error,
            } => {
                if success {
                    debug!(%command, "relay executed command");
                } else {
                    warn!(%command, error = ?error, "relay failed to execute command");
                }
                None
            }
            PushEvent::SendCommand { command } => {
                debug!(%command, "ignoring outbound-only frame from relay");
                None
            }
        }
    }

    async fn reopen(&self) -> Option<PushChannel> {
        for attempt in 1..=self.attempts {
            tokio::time::sleep(self.delay).await;
            match self.connector.open(&self.url).await {
                Ok(channel) => {
                    info!(attempt, "push channel reopened");
                    return Some(channel);
                }
                Err(e) => warn!(attempt, max = self.attempts, error = %e, "push channel reopen failed"),
            }
        }
        None
    }

    fn end_session(&self, reason: &str) {
        let owned = {
            let mut slot = self.session.lock();
            self.flags.ended.store(true, Ordering::SeqCst);
            let owned = matches!(slot.as_ref(), Some(s) if s.generation == self.generation);
            if owned {
                *slot = None;
            }
            owned
        };

        if owned {
            warn!(%reason, "relay session lost");
            self.events.session_lost(reason);
        }
    }
}
