// Direct Transport Implementation
// Request/response straight to the rover's Wi-Fi access point, with status polling for telemetry

use crate::command::Command;
use crate::transport::{
    ConnectTarget, DeviceApi, DeviceTransport, EventSink, HttpDeviceApi, StatusResponse,
    TransportConfig, TransportError, TransportKind,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

// ============================================================================
// DIRECT TRANSPORT CONFIG
// ============================================================================

/// Configuration for the direct Wi-Fi transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectTransportConfig {
    /// Base transport configuration
    pub base: TransportConfig,
    /// Rover REST root (its access point address)
    pub base_url: String,
    /// Status poll period
    pub poll_interval_ms: u64,
}

impl Default for DirectTransportConfig {
    fn default() -> Self {
        Self {
            base: TransportConfig::default(),
            base_url: "http://192.168.4.1".to_string(),
            poll_interval_ms: 500,
        }
    }
}

impl DirectTransportConfig {
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

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), TransportError> {
        self.base.validate()?;
        if self.base_url.is_empty() {
            return Err(TransportError::InvalidConfig("direct base_url is empty".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(TransportError::InvalidConfig(
                "poll_interval_ms cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// DIRECT TRANSPORT
// ============================================================================

struct DirectSession {
    base_url: String,
    poller: JoinHandle<()>,
}

/// Direct-network transport
pub struct DirectTransport {
    config: DirectTransportConfig,
    api: Arc<dyn DeviceApi>,
    generation: AtomicU64,
    session: Mutex<Option<DirectSession>>,
}

impl DirectTransport {
    pub fn new(config: DirectTransportConfig) -> Result<Self, TransportError> {
        config.validate()?;
        let api = Arc::new(HttpDeviceApi::new(config.base.timeouts())?);
        Ok(Self::with_api(config, api))
    }

    pub fn with_api(config: DirectTransportConfig, api: Arc<dyn DeviceApi>) -> Self {
        Self {
            config,
            api,
            generation: AtomicU64::new(0),
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DirectTransportConfig {
        &self.config
    }

    /// Whether the rover answers on its health endpoint
    pub async fn health(&self) -> bool {
        self.api.health(&self.config.base_url).await
    }

    /// One-shot status read, independent of any session
    pub async fn status(&self) -> Result<StatusResponse, TransportError> {
        self.api.status(&self.config.base_url).await
    }

    pub fn is_polling(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|s| !s.poller.is_finished())
    }
}

#[async_trait]
impl DeviceTransport for DirectTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Direct
    }

    async fn connect(&self, target: ConnectTarget, events: EventSink) -> Result<(), TransportError> {
        if self.session.lock().is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let base_url = target.resolve(&self.config.base_url).to_string();
        info!(%base_url, "connecting to rover over Wi-Fi");

        self.api.connect(&base_url).await?;

        let accepted = {
            let mut slot = self.session.lock();
            if self.generation.load(Ordering::SeqCst) == generation && slot.is_none() {
                let poller = tokio::spawn(poll_status(
                    self.api.clone(),
                    base_url.clone(),
                    self.config.poll_interval(),
                    events,
                ));
                *slot = Some(DirectSession {
                    base_url: base_url.clone(),
                    poller,
                });
                true
            } else {
                false
            }
        };

        if !accepted {
            if let Err(e) = self.api.disconnect(&base_url).await {
                warn!(%base_url, error = %e, "teardown of abandoned rover session failed");
            }
            return Err(TransportError::Cancelled);
        }

        info!(%base_url, interval_ms = self.config.poll_interval_ms, "rover session established, polling status");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let session = self.session.lock().take();

        match session {
            Some(session) => {
                session.poller.abort();
                info!(base_url = %session.base_url, "closing rover session");
                self.api.disconnect(&session.base_url).await
            }
            None => Ok(()),
        }
    }

    async fn send(&self, command: Command) -> Result<(), TransportError> {
        let base_url = self
            .session
            .lock()
            .as_ref()
            .map(|s| s.base_url.clone())
            .ok_or(TransportError::NotConnected)?;

        self.api
            .send_command(&base_url, command.wire_token())
            .await
            .map_err(TransportError::into_write_failure)?;

        debug!(%command, "command sent to rover");
        Ok(())
    }
}

/// Replace the sensor state on every tick until aborted
///
/// A failed poll is logged and skipped; it does not end the session.
async fn poll_status(api: Arc<dyn DeviceApi>, base_url: String, interval: Duration, events: EventSink) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match api.status(&base_url).await {
            Ok(StatusResponse {
                sensor_data: Some(payload),
                ..
            }) => events.telemetry(payload.into_state().stamped(Utc::now())),
            Ok(_) => debug!("status carried no sensor data"),
            Err(e) => warn!(error = %e, "status poll failed"),
        }
    }
}
