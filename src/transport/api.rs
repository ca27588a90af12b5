// Device REST API
// Client for the `/api/*` surface served by both the local relay and the rover's own Wi-Fi firmware

use crate::telemetry::SensorPayload;
use crate::transport::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

// ============================================================================
// ENDPOINTS AND BODIES
// ============================================================================

mod paths {
    pub const CONNECT: &str = "/api/connect";
    pub const DISCONNECT: &str = "/api/disconnect";
    pub const SEND_COMMAND: &str = "/api/send-command";
    pub const STATUS: &str = "/api/status";
    pub const HEALTH: &str = "/api/health";
}

/// Envelope every mutating endpoint answers with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiResponse {
    /// Turn a `success: false` body into an error
    pub fn into_result(self) -> Result<(), TransportError> {
        if self.success {
            Ok(())
        } else {
            Err(TransportError::Refused(
                self.message.unwrap_or_else(|| "request declined".to_string()),
            ))
        }
    }
}

/// Body of `GET /api/status`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub connected: bool,
    #[serde(rename = "sensorData", default)]
    pub sensor_data: Option<SensorPayload>,
}

#[derive(Serialize)]
struct SendCommandBody<'a> {
    command: &'a str,
}

// ============================================================================
// DEVICE API TRAIT
// ============================================================================

/// The REST surface, addressed by base URL (`http://localhost:5000`)
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Ask the endpoint to open its session to the rover
    async fn connect(&self, base_url: &str) -> Result<(), TransportError>;

    /// Ask the endpoint to close its session to the rover
    async fn disconnect(&self, base_url: &str) -> Result<(), TransportError>;

    /// Forward one wire token
    async fn send_command(&self, base_url: &str, token: &str) -> Result<(), TransportError>;

    /// Current link flag and last sensor reading
    async fn status(&self, base_url: &str) -> Result<StatusResponse, TransportError>;

    /// Whether the endpoint answers at all
    async fn health(&self, base_url: &str) -> bool;
}

// ============================================================================
// HTTP TIMEOUTS
// ============================================================================

/// Per-request time bounds
///
/// A timeout is reported as `TransportError::Timeout`, which the bridge
/// treats the same as an unreachable device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiTimeouts {
    pub connect: Duration,
    pub request: Duration,
    pub poll: Duration,
}

impl Default for ApiTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(3),
            request: Duration::from_secs(2),
            poll: Duration::from_secs(1),
        }
    }
}

// ============================================================================
// HTTP DEVICE API
// ============================================================================

/// reqwest-backed `DeviceApi`
#[derive(Debug, Clone)]
pub struct HttpDeviceApi {
    client: reqwest::Client,
    timeouts: ApiTimeouts,
}

impl HttpDeviceApi {
    pub fn new(timeouts: ApiTimeouts) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Unsupported(format!("HTTP client init failed: {e}")))?;

        Ok(Self { client, timeouts })
    }

    pub fn timeouts(&self) -> &ApiTimeouts {
        &self.timeouts
    }

    fn url(base_url: &str, path: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), path)
    }

    async fn post(
        &self,
        base_url: &str,
        path: &str,
        body: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let url = Self::url(base_url, path);
        debug!(%url, "POST");

        let mut request = self.client.post(&url).timeout(timeout);
        request = match body {
            Some(body) => request.json(&body),
            None => request.header(reqwest::header::CONTENT_TYPE, "application/json"),
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.json::<ApiResponse>().await.ok();

        if !status.is_success() {
            let message = body
                .and_then(|b| b.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
            return Err(TransportError::Http {
                status: status.as_u16(),
                message,
            });
        }

        body.ok_or_else(|| TransportError::Protocol(format!("{} returned no JSON body", path)))?
            .into_result()
    }
}

#[async_trait]
impl DeviceApi for HttpDeviceApi {
    async fn connect(&self, base_url: &str) -> Result<(), TransportError> {
        self.post(base_url, paths::CONNECT, None, self.timeouts.connect).await
    }

    async fn disconnect(&self, base_url: &str) -> Result<(), TransportError> {
        self.post(base_url, paths::DISCONNECT, None, self.timeouts.request).await
    }

    async fn send_command(&self, base_url: &str, token: &str) -> Result<(), TransportError> {
        let body = serde_json::to_value(SendCommandBody { command: token })
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        self.post(base_url, paths::SEND_COMMAND, Some(body), self.timeouts.request)
            .await
    }

    async fn status(&self, base_url: &str) -> Result<StatusResponse, TransportError> {
        let response = self
            .client
            .get(Self::url(base_url, paths::STATUS))
            .timeout(self.timeouts.poll)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                message: "status request failed".to_string(),
            });
        }

        Ok(response.json::<StatusResponse>().await?)
    }

    async fn health(&self, base_url: &str) -> bool {
        match self
            .client
            .get(Self::url(base_url, paths::HEALTH))
            .timeout(self.timeouts.request)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "health probe failed");
                false
            }
        }
    }
}
