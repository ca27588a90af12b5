// Sensor Model
// The canonical sensor record plus the JSON shape used by the relay and device REST surfaces

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// SENSOR STATE
// ============================================================================

/// Decoded device truth
///
/// Replaced wholesale on every telemetry frame or poll response. Only the
/// decoders in this module construct it from device output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorState {
    pub fire_detected: bool,
    pub pump_active: bool,
    /// Set by polling transports when the record was fetched
    pub last_updated: Option<DateTime<Utc>>,
}

impl SensorState {
    pub fn new(fire_detected: bool, pump_active: bool) -> Self {
        Self {
            fire_detected,
            pump_active,
            last_updated: None,
        }
    }

    /// Copy of this record stamped with a fetch time
    pub fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.last_updated = Some(at);
        self
    }
}

// ============================================================================
// SENSOR PAYLOAD (JSON)
// ============================================================================

/// Sensor fields as they appear in relay/device JSON
///
/// The relay names them `fireDetected`/`pumpStatus`; the device's older
/// websocket firmware used `fire`/`pump`. Both are accepted, missing fields
/// read as false and extra fields (`connected`) are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorPayload {
    #[serde(rename = "fireDetected", alias = "fire", default)]
    pub fire_detected: bool,
    #[serde(rename = "pumpStatus", alias = "pump", default)]
    pub pump_status: bool,
}

impl SensorPayload {
    pub fn into_state(self) -> SensorState {
        SensorState::new(self.fire_detected, self.pump_status)
    }
}

impl From<SensorPayload> for SensorState {
    fn from(payload: SensorPayload) -> Self {
        payload.into_state()
    }
}
