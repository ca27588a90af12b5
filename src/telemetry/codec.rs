// Telemetry Codec
// Decodes the firmware's `KEY:VALUE,KEY:VALUE` status line

use super::SensorState;
use tracing::warn;

const FIELD_DELIMITER: char = ',';
const KEY_VALUE_DELIMITER: char = ':';

const KEY_FIRE: &str = "FIRE";
const KEY_PUMP: &str = "PUMP";
/// Emitted by the firmware, not surfaced in the sensor model
const KEY_DISTANCE: &str = "DIST";

const TRUE_VALUE: &str = "1";

/// Stateless decoder for raw telemetry lines
pub struct TelemetryCodec;

impl TelemetryCodec {
    /// Decode one telemetry line
    ///
    /// Total: any input yields a `SensorState`. Unknown keys are skipped, a
    /// line with no recognised field is logged and decodes to the default.
    pub fn decode(raw: &str) -> SensorState {
        let line = raw.trim();
        let mut state = SensorState::default();
        let mut recognised = 0usize;

        for field in line.split(FIELD_DELIMITER) {
            let Some((key, value)) = field.split_once(KEY_VALUE_DELIMITER) else {
                continue;
            };
            let value = value.trim();

            match key.trim() {
                KEY_FIRE => {
                    state.fire_detected = value == TRUE_VALUE;
                    recognised += 1;
                }
                KEY_PUMP => {
                    state.pump_active = value == TRUE_VALUE;
                    recognised += 1;
                }
                KEY_DISTANCE => recognised += 1,
                _ => {}
            }
        }

        if recognised == 0 {
            warn!(line = %line, "malformed telemetry, using default sensor state");
            return SensorState::default();
        }

        state
    }

    /// Decode a raw notification payload
    pub fn decode_bytes(raw: &[u8]) -> SensorState {
        match std::str::from_utf8(raw) {
            Ok(line) => Self::decode(line),
            Err(_) => {
                warn!(payload = %hex::encode(raw), "telemetry is not UTF-8, using default sensor state");
                SensorState::default()
            }
        }
    }
}
