// Telemetry module - WHAT THE ROVER SEES
// Canonical sensor model and the decoders that produce it

mod codec;
mod model;

pub use codec::TelemetryCodec;
pub use model::{SensorPayload, SensorState};
