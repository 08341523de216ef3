//! Telemetry records published on the JSON channel.
//!
//! Every dispatched producer event becomes one `TelemetryRecord` with a fixed
//! wire shape: absent numeric inputs are encoded as `0.0`, never `null`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::utils::clock::now_iso8601;

/// Event kinds carried in the `event` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Automatic emergency braking fired.
    AebTrigger,
    /// A camera image was written to disk.
    ImageCaptured,
}

impl EventKind {
    /// Wire name of the event kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AebTrigger => "AEB_TRIGGER",
            EventKind::ImageCaptured => "IMAGE_CAPTURED",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub event: String,
    pub speed: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: String,
}

impl TelemetryRecord {
    /// Serialize to the UTF-8 JSON wire payload.
    pub fn to_payload(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// Build a telemetry record; absent inputs become `0.0`.
///
/// `longitude` is the producer's GNSS x coordinate and `latitude` its y.
pub fn encode(
    kind: EventKind,
    speed: Option<f64>,
    longitude: Option<f64>,
    latitude: Option<f64>,
) -> TelemetryRecord {
    TelemetryRecord {
        event: kind.as_str().to_string(),
        speed: speed.unwrap_or(0.0),
        latitude: latitude.unwrap_or(0.0),
        longitude: longitude.unwrap_or(0.0),
        timestamp: now_iso8601(),
    }
}
