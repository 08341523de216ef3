//! Messages sent by the producer.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Event message received from the producer, tagged by its `type` field.
///
/// Numeric fields may be absent or `null`. Any unrecognized `type` decodes
/// to [`InboundMessage::Unknown`] and is ignored by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "AEB_TRIGGER")]
    AebTrigger {
        velocity: Option<f64>,
        gnss_x: Option<f64>,
        gnss_y: Option<f64>,
    },
    #[serde(rename = "IMAGE_SAVED")]
    ImageSaved {
        path: PathBuf,
        velocity: Option<f64>,
        /// `(x, y)` position.
        gnss: Option<(f64, f64)>,
    },
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// Decode a message body.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::AebTrigger { .. } => "AEB_TRIGGER",
            InboundMessage::ImageSaved { .. } => "IMAGE_SAVED",
            InboundMessage::Unknown => "UNKNOWN",
        }
    }
}
