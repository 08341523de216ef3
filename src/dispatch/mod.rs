//! Message dispatch.
//!
//! Classifies each producer message and drives the telemetry encoder and the
//! chunked file transfer against the injected publisher:
//!
//! - `AEB_TRIGGER`: one telemetry record
//! - `IMAGE_SAVED`: one telemetry record, then the image as chunk frames
//! - anything else: ignored
//!
//! Every per-message failure is captured in the returned [`DispatchReport`];
//! nothing here propagates past the message boundary.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bus::{AckLevel, BusError, Publisher};
use crate::chunk::{send_file, TransferError, TransferReport};
use crate::config::{ChannelConfig, Config};
use crate::ipc::InboundMessage;
use crate::telemetry::{self, EventKind};


/// Failure to deliver a telemetry record.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Failed to serialize telemetry: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Publish(#[from] BusError),
}

/// What happened while dispatching one message.
#[derive(Debug)]
pub struct DispatchReport {
    /// Message kind as received (`AEB_TRIGGER`, `IMAGE_SAVED`, `UNKNOWN`).
    pub kind: &'static str,
    /// Telemetry outcome; `None` if no record was due.
    pub telemetry: Option<Result<(), TelemetryError>>,
    /// File transfer outcome; `None` if the message carries no file.
    pub transfer: Option<Result<TransferReport, TransferError>>,
}

impl DispatchReport {
    fn ignored(kind: &'static str) -> Self {
        Self {
            kind,
            telemetry: None,
            transfer: None,
        }
    }

    /// True if every step that ran succeeded.
    pub fn is_success(&self) -> bool {
        !matches!(self.telemetry, Some(Err(_))) && !matches!(self.transfer, Some(Err(_)))
    }
}

/// Routes producer messages to the broker.
pub struct Dispatcher {
    publisher: Arc<dyn Publisher>,
    channels: ChannelConfig,
    chunk_size: usize,
    ack: AckLevel,
}

impl Dispatcher {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        channels: ChannelConfig,
        chunk_size: usize,
        ack: AckLevel,
    ) -> Self {
        Self {
            publisher,
            channels,
            chunk_size,
            ack,
        }
    }

    /// Build a dispatcher from the channel, transfer and broker sections.
    pub fn from_config(publisher: Arc<dyn Publisher>, config: &Config) -> Self {
        Self::new(
            publisher,
            config.channels.clone(),
            config.transfer.chunk_size_bytes,
            config.broker.ack_level,
        )
    }

    pub fn publisher(&self) -> &Arc<dyn Publisher> {
        &self.publisher
    }

    /// Process one message to completion.
    pub async fn dispatch(&self, message: InboundMessage) -> DispatchReport {
        let kind = message.kind();
        debug!(kind, "Dispatching message");

        match message {
            InboundMessage::AebTrigger {
                velocity,
                gnss_x,
                gnss_y,
            } => DispatchReport {
                kind,
                telemetry: Some(
                    self.send_telemetry(EventKind::AebTrigger, velocity, gnss_x, gnss_y)
                        .await,
                ),
                transfer: None,
            },
            InboundMessage::ImageSaved {
                path,
                velocity,
                gnss,
            } => {
                let (x, y) = gnss.map_or((None, None), |(x, y)| (Some(x), Some(y)));
                // Telemetry goes out first; its failure does not block the transfer.
                let telemetry = self
                    .send_telemetry(EventKind::ImageCaptured, velocity, x, y)
                    .await;
                let transfer = self.send_image(&path).await;
                DispatchReport {
                    kind,
                    telemetry: Some(telemetry),
                    transfer: Some(transfer),
                }
            }
            InboundMessage::Unknown => {
                debug!("Ignoring message of unknown type");
                DispatchReport::ignored(kind)
            }
        }
    }

    async fn send_telemetry(
        &self,
        kind: EventKind,
        speed: Option<f64>,
        longitude: Option<f64>,
        latitude: Option<f64>,
    ) -> Result<(), TelemetryError> {
        let record = telemetry::encode(kind, speed, longitude, latitude);
        let result = async {
            let payload = record.to_payload()?;
            self.publisher
                .publish(&self.channels.json, payload, self.ack)
                .await?;
            Ok(())
        }
        .await;

        match &result {
            Ok(()) => info!(
                event = %kind,
                speed = record.speed,
                latitude = record.latitude,
                longitude = record.longitude,
                "Telemetry sent"
            ),
            Err(e) => warn!(event = %kind, error = %e, "Telemetry publish failed"),
        }
        result
    }

    async fn send_image(&self, path: &Path) -> Result<TransferReport, TransferError> {
        let result = send_file(
            self.publisher.as_ref(),
            &self.channels.binary,
            path,
            self.chunk_size,
            self.ack,
        )
        .await;

        if let Err(e) = &result {
            warn!(path = %path.display(), error = %e, "Image transfer aborted");
        }
        result
    }
}
