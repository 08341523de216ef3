//! Broker publishing.
//!
//! This module contains:
//! - `Publisher` trait: acknowledged publish of a payload to a named channel
//! - `AckLevel`: the delivery guarantee requested per publish
//! - Implementations: MQTT, Mock, Lossy wrapper

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

// Implementation modules
pub mod lossy;
pub mod mock;
#[cfg(feature = "mqtt")]
pub mod mqtt;

// Re-exports
pub use lossy::{LossyConfig, LossyPublisher};
pub use mock::{MockPublisher, PublishedMessage};
#[cfg(feature = "mqtt")]
pub use mqtt::MqttPublisher;

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish to '{channel}' failed: {message}")]
    Publish { channel: String, message: String },

    #[error("Publish to '{channel}' not acknowledged within {timeout:?}")]
    PublishTimeout { channel: String, timeout: Duration },

    #[error("Publisher is disconnected")]
    Disconnected,
}

/// Delivery guarantee requested for a publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckLevel {
    /// Fire and forget; "acknowledged" once written to the transport.
    AtMostOnce,
    /// Broker acknowledges receipt; may redeliver.
    #[default]
    AtLeastOnce,
    /// Broker completes a two-phase handshake.
    ExactlyOnce,
}

/// Interface for acknowledged publishing to the broker.
///
/// Implementations:
/// - `MqttPublisher`: MQTT broker via rumqttc
/// - `MockPublisher`: In-memory recorder for testing
/// - `LossyPublisher`: Loses selected publishes of an inner publisher
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a payload to a channel.
    ///
    /// Resolves only after the broker acknowledged the payload at the
    /// requested level, or fails with `Publish`/`PublishTimeout`. Nothing is
    /// buffered across calls: a failed publish is not retried.
    async fn publish(&self, channel: &str, payload: Bytes, ack: AckLevel) -> Result<()>;

    /// Disconnect from the broker and stop background I/O.
    async fn disconnect(&self) -> Result<()>;
}
