//! Publisher wrapper that loses acknowledgments.
//!
//! Simulates a broker link where some publishes are never acknowledged. A
//! lost publish never reaches the inner publisher and fails with
//! `PublishTimeout`, exactly as an unacknowledged MQTT publish does. Losses
//! are either random (a drop rate) or pinned to one publish index, which is
//! how a transfer abort at a given frame is reproduced.
//!
//! ```ignore
//! use ipc_mqtt_bridge::bus::{LossyConfig, LossyPublisher, MockPublisher};
//!
//! // Telemetry (publish 0) and frame 0 pass; frame 1 is lost.
//! let lossy = LossyPublisher::new(MockPublisher::new(), LossyConfig::lose_at(2));
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use tracing::debug;

use super::{AckLevel, BusError, Publisher, Result};

/// Which publishes are lost.
#[derive(Clone, Debug, Default)]
pub struct LossyConfig {
    /// Probability of losing any publish, clamped to `0.0..=1.0`.
    pub drop_rate: f64,
    /// Zero-based index of a publish that is always lost.
    pub lose_at: Option<usize>,
    /// Timeout reported for a lost publish.
    pub reported_timeout: Duration,
}

impl LossyConfig {
    pub fn with_drop_rate(rate: f64) -> Self {
        Self {
            drop_rate: rate.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    pub fn drop_all() -> Self {
        Self::with_drop_rate(1.0)
    }

    /// Lose only the publish with this zero-based index.
    pub fn lose_at(index: usize) -> Self {
        Self {
            lose_at: Some(index),
            ..Default::default()
        }
    }
}

/// Wrapper that loses some publishes of an inner publisher.
pub struct LossyPublisher<P: Publisher> {
    inner: P,
    config: LossyConfig,
    attempts: AtomicUsize,
    dropped: AtomicUsize,
}

impl<P: Publisher> LossyPublisher<P> {
    pub fn new(inner: P, config: LossyConfig) -> Self {
        Self {
            inner,
            config,
            attempts: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Publishes lost so far.
    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    fn should_drop(&self, attempt: usize) -> bool {
        if self.config.lose_at == Some(attempt) {
            return true;
        }
        match self.config.drop_rate {
            rate if rate <= 0.0 => false,
            rate if rate >= 1.0 => true,
            rate => rand::rng().random::<f64>() < rate,
        }
    }
}

#[async_trait]
impl<P: Publisher> Publisher for LossyPublisher<P> {
    async fn publish(&self, channel: &str, payload: Bytes, ack: AckLevel) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed);

        if self.should_drop(attempt) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(channel = %channel, attempt, bytes = payload.len(), "Publish lost");
            return Err(BusError::PublishTimeout {
                channel: channel.to_string(),
                timeout: self.config.reported_timeout,
            });
        }

        self.inner.publish(channel, payload, ack).await
    }

    async fn disconnect(&self) -> Result<()> {
        self.inner.disconnect().await
    }
}

#[cfg(test)]
mod tests;
