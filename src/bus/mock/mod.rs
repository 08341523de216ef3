//! Mock publisher implementation for testing.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::{AckLevel, BusError, Publisher, Result};

/// A payload recorded by the mock publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub channel: String,
    pub payload: Bytes,
    pub ack: AckLevel,
}

/// Mock publisher for testing.
///
/// Records every successful publish in order. Failures can be injected for
/// all publishes or for the publish at a given zero-based attempt index.
#[derive(Default)]
pub struct MockPublisher {
    published: RwLock<Vec<PublishedMessage>>,
    attempts: RwLock<usize>,
    fail_on_publish: RwLock<bool>,
    fail_at: RwLock<Option<usize>>,
    fail_channel: RwLock<Option<String>>,
    disconnected: RwLock<bool>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    /// Fail only the publish attempt with this zero-based index.
    pub async fn set_fail_at(&self, attempt: Option<usize>) {
        *self.fail_at.write().await = attempt;
    }

    /// Fail every publish to the given channel.
    pub async fn set_fail_channel(&self, channel: Option<&str>) {
        *self.fail_channel.write().await = channel.map(str::to_string);
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    /// Number of publish calls made, successful or not.
    pub async fn attempt_count(&self) -> usize {
        *self.attempts.read().await
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.read().await.clone()
    }

    pub async fn take_published(&self) -> Vec<PublishedMessage> {
        std::mem::take(&mut *self.published.write().await)
    }

    pub async fn is_disconnected(&self) -> bool {
        *self.disconnected.read().await
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(&self, channel: &str, payload: Bytes, ack: AckLevel) -> Result<()> {
        if *self.disconnected.read().await {
            return Err(BusError::Disconnected);
        }

        let attempt = {
            let mut attempts = self.attempts.write().await;
            let current = *attempts;
            *attempts += 1;
            current
        };

        let fail_channel = self.fail_channel.read().await.as_deref() == Some(channel);
        if *self.fail_on_publish.read().await
            || *self.fail_at.read().await == Some(attempt)
            || fail_channel
        {
            return Err(BusError::Publish {
                channel: channel.to_string(),
                message: "Mock publish failure".to_string(),
            });
        }

        self.published.write().await.push(PublishedMessage {
            channel: channel.to_string(),
            payload,
            ack,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        *self.disconnected.write().await = true;
        Ok(())
    }
}
