//! MQTT publisher.
//!
//! Wraps a rumqttc client and its event loop. The event loop runs on a
//! background task for the publisher's whole lifetime (keep-alive, reconnect,
//! socket I/O); `publish` only enqueues a packet and then waits until the
//! background task reports the broker acknowledgment for that packet id.
//!
//! ```text
//! publish() ──request──▶ AsyncClient ──▶ EventLoop task ──▶ broker
//!     ▲                                        │
//!     └──────── Delivery(pkid) ◀───────────────┘ (PUBACK / PUBCOMP)
//! ```

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AckLevel, BusError, Publisher, Result};
use crate::config::BrokerConfig;

/// Capacity of the client request queue.
const REQUEST_CAPACITY: usize = 16;

/// Room for the frame header and MQTT fixed/variable headers on top of the
/// chunk payload.
const PACKET_OVERHEAD: usize = 16 * 1024;

/// Delay before polling again after a transport error (triggers reconnect).
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Time allowed for the DISCONNECT packet to be flushed.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Progress of an outgoing publish as seen by the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// PUBLISH written to the socket.
    Written(u16),
    /// Broker acknowledged the packet (PUBACK for QoS 1, PUBCOMP for QoS 2).
    Acknowledged(u16),
}

/// Delivery events for the publish currently waiting, with the leftovers of
/// publishes that timed out filtered out.
struct DeliveryTracker {
    events: mpsc::UnboundedReceiver<Delivery>,
    /// Timed-out publishes whose PUBLISH had not been written yet.
    unwritten: usize,
    /// Packet ids of timed-out publishes still awaiting their late ack.
    abandoned: HashSet<u16>,
}

impl DeliveryTracker {
    fn new(events: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self {
            events,
            unwritten: 0,
            abandoned: HashSet::new(),
        }
    }

    /// Returns `None` for events that belong to an abandoned publish.
    ///
    /// Requests are written in order, so the first `unwritten` fresh writes
    /// are the abandoned publishes. Packet id 0 (QoS 0) is never acked or
    /// retransmitted and is not tracked.
    fn filter(&mut self, delivery: Delivery) -> Option<Delivery> {
        match delivery {
            Delivery::Written(pkid) if pkid != 0 && self.abandoned.contains(&pkid) => None,
            Delivery::Written(pkid) if self.unwritten > 0 => {
                self.unwritten -= 1;
                if pkid != 0 {
                    self.abandoned.insert(pkid);
                }
                None
            }
            Delivery::Acknowledged(pkid) if self.abandoned.remove(&pkid) => None,
            other => Some(other),
        }
    }

    /// Consume events queued while nobody was waiting.
    fn drain(&mut self) {
        while let Ok(delivery) = self.events.try_recv() {
            self.filter(delivery);
        }
    }

    /// Record a publish that timed out after `written` was observed (or
    /// before any write, if `None`).
    fn abandon(&mut self, written: Option<u16>) {
        match written {
            Some(0) => {}
            Some(pkid) => {
                self.abandoned.insert(pkid);
            }
            None => self.unwritten += 1,
        }
    }

    /// Wait for this publish to be written and, above QoS 0, acknowledged.
    async fn wait(&mut self, ack: AckLevel, written: &mut Option<u16>) -> Result<u16> {
        loop {
            let Some(delivery) = self.events.recv().await else {
                return Err(BusError::Disconnected);
            };
            match self.filter(delivery) {
                Some(Delivery::Written(pkid)) => {
                    if ack == AckLevel::AtMostOnce {
                        return Ok(pkid);
                    }
                    *written = Some(pkid);
                }
                Some(Delivery::Acknowledged(pkid)) if *written == Some(pkid) => return Ok(pkid),
                _ => {}
            }
        }
    }
}

/// Map an acknowledgment level onto an MQTT QoS.
pub fn qos_for(ack: AckLevel) -> QoS {
    match ack {
        AckLevel::AtMostOnce => QoS::AtMostOnce,
        AckLevel::AtLeastOnce => QoS::AtLeastOnce,
        AckLevel::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// Publisher backed by an MQTT broker connection.
pub struct MqttPublisher {
    client: AsyncClient,
    client_id: String,
    /// Held for the duration of a publish: at most one publish outstanding.
    deliveries: Mutex<DeliveryTracker>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    cancel: watch::Sender<bool>,
    publish_timeout: Duration,
}

impl MqttPublisher {
    /// Connect to the broker and start the background event loop.
    ///
    /// `max_payload` is the largest payload that will be published; the
    /// client's packet size limit is raised to admit it.
    pub async fn connect(config: &BrokerConfig, max_payload: usize) -> Result<Self> {
        let client_id = format!("{}_{}", config.client_id_prefix, Uuid::new_v4());

        let mut options = MqttOptions::new(client_id.clone(), config.address.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        let max_packet = max_payload.saturating_add(PACKET_OVERHEAD);
        options.set_max_packet_size(max_packet, max_packet);
        if let Some((username, password)) = config.credentials() {
            options.set_credentials(username, password);
        }

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        match tokio::time::timeout(connect_timeout, wait_for_connack(&mut event_loop)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(BusError::Connection(format!("{}: {}", config.addr(), e)));
            }
            Err(_) => {
                return Err(BusError::Connection(format!(
                    "{}: no CONNACK within {:?}",
                    config.addr(),
                    connect_timeout
                )));
            }
        }

        info!(broker = %config.addr(), client_id = %client_id, "Connected to MQTT broker");

        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(drive_event_loop(event_loop, delivery_tx, cancel_rx));

        Ok(Self {
            client,
            client_id,
            deliveries: Mutex::new(DeliveryTracker::new(delivery_rx)),
            event_loop: Mutex::new(Some(handle)),
            cancel: cancel_tx,
            publish_timeout: Duration::from_secs(config.publish_timeout_secs),
        })
    }

    /// Client id presented to the broker.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, channel: &str, payload: Bytes, ack: AckLevel) -> Result<()> {
        if *self.cancel.borrow() {
            return Err(BusError::Disconnected);
        }

        let mut deliveries = self.deliveries.lock().await;
        deliveries.drain();

        let bytes = payload.len();
        self.client
            .publish_bytes(channel, qos_for(ack), false, payload)
            .await
            .map_err(|e| BusError::Publish {
                channel: channel.to_string(),
                message: e.to_string(),
            })?;

        let mut written = None;
        let outcome =
            tokio::time::timeout(self.publish_timeout, deliveries.wait(ack, &mut written)).await;

        match outcome {
            Ok(Ok(pkid)) => {
                debug!(channel = %channel, pkid, bytes, "Publish acknowledged");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                deliveries.abandon(written);
                warn!(channel = %channel, pkid = ?written, "Publish not acknowledged in time");
                Err(BusError::PublishTimeout {
                    channel: channel.to_string(),
                    timeout: self.publish_timeout,
                })
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        let Some(mut handle) = self.event_loop.lock().await.take() else {
            return Ok(());
        };

        if let Err(e) = self.client.disconnect().await {
            warn!(error = %e, "Failed to request MQTT disconnect");
        }

        if tokio::time::timeout(DISCONNECT_GRACE, &mut handle).await.is_err() {
            warn!("MQTT event loop did not stop in time, aborting");
            handle.abort();
        }
        self.cancel.send_replace(true);

        info!(client_id = %self.client_id, "Disconnected from MQTT broker");
        Ok(())
    }
}

async fn wait_for_connack(event_loop: &mut EventLoop) -> std::result::Result<(), ConnectionError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = event_loop.poll().await? {
            return Ok(());
        }
    }
}

/// Poll the MQTT event loop until disconnect or cancellation.
///
/// Transport errors are logged and polling resumes after a short delay,
/// which makes rumqttc re-establish the connection.
async fn drive_event_loop(
    mut event_loop: EventLoop,
    deliveries: mpsc::UnboundedSender<Delivery>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            event = event_loop.poll() => event,
            _ = cancel.changed() => break,
        };

        match event {
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                let _ = deliveries.send(Delivery::Written(pkid));
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                let _ = deliveries.send(Delivery::Acknowledged(ack.pkid));
            }
            Ok(Event::Incoming(Packet::PubComp(comp))) => {
                let _ = deliveries.send(Delivery::Acknowledged(comp.pkid));
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Reconnected to MQTT broker");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "MQTT connection error, reconnecting");
                tokio::select! {
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    _ = cancel.changed() => break,
                }
            }
        }
    }
    debug!("MQTT event loop stopped");
}
