//! ipc-mqtt-bridge: producer events to MQTT
//!
//! ## Architecture
//! ```text
//! [producer] --(authenticated TCP, JSON)--> [ipc-mqtt-bridge] --(MQTT)--> [broker]
//!                                                                  telemetry/data
//!                                                                  binaryChunks
//! ```
//!
//! ## Configuration
//! - `bridge.yaml`, `--config <path>` or BRIDGE_CONFIG
//! - BRIDGE__<SECTION>__<KEY> environment overrides
//! - BRIDGE_LOG: tracing filter (default: info)

use std::sync::Arc;

use backon::Retryable;
use tracing::{error, info, warn};

use ipc_mqtt_bridge::bridge::{BridgeError, ConnectionManager};
use ipc_mqtt_bridge::bus::{MqttPublisher, Publisher};
use ipc_mqtt_bridge::config::Config;
use ipc_mqtt_bridge::utils::bootstrap::{init_tracing, parse_config_path};
use ipc_mqtt_bridge::utils::retry::connection_backoff;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(parse_config_path().as_deref())?;

    let broker = &config.broker;
    let max_payload = config.transfer.chunk_size_bytes;
    let publisher = (move || MqttPublisher::connect(broker, max_payload))
        .retry(connection_backoff(broker.connect_retries))
        .notify(|e, delay| {
            warn!(error = %e, delay = ?delay, "Broker connection failed, retrying");
        })
        .await
        .map_err(|e| {
            error!(broker = %broker.addr(), error = %e, "Cannot reach broker");
            BridgeError::Broker(e)
        })?;
    let publisher: Arc<dyn Publisher> = Arc::new(publisher);

    let (manager, shutdown) = ConnectionManager::bind(&config, publisher).await?;
    info!(
        listener = %manager.local_addr()?,
        broker = %broker.addr(),
        binary_channel = %config.channels.binary,
        json_channel = %config.channels.json,
        "ipc-mqtt-bridge started"
    );

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        shutdown.stop();
    });

    manager.run().await;
    Ok(())
}
