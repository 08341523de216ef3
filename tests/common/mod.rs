//! Shared utilities for integration tests.
//!
//! Starts a connection manager on an ephemeral loopback port with a
//! `MockPublisher` standing in for the broker.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use ipc_mqtt_bridge::bridge::{ConnectionManager, ManagerState, ShutdownHandle};
use ipc_mqtt_bridge::bus::MockPublisher;
use ipc_mqtt_bridge::config::{Config, IpcConfig, TransferConfig};
use ipc_mqtt_bridge::ipc::ProducerClient;

pub const AUTHKEY: &[u8] = b"integration-key";

/// Time allowed for any asynchronous effect to become visible.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// A running bridge backed by a mock publisher.
pub struct TestBridge {
    pub publisher: Arc<MockPublisher>,
    pub addr: SocketAddr,
    pub state: watch::Receiver<ManagerState>,
    pub shutdown: ShutdownHandle,
    pub task: JoinHandle<()>,
}

impl TestBridge {
    pub async fn start(chunk_size: usize) -> Self {
        let config = Config {
            ipc: IpcConfig {
                address: "127.0.0.1:0".to_string(),
                authkey: String::from_utf8(AUTHKEY.to_vec()).unwrap(),
                handshake_timeout_secs: 1,
            },
            transfer: TransferConfig {
                chunk_size_bytes: chunk_size,
            },
            ..Default::default()
        };

        let publisher = Arc::new(MockPublisher::new());
        let (manager, shutdown) = ConnectionManager::bind(&config, publisher.clone())
            .await
            .expect("bind listener");
        let addr = manager.local_addr().unwrap();
        let state = manager.state();
        let task = tokio::spawn(manager.run());

        Self {
            publisher,
            addr,
            state,
            shutdown,
            task,
        }
    }

    pub async fn connect(&self) -> ProducerClient {
        ProducerClient::connect(self.addr, AUTHKEY)
            .await
            .expect("producer handshake")
    }

    /// Wait until the mock has recorded at least `count` publishes.
    pub async fn wait_for_published(&self, count: usize) {
        let publisher = self.publisher.clone();
        tokio::time::timeout(SETTLE_TIMEOUT, async move {
            while publisher.published_count().await < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {} publishes", count));
    }

    pub async fn wait_for_state(&mut self, expected: ManagerState) {
        tokio::time::timeout(SETTLE_TIMEOUT, self.state.wait_for(|s| *s == expected))
            .await
            .unwrap_or_else(|_| panic!("manager never reached {:?}", expected))
            .unwrap();
    }

    /// Stop the manager and wait for it to exit.
    pub async fn stop(self) {
        self.shutdown.stop();
        tokio::time::timeout(SETTLE_TIMEOUT, self.task)
            .await
            .expect("manager did not stop")
            .unwrap();
    }
}

/// Write `len` bytes of patterned data to a temp file.
pub fn write_image(dir: &tempfile::TempDir, name: &str, len: usize) -> PathBuf {
    let path = dir.path().join(name);
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, data).unwrap();
    path
}
