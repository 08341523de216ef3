//! Connection manager lifecycle over real loopback sockets.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use ipc_mqtt_bridge::bridge::ManagerState;
use ipc_mqtt_bridge::ipc::{InboundMessage, IpcError, ProducerClient};

use crate::common::{TestBridge, AUTHKEY};

fn aeb(velocity: f64) -> InboundMessage {
    InboundMessage::AebTrigger {
        velocity: Some(velocity),
        gnss_x: None,
        gnss_y: None,
    }
}

#[tokio::test]
async fn test_reconnect_after_producer_disconnect() {
    let mut bridge = TestBridge::start(1024).await;

    let mut first = bridge.connect().await;
    first.send(&aeb(1.0)).await.unwrap();
    bridge.wait_for_published(1).await;
    assert_eq!(*bridge.state.borrow(), ManagerState::Connected);

    first.close().await.unwrap();
    bridge.wait_for_state(ManagerState::Listening).await;

    let mut second = bridge.connect().await;
    second.send(&aeb(2.0)).await.unwrap();
    bridge.wait_for_published(2).await;

    bridge.stop().await;
}

#[tokio::test]
async fn test_second_producer_waits_for_first() {
    let bridge = TestBridge::start(1024).await;

    let mut first = bridge.connect().await;
    first.send(&aeb(1.0)).await.unwrap();
    bridge.wait_for_published(1).await;

    // Queued in the backlog; the handshake only runs once the first leaves.
    let addr = bridge.addr;
    let pending = tokio::spawn(async move { ProducerClient::connect(addr, AUTHKEY).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!pending.is_finished());

    first.close().await.unwrap();
    let mut second = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    second.send(&aeb(2.0)).await.unwrap();
    bridge.wait_for_published(2).await;

    bridge.stop().await;
}

#[tokio::test]
async fn test_wrong_key_rejected_and_listener_survives() {
    let bridge = TestBridge::start(1024).await;

    let result = ProducerClient::connect(bridge.addr, b"wrong-key").await;
    assert!(matches!(result, Err(IpcError::AuthenticationFailed(_))));

    let mut producer = bridge.connect().await;
    producer.send(&aeb(3.0)).await.unwrap();
    bridge.wait_for_published(1).await;

    bridge.stop().await;
}

#[tokio::test]
async fn test_silent_peer_times_out_handshake() {
    let bridge = TestBridge::start(1024).await;

    // Connects but never answers the challenge.
    let _silent = TcpStream::connect(bridge.addr).await.unwrap();

    let mut producer = tokio::time::timeout(Duration::from_secs(5), bridge.connect())
        .await
        .unwrap();
    producer.send(&aeb(4.0)).await.unwrap();
    bridge.wait_for_published(1).await;

    bridge.stop().await;
}

#[tokio::test]
async fn test_malformed_body_drops_connection() {
    let mut bridge = TestBridge::start(1024).await;

    let mut producer = bridge.connect().await;
    producer.send(&aeb(1.0)).await.unwrap();
    bridge.wait_for_published(1).await;

    producer.send_raw(b"not json").await.unwrap();
    bridge.wait_for_state(ManagerState::Listening).await;

    let mut next = bridge.connect().await;
    next.send(&aeb(2.0)).await.unwrap();
    bridge.wait_for_published(2).await;

    bridge.stop().await;
}

#[tokio::test]
async fn test_truncated_frame_is_transport_failure() {
    let mut bridge = TestBridge::start(1024).await;

    let producer = bridge.connect().await;
    drop(producer);
    bridge.wait_for_state(ManagerState::Listening).await;

    // Raw socket: authenticate through a client, then abandon a half frame.
    let mut raw = TcpStream::connect(bridge.addr).await.unwrap();
    ipc_mqtt_bridge::ipc::auth::authenticate_client(&mut raw, AUTHKEY)
        .await
        .unwrap();
    bridge.wait_for_state(ManagerState::Connected).await;
    raw.write_all(&[0, 0, 0, 10, b'{']).await.unwrap();
    drop(raw);

    bridge.wait_for_state(ManagerState::Listening).await;
    assert_eq!(bridge.publisher.attempt_count().await, 0);

    bridge.stop().await;
}

#[tokio::test]
async fn test_shutdown_drops_idle_producer_and_disconnects() {
    let mut bridge = TestBridge::start(1024).await;

    let mut producer = bridge.connect().await;
    producer.send(&aeb(1.0)).await.unwrap();
    bridge.wait_for_published(1).await;

    let publisher = bridge.publisher.clone();
    let mut state = bridge.state.clone();
    bridge.stop().await;

    assert_eq!(*state.borrow_and_update(), ManagerState::Closed);
    assert!(publisher.is_disconnected().await);
    let _ = producer.send(&aeb(2.0)).await;
    assert_eq!(publisher.published_count().await, 1);
}
