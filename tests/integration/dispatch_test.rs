//! Messages sent over IPC end up on the right broker channels.

use ipc_mqtt_bridge::bus::AckLevel;
use ipc_mqtt_bridge::chunk::{ChunkFrame, Reassembler};
use ipc_mqtt_bridge::ipc::InboundMessage;
use ipc_mqtt_bridge::telemetry::TelemetryRecord;

use crate::common::{write_image, TestBridge};

const CHUNK: usize = 100 * 1024;

#[tokio::test]
async fn test_aeb_trigger_becomes_telemetry() {
    let bridge = TestBridge::start(CHUNK).await;
    let mut producer = bridge.connect().await;

    producer
        .send(&InboundMessage::AebTrigger {
            velocity: Some(12.5),
            gnss_x: Some(139.7),
            gnss_y: Some(35.6),
        })
        .await
        .unwrap();

    bridge.wait_for_published(1).await;
    let published = bridge.publisher.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].channel, "telemetry/data");
    assert_eq!(published[0].ack, AckLevel::AtLeastOnce);

    let record: TelemetryRecord = serde_json::from_slice(&published[0].payload).unwrap();
    assert_eq!(record.event, "AEB_TRIGGER");
    assert_eq!(record.speed, 12.5);
    assert_eq!(record.latitude, 35.6);
    assert_eq!(record.longitude, 139.7);

    bridge.stop().await;
}

#[tokio::test]
async fn test_image_saved_streams_file_after_telemetry() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(&dir, "img.bin", 300_000);

    let bridge = TestBridge::start(CHUNK).await;
    let mut producer = bridge.connect().await;

    producer
        .send(&InboundMessage::ImageSaved {
            path: path.clone(),
            velocity: Some(5.0),
            gnss: Some((10.0, 20.0)),
        })
        .await
        .unwrap();

    bridge.wait_for_published(4).await;
    let published = bridge.publisher.published().await;

    let record: TelemetryRecord = serde_json::from_slice(&published[0].payload).unwrap();
    assert_eq!(published[0].channel, "telemetry/data");
    assert_eq!(record.event, "IMAGE_CAPTURED");
    assert_eq!(record.latitude, 20.0);
    assert_eq!(record.longitude, 10.0);

    let mut reassembler = Reassembler::new();
    let mut completed = None;
    for (index, message) in published[1..].iter().enumerate() {
        assert_eq!(message.channel, "binaryChunks");
        let frame = ChunkFrame::decode(message.payload.clone()).unwrap();
        assert_eq!(frame.header.chunk_index, index);
        completed = reassembler.push(frame).unwrap();
    }

    let file = completed.expect("all chunks delivered");
    assert_eq!(file.filename, "img.bin");
    assert_eq!(file.data.as_ref(), std::fs::read(&path).unwrap().as_slice());

    bridge.stop().await;
}

#[tokio::test]
async fn test_unknown_and_raw_messages() {
    let bridge = TestBridge::start(CHUNK).await;
    let mut producer = bridge.connect().await;

    producer
        .send_raw(br#"{"type":"LANE_DEPARTURE","side":"left"}"#)
        .await
        .unwrap();
    producer
        .send_raw(br#"{"type":"AEB_TRIGGER","velocity":null}"#)
        .await
        .unwrap();

    bridge.wait_for_published(1).await;
    let published = bridge.publisher.published().await;
    assert_eq!(published.len(), 1);
    let record: TelemetryRecord = serde_json::from_slice(&published[0].payload).unwrap();
    assert_eq!(record.speed, 0.0);

    bridge.stop().await;
}

#[tokio::test]
async fn test_failed_chunk_then_next_message_processed() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(&dir, "img.bin", 3 * 1024);

    let bridge = TestBridge::start(1024).await;
    // Attempt 0 is the telemetry record, attempt 2 is chunk 1 of 3.
    bridge.publisher.set_fail_at(Some(2)).await;

    let mut producer = bridge.connect().await;
    producer
        .send(&InboundMessage::ImageSaved {
            path,
            velocity: None,
            gnss: None,
        })
        .await
        .unwrap();
    producer
        .send(&InboundMessage::AebTrigger {
            velocity: Some(1.0),
            gnss_x: None,
            gnss_y: None,
        })
        .await
        .unwrap();

    bridge.wait_for_published(3).await;
    let published = bridge.publisher.published().await;
    let channels: Vec<&str> = published.iter().map(|m| m.channel.as_str()).collect();
    assert_eq!(channels, ["telemetry/data", "binaryChunks", "telemetry/data"]);
    // Chunk 2 was never attempted.
    assert_eq!(bridge.publisher.attempt_count().await, 4);

    bridge.stop().await;
}
