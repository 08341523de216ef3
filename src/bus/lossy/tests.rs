use super::*;
use crate::bus::MockPublisher;
use crate::chunk::{send_file, TransferError};

fn payload() -> Bytes {
    Bytes::from_static(b"frame")
}

#[test]
fn test_drop_rate_is_clamped() {
    assert_eq!(LossyConfig::with_drop_rate(-0.5).drop_rate, 0.0);
    assert_eq!(LossyConfig::with_drop_rate(1.5).drop_rate, 1.0);
}

#[tokio::test]
async fn test_default_config_loses_nothing() {
    let lossy = LossyPublisher::new(MockPublisher::new(), LossyConfig::default());

    for _ in 0..10 {
        lossy
            .publish("binaryChunks", payload(), AckLevel::AtLeastOnce)
            .await
            .unwrap();
    }

    assert_eq!(lossy.dropped_count(), 0);
    assert_eq!(lossy.inner().published_count().await, 10);
}

#[tokio::test]
async fn test_drop_all_reports_timeouts() {
    let lossy = LossyPublisher::new(MockPublisher::new(), LossyConfig::drop_all());

    for _ in 0..5 {
        let result = lossy
            .publish("binaryChunks", payload(), AckLevel::AtLeastOnce)
            .await;
        assert!(matches!(result, Err(BusError::PublishTimeout { .. })));
    }

    assert_eq!(lossy.dropped_count(), 5);
    assert_eq!(lossy.inner().attempt_count().await, 0);
}

#[tokio::test]
async fn test_lost_frame_aborts_transfer_with_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("img.bin");
    std::fs::write(&path, vec![7u8; 400]).unwrap();

    let lossy = LossyPublisher::new(MockPublisher::new(), LossyConfig::lose_at(2));

    let result = send_file(&lossy, "binaryChunks", &path, 100, AckLevel::AtLeastOnce).await;

    match result {
        Err(TransferError::Publish {
            chunk_index,
            total_chunks,
            source: BusError::PublishTimeout { .. },
            ..
        }) => {
            assert_eq!(chunk_index, 2);
            assert_eq!(total_chunks, 4);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    // Frames 0 and 1 delivered, frame 3 never attempted.
    assert_eq!(lossy.inner().published_count().await, 2);
    assert_eq!(lossy.dropped_count(), 1);
}

#[tokio::test]
async fn test_disconnect_passes_through() {
    let lossy = LossyPublisher::new(MockPublisher::new(), LossyConfig::drop_all());
    lossy.disconnect().await.unwrap();
    assert!(lossy.inner().is_disconnected().await);
}
