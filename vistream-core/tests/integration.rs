//! Integration tests: live publisher/subscriber pairs over real sockets,
//! lifecycle edge cases and a hand-driven fake publisher for wire errors.

use std::path::Path;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::SinkExt;
use tokio_util::codec::Framed;
use vistream_core::{
    encode_frame, identity_transform, pose_from_wxyz, AddressConfig, DType, Envelope,
    EnvelopeCodec, FramePublisher, FrameSubscriber, Hello, NdArray, PublishOutcome,
    PublisherConfig, SensorFrame, StreamError, SubscriberConfig, SyntheticConfig,
    SyntheticSource, TransportScheme,
};

// ── Helpers ──────────────────────────────────────────────────────

fn address(dir: &Path) -> AddressConfig {
    AddressConfig {
        ipc_dir: dir.to_path_buf(),
        ..Default::default()
    }
}

fn pub_config(dir: &Path, fps: u32) -> PublisherConfig {
    PublisherConfig {
        target_fps: fps,
        address: address(dir),
        ..Default::default()
    }
}

fn sub_config(dir: &Path) -> SubscriberConfig {
    SubscriberConfig {
        address: address(dir),
        reconnect_interval: Duration::from_millis(20),
        ..Default::default()
    }
}

fn small_frame(seed: u8) -> SensorFrame {
    SensorFrame::new(
        NdArray::from_u8(vec![2, 2, 3], vec![seed; 12]).unwrap(),
        NdArray::from_u16(vec![2, 2], vec![seed as u16 * 10; 4]).unwrap(),
        NdArray::from_f32(vec![3, 3], vec![seed as f32; 9]).unwrap(),
        pose_from_wxyz(1.0, 0.0, 0.0, 0.0, seed as f64, 0.0, 0.0),
    )
    .unwrap()
}

/// Poll `get_next` until a frame shows up.
async fn next_frame(sub: &mut FrameSubscriber) -> SensorFrame {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(frame) = sub.get_next().unwrap() {
                return frame;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("timeout waiting for a frame")
}

/// Wait until `cond` holds, yielding to the runtime in between.
async fn wait_for(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("timeout waiting for condition")
}

// ── Scenarios ────────────────────────────────────────────────────

#[tokio::test]
async fn test_oakd_frame_round_trips_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let mut publisher = FramePublisher::open_with_config("oakd", pub_config(dir.path(), 30))
        .await
        .unwrap();
    let mut subscriber = FrameSubscriber::connect_with_config("oakd", sub_config(dir.path()))
        .await
        .unwrap();

    let rgb: Vec<u8> = (0..640 * 400 * 3).map(|i| (i % 251) as u8).collect();
    let depth: Vec<u16> = (0..640 * 400).map(|i| (i % 4000) as u16).collect();
    let points: Vec<f32> = (0..256_000 * 3).map(|i| i as f32 * 1e-3).collect();
    let frame = SensorFrame::new(
        NdArray::from_u8(vec![640, 400, 3], rgb).unwrap(),
        NdArray::from_u16(vec![640, 400], depth).unwrap(),
        NdArray::from_f32(vec![256_000, 3], points).unwrap(),
        identity_transform(),
    )
    .unwrap();

    assert_eq!(
        publisher.publish(&frame).unwrap(),
        PublishOutcome::Sent { subscribers: 1 }
    );

    let received = next_frame(&mut subscriber).await;
    assert_eq!(received.rgb.shape(), &[640, 400, 3]);
    assert_eq!(received.rgb.dtype(), DType::U8);
    assert_eq!(received.depth.shape(), &[640, 400]);
    assert_eq!(received.depth.dtype(), DType::U16);
    assert_eq!(received.pointcloud.shape(), &[256_000, 3]);
    assert_eq!(received.pointcloud.dtype(), DType::F32);
    assert!(received.pose_is_identity());
    assert_eq!(received, frame);
}

#[tokio::test]
async fn test_get_next_returns_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let mut publisher = FramePublisher::open_with_config("cam", pub_config(dir.path(), 30))
        .await
        .unwrap();
    let mut subscriber = FrameSubscriber::connect_with_config("cam", sub_config(dir.path()))
        .await
        .unwrap();

    let start = Instant::now();
    for _ in 0..1000 {
        assert!(subscriber.get_next().unwrap().is_none());
    }
    let idle = start.elapsed();
    assert!(idle < Duration::from_millis(500), "1000 idle polls took {idle:?}");

    let frame = SensorFrame::new(
        NdArray::zeros(DType::U8, vec![640, 400, 3]).unwrap(),
        NdArray::zeros(DType::U16, vec![640, 400]).unwrap(),
        NdArray::zeros(DType::F32, vec![256_000, 3]).unwrap(),
        identity_transform(),
    )
    .unwrap();
    assert!(publisher.publish(&frame).unwrap().is_sent());
    wait_for(|| subscriber.stats().received == 1).await;

    // A pending frame costs one decode, never a wait on the socket.
    let start = Instant::now();
    let pending = subscriber.get_next().unwrap();
    let busy = start.elapsed();
    assert!(pending.is_some());
    assert!(busy < Duration::from_secs(2), "pending poll took {busy:?}");
    assert!(subscriber.get_next().unwrap().is_none());
}

#[tokio::test]
async fn test_get_next_before_any_publish_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let _publisher = FramePublisher::open_with_config("cam", pub_config(dir.path(), 30))
        .await
        .unwrap();
    let mut subscriber = FrameSubscriber::connect_with_config("cam", sub_config(dir.path()))
        .await
        .unwrap();

    assert!(subscriber.get_next().unwrap().is_none());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(subscriber.get_next().unwrap().is_none());
}

#[tokio::test]
async fn test_two_subscribers_receive_the_same_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let mut publisher = FramePublisher::open_with_config("cam", pub_config(dir.path(), 500))
        .await
        .unwrap();
    let mut a = FrameSubscriber::connect_with_config("cam", sub_config(dir.path()))
        .await
        .unwrap();
    let mut b = FrameSubscriber::connect_with_config("cam", sub_config(dir.path()))
        .await
        .unwrap();
    assert_eq!(publisher.subscriber_count(), 2);

    let mut seen_a = Vec::new();
    let mut seen_b = Vec::new();
    for seed in 1..=5u8 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let frame = small_frame(seed);
        assert_eq!(
            publisher.publish(&frame).unwrap(),
            PublishOutcome::Sent { subscribers: 2 }
        );
        seen_a.push(next_frame(&mut a).await);
        seen_b.push(next_frame(&mut b).await);
    }

    assert_eq!(seen_a, seen_b);
    let expected: Vec<_> = (1..=5u8).map(small_frame).collect();
    assert_eq!(seen_a, expected);
}

#[tokio::test]
async fn test_latest_frame_wins() {
    let dir = tempfile::tempdir().unwrap();
    let mut publisher = FramePublisher::open_with_config("cam", pub_config(dir.path(), 500))
        .await
        .unwrap();
    let mut subscriber = FrameSubscriber::connect_with_config("cam", sub_config(dir.path()))
        .await
        .unwrap();

    let f1 = small_frame(1);
    let f2 = small_frame(2);
    assert!(publisher.publish(&f1).unwrap().is_sent());
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(publisher.publish(&f2).unwrap().is_sent());

    wait_for(|| subscriber.stats().received >= 2).await;
    assert_eq!(subscriber.get_next().unwrap(), Some(f2));
    assert_eq!(subscriber.get_next().unwrap(), None);
    assert_eq!(subscriber.stats().decoded, 1);
}

#[tokio::test]
async fn test_throttled_frames_never_reach_subscribers() {
    let dir = tempfile::tempdir().unwrap();
    let mut publisher = FramePublisher::open_with_config("cam", pub_config(dir.path(), 1))
        .await
        .unwrap();
    let mut subscriber = FrameSubscriber::connect_with_config("cam", sub_config(dir.path()))
        .await
        .unwrap();

    assert!(publisher.publish(&small_frame(1)).unwrap().is_sent());
    assert_eq!(
        publisher.publish(&small_frame(2)).unwrap(),
        PublishOutcome::Throttled
    );

    assert_eq!(next_frame(&mut subscriber).await, small_frame(1));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(subscriber.stats().received, 1);
    assert_eq!(publisher.stats().throttled, 1);
}

// ── Lifecycle ────────────────────────────────────────────────────

#[tokio::test]
async fn test_second_publisher_on_same_stream_fails_to_bind() {
    let dir = tempfile::tempdir().unwrap();
    let _first = FramePublisher::open_with_config("cam", pub_config(dir.path(), 30))
        .await
        .unwrap();
    let err = FramePublisher::open_with_config("cam", pub_config(dir.path(), 30))
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::Bind { .. }));
    // The loser must not have removed the winner's socket.
    assert!(dir.path().join("cam").exists());
}

#[tokio::test]
async fn test_close_then_reopen_same_stream() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = FramePublisher::open_with_config("cam", pub_config(dir.path(), 30))
        .await
        .unwrap();
    first.close().await;

    let mut second = FramePublisher::open_with_config("cam", pub_config(dir.path(), 30))
        .await
        .unwrap();
    let mut subscriber = FrameSubscriber::connect_with_config("cam", sub_config(dir.path()))
        .await
        .unwrap();
    assert!(second.publish(&small_frame(3)).unwrap().is_sent());
    assert_eq!(next_frame(&mut subscriber).await, small_frame(3));
}

#[tokio::test]
async fn test_close_then_reopen_same_tcp_stream() {
    let config = PublisherConfig {
        target_fps: 30,
        address: AddressConfig {
            scheme: TransportScheme::Tcp,
            base_port: 52000,
            port_span: 900,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut first = FramePublisher::open_with_config("reopen-tcp", config.clone())
        .await
        .unwrap();
    first.close().await;

    let mut second = FramePublisher::open_with_config("reopen-tcp", config.clone())
        .await
        .unwrap();
    let mut subscriber = FrameSubscriber::connect_with_config(
        "reopen-tcp",
        SubscriberConfig {
            address: config.address,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(second.publish(&small_frame(8)).unwrap().is_sent());
    assert_eq!(next_frame(&mut subscriber).await, small_frame(8));
}

#[tokio::test]
async fn test_stale_socket_is_recovered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cam");
    drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
    assert!(path.exists());

    let mut publisher = FramePublisher::open_with_config("cam", pub_config(dir.path(), 30))
        .await
        .unwrap();
    let mut subscriber = FrameSubscriber::connect_with_config("cam", sub_config(dir.path()))
        .await
        .unwrap();
    assert!(publisher.publish(&small_frame(4)).unwrap().is_sent());
    assert_eq!(next_frame(&mut subscriber).await, small_frame(4));
}

#[tokio::test]
async fn test_not_connected_after_close_and_disconnect() {
    let dir = tempfile::tempdir().unwrap();
    let mut publisher = FramePublisher::open_with_config("cam", pub_config(dir.path(), 30))
        .await
        .unwrap();
    let mut subscriber = FrameSubscriber::connect_with_config("cam", sub_config(dir.path()))
        .await
        .unwrap();

    subscriber.disconnect();
    subscriber.disconnect();
    assert!(matches!(
        subscriber.get_next(),
        Err(StreamError::NotConnected)
    ));
    assert!(!subscriber.is_linked());

    publisher.close().await;
    assert!(matches!(
        publisher.publish(&small_frame(1)),
        Err(StreamError::NotConnected)
    ));
}

#[tokio::test]
async fn test_subscriber_count_follows_disconnects() {
    let dir = tempfile::tempdir().unwrap();
    let mut publisher = FramePublisher::open_with_config("cam", pub_config(dir.path(), 500))
        .await
        .unwrap();
    let subscriber = FrameSubscriber::connect_with_config("cam", sub_config(dir.path()))
        .await
        .unwrap();
    assert_eq!(publisher.subscriber_count(), 1);

    drop(subscriber);
    wait_for(|| publisher.subscriber_count() == 0).await;
    assert_eq!(
        publisher.publish(&small_frame(1)).unwrap(),
        PublishOutcome::Sent { subscribers: 0 }
    );
}

#[tokio::test]
async fn test_subscriber_reconnects_after_publisher_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut publisher = FramePublisher::open_with_config("cam", pub_config(dir.path(), 500))
        .await
        .unwrap();
    let mut subscriber = FrameSubscriber::connect_with_config("cam", sub_config(dir.path()))
        .await
        .unwrap();

    publisher.close().await;
    wait_for(|| !subscriber.is_linked()).await;
    assert!(subscriber.get_next().unwrap().is_none());

    let mut publisher = FramePublisher::open_with_config("cam", pub_config(dir.path(), 500))
        .await
        .unwrap();
    wait_for(|| subscriber.is_linked()).await;
    assert_eq!(subscriber.stats().reconnects, 1);

    assert!(publisher.publish(&small_frame(9)).unwrap().is_sent());
    assert_eq!(next_frame(&mut subscriber).await, small_frame(9));
}

#[tokio::test]
async fn test_unread_frame_survives_publisher_exit() {
    let dir = tempfile::tempdir().unwrap();
    let mut publisher = FramePublisher::open_with_config("cam", pub_config(dir.path(), 30))
        .await
        .unwrap();
    let mut subscriber = FrameSubscriber::connect_with_config(
        "cam",
        SubscriberConfig {
            reconnect: false,
            ..sub_config(dir.path())
        },
    )
    .await
    .unwrap();

    assert!(publisher.publish(&small_frame(6)).unwrap().is_sent());
    wait_for(|| subscriber.stats().received == 1).await;
    publisher.close().await;
    wait_for(|| !subscriber.is_linked()).await;
    // Let the receive task finish for good.
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(subscriber.get_next().unwrap(), Some(small_frame(6)));
    assert!(subscriber.get_next().unwrap().is_none());
}

#[tokio::test]
async fn test_tcp_scheme_pair() {
    let cfg = AddressConfig {
        scheme: TransportScheme::Tcp,
        base_port: 51000,
        port_span: 900,
        ..Default::default()
    };
    let mut publisher = FramePublisher::open_with_config(
        "tcp-pair",
        PublisherConfig {
            target_fps: 30,
            address: cfg.clone(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let mut subscriber = FrameSubscriber::connect_with_config(
        "tcp-pair",
        SubscriberConfig {
            address: cfg,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(publisher.publish(&small_frame(5)).unwrap().is_sent());
    assert_eq!(next_frame(&mut subscriber).await, small_frame(5));
}

// ── Wire errors (fake publisher) ─────────────────────────────────

#[tokio::test]
async fn test_corrupt_message_does_not_poison_subscriber() {
    let dir = tempfile::tempdir().unwrap();
    let listener = tokio::net::UnixListener::bind(dir.path().join("cam")).unwrap();
    let (go_tx, go_rx) = tokio::sync::oneshot::channel::<()>();

    let fake = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut link = Framed::new(stream, EnvelopeCodec::new());
        link.send(Envelope::Hello(Hello::new("cam"))).await.unwrap();
        link.send(Envelope::Frame(Bytes::from_static(b"VSTR not a frame")))
            .await
            .unwrap();
        go_rx.await.unwrap();
        let good = encode_frame(&small_frame(7)).unwrap();
        link.send(Envelope::Frame(good)).await.unwrap();
        // Keep the link open until the test is done with it.
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let mut subscriber = FrameSubscriber::connect_with_config("cam", sub_config(dir.path()))
        .await
        .unwrap();

    wait_for(|| subscriber.stats().received >= 1).await;
    assert!(subscriber.get_next().unwrap().is_none());
    assert_eq!(subscriber.stats().malformed, 1);
    assert!(subscriber.is_linked());

    go_tx.send(()).unwrap();
    assert_eq!(next_frame(&mut subscriber).await, small_frame(7));
    fake.abort();
}

#[tokio::test]
async fn test_handshake_rejects_foreign_stream() {
    let dir = tempfile::tempdir().unwrap();
    let listener = tokio::net::UnixListener::bind(dir.path().join("cam")).unwrap();

    let fake = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut link = Framed::new(stream, EnvelopeCodec::new());
        link.send(Envelope::Hello(Hello::new("other"))).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
    });

    let err = FrameSubscriber::connect_with_config("cam", sub_config(dir.path()))
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::Handshake(_)));
    assert!(err.to_string().contains("other"));
    fake.abort();
}

#[tokio::test]
async fn test_silent_publisher_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let listener = tokio::net::UnixListener::bind(dir.path().join("cam")).unwrap();
    let fake = tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let config = SubscriberConfig {
        handshake_timeout: Duration::from_millis(100),
        ..sub_config(dir.path())
    };
    let err = FrameSubscriber::connect_with_config("cam", config)
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::Timeout(_)));
    fake.abort();
}

// ── Publish loop ─────────────────────────────────────────────────

#[tokio::test]
async fn test_run_streams_synthetic_frames() {
    let dir = tempfile::tempdir().unwrap();
    let mut publisher = FramePublisher::open_with_config("synth", pub_config(dir.path(), 100))
        .await
        .unwrap();
    let mut subscriber = FrameSubscriber::connect_with_config("synth", sub_config(dir.path()))
        .await
        .unwrap();

    let source = SyntheticSource::new(SyntheticConfig {
        height: 8,
        width: 12,
        points: 50,
        warmup_frames: 1,
        limit: Some(10),
    })
    .unwrap();
    let running = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
    let source = publisher.run(source, running).await.unwrap();
    assert_eq!(source.frames_produced(), 10);
    assert_eq!(publisher.stats().published, 10);

    // Latest wins: whatever else was dropped, the last frame shows up.
    let expected = source.frame_at(9).unwrap();
    let last = loop {
        let frame = next_frame(&mut subscriber).await;
        if frame == expected {
            break frame;
        }
    };
    assert!(!last.pose_is_identity());
    assert!(subscriber.stats().received <= 10);
}
