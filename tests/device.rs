use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use spheric::events::ids;
use spheric::protocol::{SOP2_EVENT, SOP2_RESPONSE, encode_with_marker};
use spheric::{
    CoreCommands, Device, DeviceConfig, DeviceEvent, Error, Event, Frame, FrameDecoder, Helpers,
    ResponseCode, RobotCommands, metrics_snapshot,
};
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf, duplex,
};
use tokio::sync::broadcast;

/// The robot's end of an in-memory link.
struct Robot {
    port: DuplexStream,
    decoder: FrameDecoder,
}

impl Robot {
    async fn next_command(&mut self) -> Frame {
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                return frame.expect("device sent a valid frame");
            }
            let mut buf = [0u8; 256];
            let read = self.port.read(&mut buf).await.expect("read from device");
            assert!(read > 0, "device hung up");
            self.decoder.push(&buf[..read]);
        }
    }

    async fn respond(&mut self, status: u8, sequence: u8, payload: &[u8]) {
        let bytes = encode_with_marker(SOP2_RESPONSE, 0x00, status, sequence, payload).unwrap();
        self.send_raw(&bytes).await;
    }

    async fn emit(&mut self, id: u8, payload: &[u8]) {
        let bytes = encode_with_marker(SOP2_EVENT, id, 0x00, 0x00, payload).unwrap();
        self.send_raw(&bytes).await;
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.port.write_all(bytes).await.expect("write to device");
    }
}

fn init_tracing() {
    // RUST_LOG=spheric=trace shows the frame flow of a failing test.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn connect(config: DeviceConfig) -> (Device, Robot) {
    init_tracing();
    let (host, robot) = duplex(1024);
    let device = Device::open(host, config);
    let robot = Robot {
        port: robot,
        decoder: FrameDecoder::new(),
    };
    (device, robot)
}

/// Host end of a link that reports a reset instead of a clean end of stream.
struct ResetOnHangup(DuplexStream);

impl AsyncRead for ResetOnHangup {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        ready!(Pin::new(&mut self.0).poll_read(cx, buf))?;
        if buf.filled().len() == before && buf.remaining() > 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "link reset",
            )));
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ResetOnHangup {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

fn quick_timeout() -> DeviceConfig {
    DeviceConfig {
        response_timeout: Some(Duration::from_millis(100)),
        ..DeviceConfig::default()
    }
}

async fn next_event(events: &mut broadcast::Receiver<DeviceEvent>) -> DeviceEvent {
    tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("event in time")
        .expect("channel open")
}

#[tokio::test]
async fn roll_goes_out_and_resolves() {
    let (device, mut robot) = connect(DeviceConfig::default());

    let (response, ()) = tokio::join!(device.roll(255, 180), async {
        let frame = robot.next_command().await;
        assert_eq!(frame.device_id(), 0x02);
        assert_eq!(frame.command_id(), 0x30);
        assert_eq!(frame.payload().as_ref(), &[0xFF, 0x00, 0xB4, 0x01]);
        assert!(frame.options().request_ack);
        assert!(frame.options().reset_inactivity_timer);
        robot.respond(0x00, frame.sequence(), &[]).await;
    });

    let response = response.unwrap();
    assert_eq!(response.opcode.name, "roll");
    assert_eq!(response.sequence, 0);
    assert_eq!(response.status(), ResponseCode::Ok);
    assert_eq!(device.in_flight(), 0);
}

#[tokio::test]
async fn sequences_advance_per_request() {
    let (device, mut robot) = connect(DeviceConfig::default());

    for expected in 0..3u8 {
        let (response, ()) = tokio::join!(device.ping(), async {
            let frame = robot.next_command().await;
            assert_eq!(frame.sequence(), expected);
            robot.respond(0x00, frame.sequence(), &[]).await;
        });
        assert_eq!(response.unwrap().sequence, expected);
    }
}

#[tokio::test]
async fn response_fields_are_decoded() {
    let (device, mut robot) = connect(DeviceConfig::default());

    let (response, ()) = tokio::join!(device.get_rgb_led(), async {
        let frame = robot.next_command().await;
        robot.respond(0x00, frame.sequence(), &[0x10, 0x20, 0x30]).await;
    });

    let response = response.unwrap();
    assert_eq!(response.fields.unsigned("red"), Some(0x10));
    assert_eq!(response.fields.unsigned("green"), Some(0x20));
    assert_eq!(response.fields.unsigned("blue"), Some(0x30));
}

#[tokio::test]
async fn short_response_keeps_raw_payload() {
    let (device, mut robot) = connect(DeviceConfig::default());

    let (response, ()) = tokio::join!(device.get_rgb_led(), async {
        let frame = robot.next_command().await;
        robot.respond(0x00, frame.sequence(), &[0x10]).await;
    });

    let response = response.unwrap();
    assert!(response.fields.is_empty());
    assert_eq!(response.payload().as_ref(), &[0x10]);
}

#[tokio::test]
async fn device_error_status_surfaces() {
    let (device, mut robot) = connect(DeviceConfig::default());

    let (result, ()) = tokio::join!(device.set_back_led(255), async {
        let frame = robot.next_command().await;
        robot.respond(0x07, frame.sequence(), &[]).await;
    });

    match result {
        Err(Error::Device { code, frame }) => {
            assert_eq!(code, ResponseCode::BadParameter);
            assert_eq!(frame.sequence(), 0);
        }
        other => panic!("expected device error, got {other:?}"),
    }
}

#[tokio::test]
async fn corrupted_response_is_never_dispatched() {
    let (device, mut robot) = connect(quick_timeout());
    let before = metrics_snapshot().checksum_failures;

    let (result, ()) = tokio::join!(device.ping(), async {
        let frame = robot.next_command().await;
        let mut bytes =
            encode_with_marker(SOP2_RESPONSE, 0x00, 0x00, frame.sequence(), &[]).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        robot.send_raw(&bytes).await;
    });

    assert!(matches!(result, Err(Error::Timeout { sequence: 0 })));
    assert!(metrics_snapshot().checksum_failures > before);
    assert_eq!(device.in_flight(), 0);

    // The read loop is still alive.
    let (result, ()) = tokio::join!(device.ping(), async {
        let frame = robot.next_command().await;
        robot.respond(0x00, frame.sequence(), &[]).await;
    });
    assert_eq!(result.unwrap().sequence, 1);
}

#[tokio::test]
async fn unmatched_response_does_not_stop_the_loop() {
    let (device, mut robot) = connect(DeviceConfig::default());
    let mut events = device.subscribe();

    robot.respond(0x00, 42, &[]).await;
    robot.emit(ids::PRE_SLEEP_WARNING, &[]).await;

    match next_event(&mut events).await {
        DeviceEvent::Response(frame) => assert_eq!(frame.sequence(), 42),
        other => panic!("expected the stray response, got {other:?}"),
    }
    match next_event(&mut events).await {
        DeviceEvent::Event(event) => assert_eq!(event.name(), "pre_sleep_warning"),
        other => panic!("expected an event, got {other:?}"),
    }
    assert!(metrics_snapshot().unmatched_responses >= 1);
}

#[tokio::test]
async fn collision_event_is_decoded() {
    let (device, mut robot) = connect(DeviceConfig::default());
    let mut events = device.subscribe();

    robot
        .emit(
            ids::COLLISION,
            &[
                0x00, 0x64, 0xFF, 0x9C, 0x00, 0x00, 0x02, 0x00, 0x10, 0x00, 0x20, 0x40, 0x00, 0x00,
                0x01, 0x00,
            ],
        )
        .await;

    let DeviceEvent::Event(Event::Async(collision)) = next_event(&mut events).await else {
        panic!("expected an async event");
    };
    assert_eq!(collision.name, "collision");
    assert_eq!(collision.fields.signed("x"), Some(100));
    assert_eq!(collision.fields.signed("y"), Some(-100));
    assert_eq!(collision.fields.unsigned("axis"), Some(2));
    assert_eq!(collision.fields.unsigned("speed"), Some(0x40));
    assert_eq!(collision.fields.unsigned("timestamp"), Some(256));
}

#[tokio::test]
async fn malformed_and_unknown_events_keep_flowing() {
    let (device, mut robot) = connect(DeviceConfig::default());
    let mut events = device.subscribe();

    robot.emit(ids::COLLISION, &[0x00, 0x01]).await;
    robot.emit(0x7A, &[0xAA]).await;
    robot.emit(ids::BATTERY_STATE, &[0x03]).await;

    match next_event(&mut events).await {
        DeviceEvent::Event(Event::Unknown(frame)) => assert_eq!(frame.event_id(), 0x7A),
        other => panic!("expected the unknown event, got {other:?}"),
    }
    let DeviceEvent::Event(Event::Async(battery)) = next_event(&mut events).await else {
        panic!("expected battery state");
    };
    assert_eq!(battery.fields.label("state"), Some("low"));
}

#[tokio::test]
async fn streaming_samples_follow_the_mask() {
    let (device, mut robot) = connect(DeviceConfig::default());
    let mut events = device.subscribe();

    let (result, ()) = tokio::join!(device.stream_odometer(10, false), async {
        let frame = robot.next_command().await;
        assert_eq!(frame.command_id(), 0x11);
        assert_eq!(
            frame.payload().as_ref(),
            &[0x00, 0x28, 0x00, 0x01, 0, 0, 0, 0, 0x00, 0x0C, 0x00, 0x00, 0x00]
        );
        robot.respond(0x00, frame.sequence(), &[]).await;
    });
    result.unwrap();

    robot.emit(ids::DATA_STREAMING, &[0x00, 0x0A, 0xFF, 0xFB]).await;

    loop {
        match next_event(&mut events).await {
            DeviceEvent::Response(_) => continue,
            DeviceEvent::Event(Event::SensorData(data)) => {
                assert_eq!(data.latest("odometer_x"), Some(10));
                assert_eq!(data.latest("odometer_y"), Some(-5));
                break;
            }
            other => panic!("expected sensor data, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn timeout_frees_the_slot() {
    let (device, mut robot) = connect(quick_timeout());

    let (result, _) = tokio::join!(device.ping(), robot.next_command());
    assert!(matches!(result, Err(Error::Timeout { sequence: 0 })));
    assert_eq!(device.in_flight(), 0);

    // A late answer is just unmatched.
    robot.respond(0x00, 0, &[]).await;
    tokio::task::yield_now().await;
    assert_eq!(device.in_flight(), 0);
}

#[tokio::test]
async fn dropping_the_future_abandons_the_request() {
    let config = DeviceConfig {
        response_timeout: None,
        ..DeviceConfig::default()
    };
    let (device, mut robot) = connect(config);

    let outcome = tokio::time::timeout(Duration::from_millis(50), device.ping()).await;
    assert!(outcome.is_err());
    assert_eq!(device.in_flight(), 0);

    let frame = robot.next_command().await;
    assert_eq!(frame.sequence(), 0);
}

#[tokio::test]
async fn closed_transport_fails_pending_requests() {
    let config = DeviceConfig {
        response_timeout: None,
        ..DeviceConfig::default()
    };
    let (device, mut robot) = connect(config);
    let mut events = device.subscribe();

    let (result, ()) = tokio::join!(device.ping(), async move {
        robot.next_command().await;
        drop(robot);
    });
    assert!(matches!(result, Err(Error::Closed)));
    assert!(device.is_closed());
    assert!(matches!(device.ping().await, Err(Error::Closed)));

    assert!(matches!(next_event(&mut events).await, DeviceEvent::Closed));
}

#[tokio::test]
async fn read_error_reaches_pending_requests_and_subscribers() {
    init_tracing();
    let (host, port) = duplex(1024);
    let config = DeviceConfig {
        response_timeout: None,
        ..DeviceConfig::default()
    };
    let device = Device::open(ResetOnHangup(host), config);
    let mut events = device.subscribe();
    let mut robot = Robot {
        port,
        decoder: FrameDecoder::new(),
    };

    let (result, ()) = tokio::join!(device.ping(), async move {
        robot.next_command().await;
        drop(robot);
    });
    match result {
        Err(Error::Transport(err)) => assert_eq!(err.kind(), io::ErrorKind::ConnectionReset),
        other => panic!("expected the transport error, got {other:?}"),
    }
    assert!(device.is_closed());

    match next_event(&mut events).await {
        DeviceEvent::Error(err) => assert_eq!(err.kind(), io::ErrorKind::ConnectionReset),
        other => panic!("expected the read error, got {other:?}"),
    }
    assert!(matches!(next_event(&mut events).await, DeviceEvent::Closed));
}

#[tokio::test]
async fn close_fails_pending_requests_and_notifies() {
    let config = DeviceConfig {
        response_timeout: None,
        ..DeviceConfig::default()
    };
    let (device, mut robot) = connect(config);
    let mut events = device.subscribe();

    let (result, closed) = tokio::join!(device.ping(), async {
        robot.next_command().await;
        device.close().await
    });
    closed.unwrap();
    assert!(matches!(result, Err(Error::Closed)));
    assert!(device.is_closed());
    assert_eq!(device.in_flight(), 0);

    assert!(matches!(next_event(&mut events).await, DeviceEvent::Closed));
    assert!(matches!(device.ping().await, Err(Error::Closed)));
}

#[tokio::test]
async fn unacknowledged_command_after_close_reports_closed() {
    let config = DeviceConfig {
        request_ack: false,
        ..DeviceConfig::default()
    };
    let (device, _robot) = connect(config);

    device.close().await.unwrap();
    assert!(matches!(device.roll(50, 0).await, Err(Error::Closed)));
}

#[tokio::test]
async fn occupied_sequence_slot_is_reported() {
    let config = DeviceConfig {
        response_timeout: None,
        ..DeviceConfig::default()
    };
    let (device, mut robot) = connect(config);

    // Put sequence 0 on the wire and leave it unanswered.
    let first = device.ping();
    tokio::pin!(first);
    assert!(
        tokio::time::timeout(Duration::from_millis(20), &mut first)
            .await
            .is_err()
    );
    assert_eq!(robot.next_command().await.sequence(), 0);

    // Walk the counter all the way around.
    for expected in 1..=255u8 {
        let (result, ()) = tokio::join!(device.ping(), async {
            let frame = robot.next_command().await;
            robot.respond(0x00, frame.sequence(), &[]).await;
        });
        assert_eq!(result.unwrap().sequence, expected);
    }

    assert!(matches!(
        device.ping().await,
        Err(Error::SequenceExhausted { sequence: 0 })
    ));
    assert_eq!(device.in_flight(), 1);

    robot.respond(0x00, 0, &[]).await;
    assert_eq!(first.await.unwrap().sequence, 0);
    assert_eq!(device.in_flight(), 0);
}

#[tokio::test]
async fn unacknowledged_commands_reuse_the_sequence() {
    let config = DeviceConfig {
        request_ack: false,
        ..DeviceConfig::default()
    };
    let (device, mut robot) = connect(config);

    let first = device.roll(50, 0).await.unwrap();
    let second = device.roll(60, 0).await.unwrap();
    assert!(first.frame.is_none());
    assert_eq!(first.sequence, second.sequence);

    let frame = robot.next_command().await;
    assert!(!frame.options().request_ack);
    assert_eq!(frame.payload().as_ref(), &[50, 0x00, 0x00, 0x01]);
    let frame = robot.next_command().await;
    assert_eq!(frame.payload()[0], 60);
}

#[tokio::test]
async fn oversized_payload_is_rejected_before_sending() {
    let (device, _robot) = connect(DeviceConfig::default());

    let result = device.save_macro(&[0u8; 300]).await;
    assert!(matches!(
        result,
        Err(Error::PayloadTooLarge { size: 300, max: 254 })
    ));
    assert_eq!(device.in_flight(), 0);
}
