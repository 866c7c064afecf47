//! End-to-end engine tests over an in-memory bus
//!
//! All tests run under a paused clock; sleeps advance virtual time so the
//! driver loop ticks deterministically.

use std::time::Duration;

use vebus_bridge::protocol::constants::{
    CMD_DC_INFO, CMD_GET_DEVICE_STATUS, CMD_GET_VERSION, CMD_SET_ESS_POWER, CMD_SET_SWITCH,
};
use vebus_bridge::transport::{MockBusHandle, MockTransport, NullTransceiver};
use vebus_bridge::{BridgeConfig, Frame, SwitchState, VeBusCodec, VeBusEngine};

const TICK: Duration = Duration::from_millis(10);

fn test_config() -> BridgeConfig {
    BridgeConfig {
        device: "mock".to_string(),
        queue_capacity: 4,
        max_retries: 3,
        response_timeout_ms: 1000,
        staleness_timeout_ms: 5000,
        frame_timeout_ms: 100,
        tick_interval_ms: 10,
        ..Default::default()
    }
}

fn start_engine() -> (VeBusEngine, MockBusHandle) {
    let (transport, handle) = MockTransport::new();
    let engine = VeBusEngine::start(
        &test_config(),
        Box::new(transport),
        Box::new(NullTransceiver),
    )
    .unwrap();
    (engine, handle)
}

fn dc_frame() -> Frame {
    // 48.00 V, 12.5 A, 100.0 Ah, bulk
    Frame::simple(
        0x00,
        CMD_DC_INFO,
        vec![0xC0, 0x12, 0x7D, 0x00, 0xE8, 0x03, 0x03, 0x00],
    )
}

#[tokio::test(start_paused = true)]
async fn test_inbound_frame_updates_state() {
    let (engine, bus) = start_engine();

    bus.inject(&dc_frame().encode().unwrap());
    tokio::time::sleep(TICK * 2).await;

    let state = engine.snapshot_device_state();
    assert!(state.online);
    assert!((state.dc.voltage - 48.0).abs() < 0.001);
    assert!((state.dc.current - 12.5).abs() < 0.001);
    assert!(engine.is_online());

    let stats = engine.snapshot_statistics();
    assert_eq!(stats.frames_received, 1);
    assert_eq!(stats.unknown_frames, 0);
    assert!((engine.communication_quality() - 1.0).abs() < f64::EPSILON);

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_corrupted_frame_counted_not_applied() {
    let (engine, bus) = start_engine();

    let mut wire = dc_frame().encode().unwrap();
    let last = wire.len() - 1;
    wire[last] = wire[last].wrapping_add(1);
    bus.inject(&wire);
    tokio::time::sleep(TICK * 2).await;

    let stats = engine.snapshot_statistics();
    assert_eq!(stats.checksum_errors, 1);
    assert_eq!(stats.frames_received, 0);
    assert!(!engine.snapshot_device_state().online);

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_submit_reaches_the_wire() {
    let (engine, bus) = start_engine();

    assert!(engine.submit_ess_power(-1500));
    tokio::time::sleep(TICK * 2).await;

    // First allocated command id is 1
    let expected = VeBusCodec::ess_power(-1500, 1).encode().unwrap();
    assert_eq!(bus.sent(), vec![expected]);
    assert_eq!(engine.snapshot_statistics().frames_sent, 1);

    // Acknowledgement frees the in-flight slot without an unknown-frame count
    bus.inject(
        &Frame::simple(0x00, CMD_SET_ESS_POWER, vec![0x01])
            .encode()
            .unwrap(),
    );
    tokio::time::sleep(TICK * 2).await;
    let stats = engine.snapshot_statistics();
    assert_eq!(stats.frames_received, 1);
    assert_eq!(stats.unknown_frames, 0);
    assert_eq!(stats.timeout_errors, 0);

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_queue_exhaustion_rejects_submission() {
    let (engine, _bus) = start_engine();

    // No awaits in between, so the driver never gets a chance to drain
    for _ in 0..4 {
        assert!(engine.submit_device_reset());
    }
    assert!(!engine.submit_device_reset());

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_retry_budget() {
    let (engine, bus) = start_engine();
    bus.set_fail_sends(true);

    assert!(engine.submit_ess_power(200));
    tokio::time::sleep(TICK * 10).await;

    // Initial attempt plus three retries, all failed
    assert_eq!(bus.send_attempts(), 4);
    let stats = engine.snapshot_statistics();
    assert_eq!(stats.frames_dropped, 4);
    assert_eq!(stats.retransmissions, 3);
    assert_eq!(stats.frames_sent, 0);

    // Budget exhausted, nothing more goes out
    tokio::time::sleep(TICK * 10).await;
    assert_eq!(bus.send_attempts(), 4);

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_response_timeout_then_acknowledged() {
    let (engine, bus) = start_engine();

    assert!(engine.submit_switch_state(SwitchState::On));
    tokio::time::sleep(TICK * 2).await;
    assert_eq!(bus.send_attempts(), 1);

    // No reply within the response window: one timeout, one retransmission
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let stats = engine.snapshot_statistics();
    assert_eq!(stats.timeout_errors, 1);
    assert_eq!(stats.retransmissions, 1);
    assert_eq!(bus.send_attempts(), 2);

    // The retry gets its acknowledgement
    bus.inject(
        &Frame::simple(0x00, CMD_SET_SWITCH, vec![0x03, 0x01])
            .encode()
            .unwrap(),
    );
    tokio::time::sleep(TICK * 2).await;
    assert_eq!(
        engine.snapshot_device_state().switch_state,
        Some(SwitchState::On)
    );

    // Settled: no further timeouts or sends
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let stats = engine.snapshot_statistics();
    assert_eq!(stats.timeout_errors, 1);
    assert_eq!(bus.send_attempts(), 2);

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_sync_query_roundtrip() {
    let (engine, bus) = start_engine();

    let reply = Frame::simple(0x00, CMD_GET_VERSION, vec![0x12, 0x34, 0x02]);
    let (version, _) = tokio::join!(engine.request_version(), async {
        tokio::time::sleep(TICK * 2).await;
        bus.inject(&reply.encode().unwrap());
    });

    let version = version.expect("version reply");
    assert_eq!(version.product_id, 0x12);
    assert_eq!(version.firmware_version, 0x34);
    assert_eq!(version.protocol_version, 0x02);

    // The query itself went out on the wire
    let expected = VeBusCodec::version_request().encode().unwrap();
    assert_eq!(bus.sent(), vec![expected]);

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_sync_query_timeout_returns_none() {
    let (engine, bus) = start_engine();

    assert!(engine.request_device_status().await.is_none());

    // The query was sent; only the reply never came
    let expected = VeBusCodec::device_status_request().encode().unwrap();
    assert_eq!(bus.sent(), vec![expected]);
    assert_eq!(
        Frame::decode(&bus.sent()[0]).unwrap().command,
        CMD_GET_DEVICE_STATUS
    );

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_staleness_marks_offline() {
    let (engine, bus) = start_engine();

    bus.inject(&dc_frame().encode().unwrap());
    tokio::time::sleep(TICK * 2).await;
    assert!(engine.is_online());

    tokio::time::sleep(Duration::from_millis(6000)).await;
    let state = engine.snapshot_device_state();
    assert!(!state.online);
    assert!(!engine.is_online());
    // Stale data itself is retained
    assert!((state.dc.voltage - 48.0).abs() < 0.001);

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_rejects_further_work() {
    let (engine, _bus) = start_engine();
    engine.stop().await;

    assert!(!engine.is_running());
    assert!(!engine.submit_ess_power(100));
    assert!(engine.request_version().await.is_none());
}
