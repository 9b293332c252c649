//! Full-stack flow: GATT write → queues → clock task → notification.

use std::sync::Arc;

use dgtbridge::adapters::ble::{BleAdapter, BleError, BleSignals};
use dgtbridge::app::StatusRegistry;
use dgtbridge::config::GatewayConfig;
use dgtbridge::link::{ClockLink, RxShared};
use dgtbridge::task::ClockTask;
use dgtbridge::transport::QueueHub;

use crate::mock_bus::MockBus;

struct Stack {
    ble: BleAdapter,
    task: ClockTask<MockBus>,
    status: Arc<StatusRegistry>,
    signals: Arc<BleSignals>,
}

fn make_stack() -> Stack {
    let mut cfg = GatewayConfig::default();
    cfg.ack_timeout_ms = 10;
    cfg.ack_poll_ms = 1;
    cfg.ping_timeout_ms = 5;

    let queues = QueueHub::new(&cfg);
    let signals = Arc::new(BleSignals::new());
    let status = Arc::new(StatusRegistry::new());
    let rx = Arc::new(RxShared::new());

    let link = ClockLink::new(MockBus::new(Arc::clone(&rx)), rx, cfg.clone());
    let task = ClockTask::new(
        link,
        Arc::clone(&queues),
        Arc::clone(&signals),
        Arc::clone(&status),
        cfg.clone(),
    );

    let mut name = heapless::String::<24>::new();
    name.push_str("dgtbridge-it").ok();
    let ble = BleAdapter::new(name, Arc::clone(&signals), queues, cfg.status_refresh_ms);

    Stack {
        ble,
        task,
        status,
        signals,
    }
}

#[test]
fn command_write_to_notification() {
    let mut stack = make_stack();
    stack.ble.start();
    stack.ble.on_central_connected();
    stack.ble.on_event_subscription(true);

    // Clock task notices the connection and configures.
    stack.task.tick(0);

    stack
        .ble
        .on_command_write(br#"{"id":"q1","command":"getTime"}"#, 5)
        .unwrap();
    stack.task.tick(10);

    let sent = stack.ble.pump_notifications(&stack.status);
    assert!(sent >= 2, "response + at least the status event");

    let payloads = stack.ble.take_sent();
    // Responses drain before events.
    let resp: serde_json::Value = serde_json::from_str(&payloads[0]).unwrap();
    assert_eq!(resp["type"], "command_response");
    assert_eq!(resp["id"], "q1");
    assert_eq!(resp["status"], "success");
    assert!(
        payloads[1..].iter().any(|p| p.contains("connectionStatus")),
        "lifecycle event notified"
    );
}

#[test]
fn invalid_write_never_reaches_the_task() {
    let mut stack = make_stack();
    stack.ble.start();
    stack.ble.on_central_connected();
    stack.task.tick(0);
    let commands_before = stack.status.commands_processed();

    assert_eq!(
        stack.ble.on_command_write(b"not json at all", 0),
        Err(BleError::InvalidPayload)
    );
    stack.task.tick(10);
    assert_eq!(stack.status.commands_processed(), commands_before);
}

#[test]
fn disconnect_resets_session_then_reconnect_works() {
    let mut stack = make_stack();
    stack.ble.start();
    stack.ble.on_central_connected();
    stack.task.tick(0);

    stack
        .ble
        .on_command_write(br#"{"id":"a","command":"stop"}"#, 1)
        .unwrap();
    stack.task.tick(10);
    assert_eq!(stack.status.commands_processed(), 1);

    stack.ble.on_central_disconnected();
    assert!(!stack.signals.is_connected());
    stack.task.tick(20);
    assert_eq!(stack.status.commands_processed(), 0, "session state gone");

    stack.ble.on_central_connected();
    stack.task.tick(30);
    stack
        .ble
        .on_command_write(br#"{"id":"b","command":"getStatus"}"#, 31)
        .unwrap();
    stack.task.tick(40);
    let sent = stack.ble.pump_notifications(&stack.status);
    assert!(sent > 0);
    let payloads = stack.ble.take_sent();
    assert!(payloads.iter().any(|p| p.contains("\"id\":\"b\"")));
}

#[test]
fn status_snapshot_serializes() {
    let stack = make_stack();
    let snap = stack.status.snapshot(
        1234,
        100_000,
        dgtbridge::app::status::QueueDepths::default(),
        false,
        false,
        false,
    );
    let s = serde_json::Value::Object(snap).to_string();
    assert!(s.contains("\"uptimeMs\":1234"));
    assert!(s.contains("\"clockConfigured\":false"));
}
