//! End-to-end clock-task scenarios: BLE lifecycle, command dispatch,
//! button repeat, recovery.

use std::sync::Arc;

use dgtbridge::adapters::ble::BleSignals;
use dgtbridge::app::{ClockTime, RawCommand, StatusRegistry};
use dgtbridge::config::GatewayConfig;
use dgtbridge::link::frame;
use dgtbridge::link::{ClockLink, LinkState, RxShared};
use dgtbridge::task::{ClockTask, TaskState};
use dgtbridge::transport::QueueHub;

use crate::mock_bus::MockBus;

struct Rig {
    task: ClockTask<MockBus>,
    queues: Arc<QueueHub>,
    signals: Arc<BleSignals>,
    status: Arc<StatusRegistry>,
    rx: Arc<RxShared>,
}

fn make_rig() -> Rig {
    let mut cfg = GatewayConfig::default();
    cfg.ack_timeout_ms = 10;
    cfg.ack_poll_ms = 1;
    cfg.ping_timeout_ms = 5;

    let queues = QueueHub::new(&cfg);
    let signals = Arc::new(BleSignals::new());
    let status = Arc::new(StatusRegistry::new());
    let rx = Arc::new(RxShared::new());
    let link = ClockLink::new(MockBus::new(Arc::clone(&rx)), Arc::clone(&rx), cfg.clone());
    let task = ClockTask::new(
        link,
        Arc::clone(&queues),
        Arc::clone(&signals),
        Arc::clone(&status),
        cfg,
    );
    Rig {
        task,
        queues,
        signals,
        status,
        rx,
    }
}

fn push_command(rig: &Rig, payload: &str) {
    let raw = RawCommand::new(0, payload.as_bytes()).unwrap();
    assert!(rig.queues.raw_commands.send(raw, 0));
}

fn drain_events(rig: &Rig) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    while let Some(ev) = rig.queues.events.recv(0) {
        out.push(ev.to_json());
    }
    out
}

// ── Lifecycle ─────────────────────────────────────────────────

#[test]
fn ble_connect_configures_and_reports() {
    let mut rig = make_rig();
    rig.signals.set_connected(true);
    rig.task.tick(0);

    assert_eq!(rig.task.state(), TaskState::Running);
    assert_eq!(rig.task.link_state(), LinkState::Configured);

    let events = drain_events(&rig);
    let status_ev = events
        .iter()
        .find(|e| e["type"] == "connectionStatus")
        .expect("no connectionStatus event");
    assert_eq!(status_ev["data"]["connected"], true);
    assert_eq!(status_ev["data"]["configured"], true);
}

#[test]
fn ble_disconnect_tears_everything_down() {
    let mut rig = make_rig();
    rig.signals.set_connected(true);
    rig.task.tick(0);
    push_command(&rig, r#"{"id":"a","command":"getTime"}"#);
    rig.task.tick(10);
    assert!(rig.status.commands_processed() > 0);

    rig.signals.set_connected(false);
    rig.task.tick(20);

    assert_eq!(rig.task.state(), TaskState::Idle);
    assert_eq!(rig.task.link_state(), LinkState::Uninitialized);
    assert!(rig.queues.events.is_empty(), "queues flushed");
    assert!(rig.queues.responses.is_empty());
    assert_eq!(rig.status.commands_processed(), 0, "statistics zeroed");
    assert_eq!(rig.queues.stats.events_queued(), 0);

    // A fresh connect starts from scratch and configures again.
    rig.signals.set_connected(true);
    rig.task.tick(30);
    assert_eq!(rig.task.link_state(), LinkState::Configured);
}

#[test]
fn subscription_gets_priority_status_snapshot() {
    let mut rig = make_rig();
    rig.signals.set_connected(true);
    rig.task.tick(0);
    let _ = drain_events(&rig);

    // Park a time update in the queue, then subscribe.
    rig.rx.set_configured(true);
    rig.task.tick(10);
    rig.bus_time(&ClockTime::new(0, 9, 0, 0, 9, 0));
    rig.task.tick(20);
    rig.signals.set_subscribed(true);
    rig.task.tick(30);

    let events = drain_events(&rig);
    assert_eq!(
        events.first().map(|e| e["type"].clone()),
        Some(serde_json::Value::from("connectionStatus")),
        "subscription status jumps the head"
    );
}

impl Rig {
    fn bus_time(&self, t: &ClockTime) {
        self.task_bus().inject_time(t);
    }

    fn task_bus(&self) -> &MockBus {
        self.task.bus()
    }
}

// ── Command path ──────────────────────────────────────────────

#[test]
fn set_time_end_to_end() {
    let mut rig = make_rig();
    rig.signals.set_connected(true);
    rig.task.tick(0);

    push_command(
        &rig,
        r#"{"id":"c1","command":"setTime","params":{
            "leftMode":1,"leftHours":0,"leftMinutes":5,"leftSeconds":0,
            "rightMode":1,"rightHours":0,"rightMinutes":5,"rightSeconds":0}}"#,
    );
    rig.task.tick(10);

    let resp = rig.queues.responses.recv(0).expect("no response").to_json();
    assert_eq!(resp["id"], "c1");
    assert_eq!(resp["status"], "success");
    assert_eq!(resp["result"]["status"], "Time set successfully");

    let f = rig.task_bus().last_frame();
    assert_eq!(f[2], frame::CMD_SET_AND_RUN);
    assert_eq!(f[4], 0x05);
    assert_eq!(f[9], 0x05);
    assert_eq!(rig.status.commands_processed(), 1);
}

#[test]
fn unknown_command_end_to_end() {
    let mut rig = make_rig();
    rig.signals.set_connected(true);
    rig.task.tick(0);
    let state_before = rig.task.link_state();

    push_command(&rig, r#"{"id":"x","command":"foo"}"#);
    rig.task.tick(10);

    let resp = rig.queues.responses.recv(0).unwrap().to_json();
    assert_eq!(resp["type"], "command_response");
    assert_eq!(resp["id"], "x");
    assert_eq!(resp["status"], "error");
    assert_eq!(resp["data"]["errorMessage"], "Unknown command");
    assert_eq!(rig.task.link_state(), state_before, "link state unchanged");
}

#[test]
fn one_command_per_tick() {
    let mut rig = make_rig();
    rig.signals.set_connected(true);
    rig.task.tick(0);

    push_command(&rig, r#"{"id":"1","command":"getTime"}"#);
    push_command(&rig, r#"{"id":"2","command":"getTime"}"#);
    rig.task.tick(10);
    assert_eq!(rig.queues.responses.depth(), 1, "strictly one per tick");
    rig.task.tick(20);
    assert_eq!(rig.queues.responses.depth(), 2);
}

// ── Buttons ───────────────────────────────────────────────────

#[test]
fn discrete_press_then_repeats() {
    let mut rig = make_rig();
    rig.signals.set_connected(true);
    rig.task.tick(0);
    let _ = drain_events(&rig);

    // Play/pause pressed.
    rig.task_bus().inject_button(0x04, 0x00);
    rig.task.tick(10);

    let events = drain_events(&rig);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "buttonEvent");
    assert_eq!(events[0]["data"]["button"], "play_pause");
    assert_eq!(events[0]["data"]["buttonCode"], 4);
    assert_eq!(events[0]["data"]["isRepeat"], false);

    // Held: the hold window restarts at the tick after the discrete
    // event, so the first repeat lands 800 ms after that.
    rig.task.tick(20);
    rig.task.tick(500);
    assert!(drain_events(&rig).is_empty(), "not yet");

    rig.task.tick(820);
    let events = drain_events(&rig);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["data"]["isRepeat"], true);
    assert_eq!(events[0]["data"]["repeatCount"], 1);

    rig.task.tick(1220);
    let events = drain_events(&rig);
    assert_eq!(events[0]["data"]["repeatCount"], 2);

    // Released: no further repeats.
    rig.task_bus().inject_button(0x00, 0x04);
    rig.task.tick(1300);
    let events = drain_events(&rig);
    // The release itself is not an event; only silence follows.
    assert!(events.is_empty());
    rig.task.tick(2500);
    assert!(drain_events(&rig).is_empty());
}

#[test]
fn time_updates_flow_as_events() {
    let mut rig = make_rig();
    rig.signals.set_connected(true);
    rig.task.tick(0);
    let _ = drain_events(&rig);

    rig.bus_time(&ClockTime::new(0, 4, 59, 0, 5, 0));
    rig.task.tick(10);

    let events = drain_events(&rig);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "timeUpdate");
    assert_eq!(events[0]["data"]["left"]["minutes"], 4);
    assert_eq!(events[0]["data"]["left"]["seconds"], 59);
}

// ── Recovery ──────────────────────────────────────────────────

#[test]
fn recovery_after_unplug() {
    let mut rig = make_rig();
    rig.signals.set_connected(true);
    rig.task.tick(0);
    let _ = drain_events(&rig);

    // Unplug: every master write fails, a displayText burns through its
    // three attempts.
    rig.task.bus_mut().fail_writes = u32::MAX;
    push_command(
        &rig,
        r#"{"id":"d","command":"displayText","params":{"text":"oops"}}"#,
    );
    rig.task.tick(1000);

    let resp = rig.queues.responses.recv(0).unwrap().to_json();
    assert_eq!(resp["status"], "error");
    assert!(!rig.rx.is_connected());
    assert_eq!(rig.task.state(), TaskState::Error);

    let events = drain_events(&rig);
    let neg = events
        .iter()
        .find(|e| e["type"] == "connectionStatus")
        .expect("no negative connectionStatus");
    assert_eq!(neg["data"]["connected"], false);

    // Still unplugged 1 s later: a paced attempt fails, an error event
    // reaches the client.
    rig.task.tick(2000);
    let events = drain_events(&rig);
    assert!(events.iter().any(|e| e["type"] == "error"));

    // Plug back in: the next paced attempt reconfigures.
    rig.task.bus_mut().fail_writes = 0;
    rig.task.tick(3000);
    assert_eq!(rig.task.link_state(), LinkState::Configured);
    assert_eq!(rig.task.state(), TaskState::Running);

    rig.task.tick(3010);
    let events = drain_events(&rig);
    let pos = events
        .iter()
        .find(|e| e["type"] == "connectionStatus")
        .expect("no positive connectionStatus");
    assert_eq!(pos["data"]["connected"], true);
    assert_eq!(pos["data"]["configured"], true);
}

#[test]
fn recovery_is_paced() {
    let mut rig = make_rig();
    // Clock dead from the start.
    rig.task.bus_mut().fail_writes = u32::MAX;
    rig.signals.set_connected(true);
    rig.task.tick(0);
    assert_eq!(rig.task.state(), TaskState::Error);
    let writes_probe = rig.task_bus().writes.len();

    // Within the pacing window nothing is attempted.
    rig.task.tick(100);
    rig.task.tick(900);
    assert_eq!(rig.task_bus().writes.len(), writes_probe);
    assert_eq!(rig.task_bus().writes.len(), 0, "all writes failed anyway");

    // After the window an attempt happens (and fails).
    rig.task.tick(1100);
    let events = drain_events(&rig);
    assert!(events.iter().any(|e| e["type"] == "error"));
}
