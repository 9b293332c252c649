//! Link-layer scenarios against the scripted bus.

use std::sync::Arc;

use dgtbridge::app::ClockTime;
use dgtbridge::config::GatewayConfig;
use dgtbridge::error::LinkError;
use dgtbridge::link::frame;
use dgtbridge::link::{ClockLink, LinkState, RxShared};

use crate::mock_bus::MockBus;

fn test_config() -> GatewayConfig {
    let mut cfg = GatewayConfig::default();
    cfg.ack_timeout_ms = 10;
    cfg.ack_poll_ms = 1;
    cfg.ping_timeout_ms = 5;
    cfg
}

fn make_link() -> ClockLink<MockBus> {
    let rx = Arc::new(RxShared::new());
    ClockLink::new(MockBus::new(Arc::clone(&rx)), rx, test_config())
}

#[test]
fn configure_sequence_and_frames() {
    let mut link = make_link();
    link.begin().unwrap();
    link.configure().unwrap();

    assert_eq!(link.state(), LinkState::Configured);
    assert_eq!(
        link.bus().codes(),
        vec![
            frame::CMD_CHANGE_STATE,
            frame::CMD_SET_CENTRAL_CONTROL,
            frame::CMD_CHANGE_STATE,
            frame::CMD_SET_AND_RUN,
        ]
    );

    // Every outbound frame carries a valid seeded CRC.
    for w in &link.bus().writes {
        assert!(
            dgtbridge::link::crc::verify(&w.frame),
            "bad CRC on {:02X?}",
            w.frame
        );
    }

    // After configure the slave listens for time/button traffic again.
    assert_eq!(link.bus().listen, frame::ADDR_LISTEN_DATA);
}

#[test]
fn cold_start_wakeup_sequence() {
    let rx = Arc::new(RxShared::new());
    let mut bus = MockBus::new(Arc::clone(&rx));
    bus.fail_writes = 1;
    bus.answer_ping = true;
    let mut link = ClockLink::new(bus, rx, test_config());

    link.begin().unwrap();
    link.configure().unwrap();
    assert_eq!(link.state(), LinkState::Configured);

    // The ping went to the wake-up alias with the pinned frame bytes.
    let ping = link
        .bus()
        .writes
        .iter()
        .find(|w| w.addr == frame::ADDR_WAKEUP)
        .expect("no wake-up ping transmitted");
    assert_eq!(&ping.frame[..3], &[0x20, 0x05, 0x0D]);
}

#[test]
fn dead_clock_reports_clock_off() {
    let rx = Arc::new(RxShared::new());
    let mut bus = MockBus::new(Arc::clone(&rx));
    bus.fail_writes = u32::MAX;
    let mut link = ClockLink::new(bus, rx, test_config());

    link.begin().unwrap();
    assert_eq!(link.configure(), Err(LinkError::ClockOff));
    assert_eq!(link.last_error(), Some(LinkError::ClockOff));
    assert_eq!(link.error_string(), "clock is off");
}

#[test]
fn acked_send_switches_listen_and_reverts() {
    let mut link = make_link();
    link.begin().unwrap();
    link.configure().unwrap();
    let rebinds_before = link.bus().rebinds;

    link.display_text("Hi", 1, frame::DOT_FLAG, frame::DOT_COLON)
        .unwrap();

    // One switch to the ACK address, one back to data.
    assert_eq!(link.bus().rebinds, rebinds_before + 2);
    assert_eq!(link.bus().listen, frame::ADDR_LISTEN_DATA);
}

#[test]
fn unacked_commands_never_rebind() {
    let mut link = make_link();
    link.begin().unwrap();
    link.configure().unwrap();
    let rebinds_before = link.bus().rebinds;

    link.end_display().unwrap();
    link.set_and_run(
        &ClockTime::new(0, 10, 0, 0, 10, 0),
        frame::ClockMode::CountDown,
        frame::ClockMode::CountDown,
    )
    .unwrap();

    assert_eq!(link.bus().rebinds, rebinds_before, "no ACK, no switch");
}

#[test]
fn run_uses_live_snapshot() {
    let mut link = make_link();
    link.begin().unwrap();
    link.configure().unwrap();

    link.bus().inject_time(&ClockTime::new(0, 25, 13, 1, 0, 59));
    link.run(frame::ClockMode::CountDown, frame::ClockMode::CountUp)
        .unwrap();

    let f = link.bus().last_frame();
    assert_eq!(f[2], frame::CMD_SET_AND_RUN);
    assert_eq!(f[3], 0);
    assert_eq!(f[4], 0x25, "left minutes BCD");
    assert_eq!(f[5], 0x13, "left seconds BCD");
    assert_eq!(f[6], 1);
    assert_eq!(f[8], 0x59, "right seconds BCD");
    assert_eq!(f[9], 0x02 | (0x01 << 2), "down | up<<2");
}

#[test]
fn lost_ack_drops_connection_after_retries() {
    let mut link = make_link();
    link.begin().unwrap();
    link.configure().unwrap();

    link.bus_mut().auto_ack = false;
    let writes_before = link.bus().writes.len();
    assert_eq!(link.display_text("x", 0, 0, 0), Err(LinkError::NoAck));
    assert_eq!(link.bus().writes.len(), writes_before + 3, "three attempts");
    assert_eq!(link.state(), LinkState::Initialized);
    assert!(!link.is_connected());
}

#[test]
fn time_frame_promotes_connected_without_configure() {
    let mut link = make_link();
    link.begin().unwrap();

    link.bus().inject_time(&ClockTime::new(0, 1, 0, 0, 1, 0));
    assert_eq!(link.state(), LinkState::Connected);
    assert!(!link.is_configured(), "time alone never implies Configured");
    assert_eq!(link.take_new_time(), Some(ClockTime::new(0, 1, 0, 0, 1, 0)));
    assert_eq!(link.take_new_time(), None);
}

#[test]
fn explicit_change_state_is_acked() {
    let mut link = make_link();
    link.begin().unwrap();
    link.configure().unwrap();
    let rebinds_before = link.bus().rebinds;

    link.change_state(frame::STATE_RUN).unwrap();

    let f = link.bus().last_frame();
    assert_eq!(&f[..4], &[0x20, 0x06, 0x0B, 0x03]);
    assert_eq!(link.bus().rebinds, rebinds_before + 2, "ACK switch + revert");
}

#[test]
fn button_events_flow_through_ring() {
    let mut link = make_link();
    link.begin().unwrap();
    link.configure().unwrap();

    link.bus().inject_button(0x00, 0x00);
    link.bus().inject_button(0x04, 0x00);
    assert_eq!(link.get_button_event(), Some(0x04), "exactly one event");
    assert_eq!(link.get_button_event(), None);
    assert_eq!(link.get_button_state(), 0x04);

    // Lever throw.
    link.bus().inject_button(0x44, 0x04);
    assert_eq!(link.get_button_event(), Some(0xC0));
}
