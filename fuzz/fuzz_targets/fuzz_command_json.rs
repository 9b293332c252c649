//! Fuzz target: the JSON command parser and dispatcher.
//!
//! Arbitrary bytes go through the same path a GATT command write takes:
//! RawCommand wrapping, JSON parsing, parameter validation, dispatch
//! against an unconfigured link. Must never panic; every response must
//! serialize.
//!
//! cargo fuzz run fuzz_command_json

#![no_main]

use std::sync::Arc;

use dgtbridge::adapters::i2c::SimClockBus;
use dgtbridge::app::{RawCommand, StatusRegistry};
use dgtbridge::config::GatewayConfig;
use dgtbridge::link::{ClockLink, RxShared};
use dgtbridge::task::dispatch::{self, DispatchCtx};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some(raw) = RawCommand::new(0, data) else {
        return;
    };

    let rx = Arc::new(RxShared::new());
    let mut link = ClockLink::new(SimClockBus::new(), rx, GatewayConfig::default());
    let status = StatusRegistry::new();
    let ctx = DispatchCtx {
        status: &status,
        ble_connected: true,
        now_ms: 0,
    };

    if let Some(resp) = dispatch::handle(&raw, &mut link, &ctx) {
        let _ = resp.to_json().to_string();
    }
});
