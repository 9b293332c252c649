//! Fuzz target: `rx::dispatch_frame`
//!
//! Drives arbitrary byte sequences through the inbound frame dispatcher
//! and asserts that it never panics and that whatever state it leaves
//! behind respects the time invariants.
//!
//! cargo fuzz run fuzz_frame_dispatch

#![no_main]

use dgtbridge::link::rx::{self, RxShared};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let shared = RxShared::new();
    rx::dispatch_frame(&shared, data);

    // Whatever got through must satisfy the time invariants.
    if let Some(time) = shared.take_new_time() {
        assert!(time.is_valid(), "invalid time accepted: {time:?}");
    }

    // Chunked delivery of the same bytes must not panic either.
    let shared = RxShared::new();
    for chunk in data.chunks(3) {
        rx::dispatch_frame(&shared, chunk);
    }
    while shared.pop_button_event().is_some() {}
});
