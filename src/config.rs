//! System configuration parameters
//!
//! All tunable parameters for the gateway. The clock protocol constants
//! (addresses, command codes) live in `link::frame`; this is only the
//! timing/sizing layer that differs between bench setups.

use serde::{Deserialize, Serialize};

/// Core gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    // --- Identity ---
    /// BLE advertised device name
    pub device_name: heapless::String<24>,

    // --- Clock task timing ---
    /// Target clock-task loop period (milliseconds)
    pub loop_period_ms: u32,
    /// ACK wait window per send attempt (milliseconds)
    pub ack_timeout_ms: u32,
    /// Sleep between ACK flag polls (milliseconds)
    pub ack_poll_ms: u32,
    /// Wake-up ping response window (milliseconds)
    pub ping_timeout_ms: u32,
    /// Settle delay after re-binding the slave address (milliseconds)
    pub slave_settle_ms: u32,
    /// Master-send attempts for retried commands
    pub send_retries: u8,

    // --- Recovery ---
    /// Minimum spacing between reconfigure attempts (milliseconds)
    pub recovery_delay_ms: u32,
    /// Reconfigure attempt cap; 0 = unbounded
    pub max_recovery_attempts: u32,

    // --- Button repeat ---
    /// Hold time before the first repeat fires (milliseconds)
    pub repeat_first_ms: u32,
    /// Cadence of subsequent repeats (milliseconds)
    pub repeat_interval_ms: u32,

    // --- Queues ---
    /// Raw-command queue capacity (BLE → clock task)
    pub raw_queue_capacity: usize,
    /// Event queue capacity (clock task → BLE)
    pub event_queue_capacity: usize,
    /// Response queue capacity (clock task → BLE)
    pub response_queue_capacity: usize,
    /// Minimum spacing between queue health evaluations (milliseconds)
    pub health_check_interval_ms: u32,
    /// Utilization above which a queue is considered unhealthy (0.0–1.0)
    pub utilization_threshold: f32,

    // --- BLE ---
    /// Minimum spacing between status characteristic refreshes (milliseconds)
    pub status_refresh_ms: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let mut device_name = heapless::String::new();
        let _ = device_name.push_str("DGT3000-Gateway");
        Self {
            device_name,

            // Clock task timing
            loop_period_ms: 10, // 100 Hz
            ack_timeout_ms: 50,
            ack_poll_ms: 5,
            ping_timeout_ms: 100,
            slave_settle_ms: 10,
            send_retries: 3,

            // Recovery
            recovery_delay_ms: 1000,
            max_recovery_attempts: 0, // unbounded

            // Button repeat
            repeat_first_ms: 800,
            repeat_interval_ms: 400,

            // Queues
            raw_queue_capacity: 10,
            event_queue_capacity: 20,
            response_queue_capacity: 10,
            health_check_interval_ms: 5000,
            utilization_threshold: 0.8,

            // BLE
            status_refresh_ms: 2000,
        }
    }
}
