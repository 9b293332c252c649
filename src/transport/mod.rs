//! Inter-core queue transport.
//!
//! Three bounded, typed, ownership-transferring queues decouple the BLE
//! loop (core 0) from the clock task (core 1):
//!
//! ```text
//!  BLE loop ──raw commands (10)──▶ clock task
//!  BLE loop ◀──events (20, priority head-insert)── clock task
//!  BLE loop ◀──responses (10)── clock task
//! ```
//!
//! A queued item is owned by the queue; `recv` transfers exclusive
//! ownership to the receiver, and a failed `send` drops the item
//! instead of leaking it. The queues are the only synchronization
//! points between the two cores.

pub mod health;
pub mod queue;

pub use health::{HealthMonitor, QueueStats};
pub use queue::{BoundedQueue, EventQueue};

use std::sync::Arc;

use crate::app::status::QueueDepths;
use crate::app::{ClockEvent, CommandResponse, RawCommand};
use crate::config::GatewayConfig;

/// The three shared queues, bundled for handing to both loops.
pub struct QueueHub {
    pub raw_commands: BoundedQueue<RawCommand>,
    pub events: EventQueue<ClockEvent>,
    pub responses: BoundedQueue<CommandResponse>,
    pub stats: QueueStats,
}

impl QueueHub {
    pub fn new(cfg: &GatewayConfig) -> Arc<Self> {
        Arc::new(Self {
            raw_commands: BoundedQueue::new(cfg.raw_queue_capacity),
            events: EventQueue::new(cfg.event_queue_capacity),
            responses: BoundedQueue::new(cfg.response_queue_capacity),
            stats: QueueStats::new(),
        })
    }

    /// Sample the depths for a status snapshot.
    pub fn depths(&self) -> QueueDepths {
        QueueDepths {
            raw_commands: self.raw_commands.depth(),
            events: self.events.depth(),
            responses: self.responses.depth(),
        }
    }

    /// Drain and destroy every remaining item. Part of the disconnect
    /// teardown and of queue destruction.
    pub fn flush_all(&self) {
        let flushed = self.raw_commands.flush() + self.events.flush() + self.responses.flush();
        if flushed > 0 {
            log::info!("queues: flushed {} pending items", flushed);
        }
    }
}
