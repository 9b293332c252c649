//! Queue statistics and health monitoring.
//!
//! Event traffic is counted here (queued, processed, overflowed, timed
//! out, high-water depth); raw commands are deliberately not — the
//! clock task counts those as commands processed. The health monitor
//! rates the transport healthy while every queue stays below the
//! utilization threshold, re-evaluating at most once per interval.

use core::sync::atomic::{AtomicU32, Ordering};

use log::warn;

// ───────────────────────────────────────────────────────────────
// Statistics
// ───────────────────────────────────────────────────────────────

/// Relaxed counters shared by both ends of the event path.
pub struct QueueStats {
    events_queued: AtomicU32,
    events_processed: AtomicU32,
    queue_overflows: AtomicU32,
    queue_timeouts: AtomicU32,
    max_event_queue_depth: AtomicU32,
}

impl Default for QueueStats {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueStats {
    pub fn new() -> Self {
        Self {
            events_queued: AtomicU32::new(0),
            events_processed: AtomicU32::new(0),
            queue_overflows: AtomicU32::new(0),
            queue_timeouts: AtomicU32::new(0),
            max_event_queue_depth: AtomicU32::new(0),
        }
    }

    /// Record a successful event enqueue and track the high-water mark.
    pub fn note_event_queued(&self, depth_after: usize) {
        self.events_queued.fetch_add(1, Ordering::Relaxed);
        self.max_event_queue_depth
            .fetch_max(depth_after as u32, Ordering::Relaxed);
    }

    pub fn note_event_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// An event was dropped because the queue was full.
    pub fn note_overflow(&self) {
        self.queue_overflows.fetch_add(1, Ordering::Relaxed);
    }

    /// A blocking send gave up at its deadline.
    pub fn note_timeout(&self) {
        self.queue_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_queued(&self) -> u32 {
        self.events_queued.load(Ordering::Relaxed)
    }

    pub fn events_processed(&self) -> u32 {
        self.events_processed.load(Ordering::Relaxed)
    }

    pub fn queue_overflows(&self) -> u32 {
        self.queue_overflows.load(Ordering::Relaxed)
    }

    pub fn queue_timeouts(&self) -> u32 {
        self.queue_timeouts.load(Ordering::Relaxed)
    }

    pub fn max_event_queue_depth(&self) -> u32 {
        self.max_event_queue_depth.load(Ordering::Relaxed)
    }

    /// Zero every counter (disconnect teardown).
    pub fn reset(&self) {
        self.events_queued.store(0, Ordering::Relaxed);
        self.events_processed.store(0, Ordering::Relaxed);
        self.queue_overflows.store(0, Ordering::Relaxed);
        self.queue_timeouts.store(0, Ordering::Relaxed);
        self.max_event_queue_depth.store(0, Ordering::Relaxed);
    }
}

// ───────────────────────────────────────────────────────────────
// Health monitor
// ───────────────────────────────────────────────────────────────

/// Periodic utilization check over all queues.
pub struct HealthMonitor {
    interval_ms: u32,
    threshold: f32,
    last_check_ms: u64,
    healthy: bool,
}

impl HealthMonitor {
    pub fn new(interval_ms: u32, threshold: f32) -> Self {
        Self {
            interval_ms,
            threshold,
            last_check_ms: 0,
            healthy: true,
        }
    }

    /// Re-evaluate when the interval has elapsed. `usage` is a list of
    /// `(depth, capacity)` pairs, one per queue. Returns the current
    /// verdict either way.
    pub fn check(&mut self, now_ms: u64, usage: &[(usize, usize)]) -> bool {
        if now_ms.saturating_sub(self.last_check_ms) < u64::from(self.interval_ms)
            && self.last_check_ms != 0
        {
            return self.healthy;
        }
        self.last_check_ms = now_ms;

        let was_healthy = self.healthy;
        self.healthy = usage
            .iter()
            .all(|&(depth, cap)| (depth as f32) < (cap as f32) * self.threshold);

        if was_healthy && !self.healthy {
            warn!("queues: utilization above {:.0}%", self.threshold * 100.0);
        }
        self.healthy
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }
}
