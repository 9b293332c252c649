//! Bounded FIFO queues with timeouts and priority insert.
//!
//! Capacity is enforced on the sender side: `send` with a zero timeout
//! fails immediately when full, a positive timeout waits for space up
//! to the deadline, and either way a failed send consumes (drops) the
//! item — the ownership-conservation rule the rest of the system relies
//! on. `recv` mirrors the same timeout semantics for items.
//!
//! [`EventQueue`] adds `send_priority`, which inserts at the head so
//! urgent events (discrete buttons, errors) overtake queued time
//! updates. Priority items preserve insertion order among themselves.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A bounded multi-producer FIFO with blocking send/recv.
pub struct BoundedQueue<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
    /// Signalled on pop (space available).
    space: Condvar,
    /// Signalled on push (item available).
    items: Condvar,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            space: Condvar::new(),
            items: Condvar::new(),
        }
    }

    /// Enqueue `item`, waiting up to `timeout_ms` for space. Returns
    /// `false` on timeout — the item is dropped, never leaked.
    pub fn send(&self, item: T, timeout_ms: u32) -> bool {
        self.push(item, timeout_ms, false)
    }

    /// Dequeue, waiting up to `timeout_ms` for an item. Zero means
    /// non-blocking.
    pub fn recv(&self, timeout_ms: u32) -> Option<T> {
        let mut q = self.inner.lock().ok()?;
        if q.is_empty() && timeout_ms > 0 {
            let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));
            while q.is_empty() {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let (guard, _) = self.items.wait_timeout(q, deadline - now).ok()?;
                q = guard;
            }
        }
        let item = q.pop_front();
        if item.is_some() {
            drop(q);
            self.space.notify_one();
        }
        item
    }

    /// Items currently queued.
    pub fn depth(&self) -> usize {
        self.inner.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Remaining capacity.
    pub fn free_space(&self) -> usize {
        self.capacity - self.depth()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.depth() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    /// Drain and destroy everything; returns the number of items
    /// dropped.
    pub fn flush(&self) -> usize {
        let Ok(mut q) = self.inner.lock() else {
            return 0;
        };
        let n = q.len();
        q.clear();
        drop(q);
        self.space.notify_all();
        n
    }

    fn push(&self, item: T, timeout_ms: u32, front: bool) -> bool {
        let Ok(mut q) = self.inner.lock() else {
            return false; // poisoned: drop the item
        };
        if q.len() >= self.capacity && timeout_ms > 0 {
            let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));
            while q.len() >= self.capacity {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let Ok((guard, _)) = self.space.wait_timeout(q, deadline - now) else {
                    return false;
                };
                q = guard;
            }
        }
        if q.len() >= self.capacity {
            return false; // full: item dropped here
        }
        if front {
            q.push_front(item);
        } else {
            q.push_back(item);
        }
        drop(q);
        self.items.notify_one();
        true
    }
}

/// A [`BoundedQueue`] that additionally supports head insertion for
/// priority items.
pub struct EventQueue<T> {
    queue: BoundedQueue<T>,
}

impl<T> EventQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: BoundedQueue::new(capacity),
        }
    }

    pub fn send(&self, item: T, timeout_ms: u32) -> bool {
        self.queue.send(item, timeout_ms)
    }

    /// Insert at the head. Multiple priority sends preserve their
    /// insertion order relative to each other: the newest priority item
    /// lands *behind* the ones already at the head.
    pub fn send_priority(&self, item: T, timeout_ms: u32) -> bool
    where
        T: Priority,
    {
        let Ok(mut q) = self.queue.inner.lock() else {
            return false;
        };
        if q.len() >= self.queue.capacity {
            drop(q);
            // Same timeout discipline as a tail send.
            if timeout_ms == 0 {
                return false;
            }
            return self.queue.push(item, timeout_ms, true);
        }
        // Skip past any priority items already parked at the head.
        let mut insert_at = 0;
        while insert_at < q.len() && q[insert_at].is_priority() {
            insert_at += 1;
        }
        q.insert(insert_at, item);
        drop(q);
        self.queue.items.notify_one();
        true
    }

    pub fn recv(&self, timeout_ms: u32) -> Option<T> {
        self.queue.recv(timeout_ms)
    }

    pub fn depth(&self) -> usize {
        self.queue.depth()
    }

    pub fn free_space(&self) -> usize {
        self.queue.free_space()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn flush(&self) -> usize {
        self.queue.flush()
    }
}

/// Marker trait so head insertion can keep priority items in their own
/// insertion order.
pub trait Priority {
    fn is_priority(&self) -> bool;
}

impl Priority for crate::app::ClockEvent {
    fn is_priority(&self) -> bool {
        self.priority == crate::app::events::PRIORITY_HIGH
    }
}
