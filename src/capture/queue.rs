//! Bounded frame queue with anchor-aware overflow
//!
//! The scheduler pushes without ever blocking; when the queue is full the
//! overflow policy evicts the first non-anchor frame it can find near the
//! front, falling back to the oldest frame outright. Surviving frames keep
//! their relative order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use super::frame::TimestampedFrame;

/// How far from the front the eviction scan looks for a non-anchor victim.
const EVICTION_SCAN_BOUND: usize = 8;

/// Payload of the capture queue.
#[derive(Debug)]
pub enum QueueItem {
    Frame(TimestampedFrame),
    /// Sentinel enqueued at shutdown; the consumer exits once it reaches it,
    /// which by FIFO order means all earlier frames were drained first.
    Shutdown,
}

pub struct FrameQueue {
    items: Mutex<VecDeque<QueueItem>>,
    available: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity + 1)),
            available: Condvar::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Push a frame, evicting under overflow. Never blocks.
    ///
    /// Returns the frame that was evicted to make room, if any; the caller
    /// owns returning its buffer to the pool and deciding whether the drop
    /// count warrants notifying the adaptive controller.
    pub fn push(&self, frame: TimestampedFrame) -> Option<TimestampedFrame> {
        let mut items = self.items.lock().expect("frame queue poisoned");

        let mut evicted = None;
        if self.frame_count(&items) >= self.capacity {
            if let Some(victim) = self.pick_victim(&items) {
                if let Some(QueueItem::Frame(old)) = items.remove(victim) {
                    evicted = Some(old);
                }
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }

        items.push_back(QueueItem::Frame(frame));
        drop(items);
        self.available.notify_one();
        evicted
    }

    /// Append the shutdown sentinel. Sentinels are never evicted and do not
    /// count against capacity.
    pub fn push_sentinel(&self) {
        let mut items = self.items.lock().expect("frame queue poisoned");
        items.push_back(QueueItem::Shutdown);
        drop(items);
        self.available.notify_all();
    }

    /// Pop the front item, waiting up to `timeout` for one to arrive.
    ///
    /// Re-waits after spurious or stolen wakeups, so an empty return means
    /// the full timeout really elapsed.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<QueueItem> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock().expect("frame queue poisoned");
        while items.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .available
                .wait_timeout(items, deadline - now)
                .expect("frame queue poisoned");
            items = guard;
        }
        items.pop_front()
    }

    /// Current number of queued frames and the configured capacity.
    pub fn occupancy(&self) -> (usize, usize) {
        let items = self.items.lock().expect("frame queue poisoned");
        (self.frame_count(&items), self.capacity)
    }

    /// Total frames evicted by the overflow policy so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn frame_count(&self, items: &VecDeque<QueueItem>) -> usize {
        items
            .iter()
            .filter(|item| matches!(item, QueueItem::Frame(_)))
            .count()
    }

    /// Index of the frame to evict: first non-anchor within the scan bound,
    /// else the oldest frame. Sentinels are never candidates.
    fn pick_victim(&self, items: &VecDeque<QueueItem>) -> Option<usize> {
        let mut oldest_frame = None;
        for (idx, item) in items.iter().enumerate().take(EVICTION_SCAN_BOUND) {
            if let QueueItem::Frame(frame) = item {
                if oldest_frame.is_none() {
                    oldest_frame = Some(idx);
                }
                if !frame.anchor {
                    return Some(idx);
                }
            }
        }
        // All scanned frames were anchors: fall back to the oldest.
        oldest_frame.or_else(|| {
            items
                .iter()
                .position(|item| matches!(item, QueueItem::Frame(_)))
        })
    }
}
