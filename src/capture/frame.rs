//! Timestamped frames and the pre-allocated buffer pool

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// One captured frame on its way from the scheduler to the writer.
///
/// Ownership of the pixel buffer travels with the frame: pool -> queue ->
/// writer -> back to the pool. Sequence numbers are strictly increasing and
/// timestamps are seconds since session start on the monotonic clock.
#[derive(Debug)]
pub struct TimestampedFrame {
    pub pixels: Vec<u8>,
    pub timestamp: f64,
    pub sequence: u64,
    /// Anchor frames are preferred survivors under queue overflow.
    pub anchor: bool,
}

/// Fixed set of pre-allocated pixel buffers, reused to avoid per-frame
/// allocation on the capture path.
///
/// `acquire` never blocks: if every pooled buffer is in flight it allocates a
/// fresh one and counts it, so a slow consumer costs memory rather than
/// capture cadence.
pub struct FrameBufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    capacity: usize,
    frame_len: usize,
    extra_allocations: AtomicU64,
}

impl FrameBufferPool {
    pub fn new(capacity: usize, frame_len: usize) -> Self {
        let free = (0..capacity).map(|_| vec![0u8; frame_len]).collect();
        Self {
            free: Mutex::new(free),
            capacity,
            frame_len,
            extra_allocations: AtomicU64::new(0),
        }
    }

    /// Take a buffer out of the pool, or allocate one if none are free.
    pub fn acquire(&self) -> Vec<u8> {
        let pooled = self.free.lock().expect("frame pool poisoned").pop();
        match pooled {
            Some(buffer) => buffer,
            None => {
                self.extra_allocations.fetch_add(1, Ordering::Relaxed);
                vec![0u8; self.frame_len]
            }
        }
    }

    /// Return a buffer to the pool. Buffers beyond the pool capacity are
    /// simply dropped.
    pub fn release(&self, buffer: Vec<u8>) {
        if buffer.len() != self.frame_len {
            return;
        }
        let mut free = self.free.lock().expect("frame pool poisoned");
        if free.len() < self.capacity {
            free.push(buffer);
        }
    }

    /// Number of allocations made because the pool ran dry.
    pub fn extra_allocations(&self) -> u64 {
        self.extra_allocations.load(Ordering::Relaxed)
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }
}
