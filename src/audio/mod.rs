//! Audio capture pipeline
//!
//! Audio flows through its own small pipeline, independent of the video
//! path: the backend's callback pushes [`PcmBlock`]s through an [`AudioPush`]
//! handle into a bounded queue, and the [`AudioRecorder`] write loop drains
//! them into a [`PcmSink`]. The callback never blocks; on overflow the
//! oldest block is dropped and counted. There is no degraded mode here,
//! audio glitches are worse than late video.

mod cpal_source;
mod recorder;
mod wav;

pub use cpal_source::CpalSource;
pub use recorder::AudioRecorder;
pub use wav::{PcmSink, WavSink};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::pipeline::PipelineShared;
use crate::Result;

/// Default bound on the audio block queue.
pub const DEFAULT_AUDIO_QUEUE_CAPACITY: usize = 64;

/// One chunk of interleaved 16-bit PCM on its way to the sink.
///
/// Timestamps are approximate (stamped at push time, not at the hardware
/// clock) and sequence numbers are strictly increasing per session.
#[derive(Debug)]
pub struct PcmBlock {
    pub samples: Vec<i16>,
    pub timestamp: f64,
    pub sequence: u64,
}

/// Negotiated stream parameters, reported by the backend at start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// A source of PCM audio.
///
/// Implementations own their platform stream, which may not be sendable
/// across threads; only the [`AudioPush`] handle crosses into the callback
/// context. `start` reports the format the device actually negotiated.
pub trait AudioSource {
    fn start(&mut self, push: AudioPush) -> Result<AudioFormat>;
    fn stop(&mut self);
    fn backend_name(&self) -> &'static str;
}

/// Bounded FIFO of PCM blocks with drop-oldest overflow.
pub struct BlockQueue {
    blocks: Mutex<VecDeque<PcmBlock>>,
    available: Condvar,
    capacity: usize,
}

impl BlockQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Push a block, dropping the oldest one when full. Never blocks.
    /// Returns true when an old block had to be dropped.
    pub fn push(&self, block: PcmBlock) -> bool {
        let mut blocks = self.blocks.lock().expect("audio queue poisoned");
        let mut dropped = false;
        if blocks.len() >= self.capacity {
            blocks.pop_front();
            dropped = true;
        }
        blocks.push_back(block);
        drop(blocks);
        self.available.notify_one();
        dropped
    }

    /// Pop the oldest block, waiting up to `timeout`. Re-waits after
    /// spurious wakeups so the deadline is honored in full.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<PcmBlock> {
        let deadline = Instant::now() + timeout;
        let mut blocks = self.blocks.lock().expect("audio queue poisoned");
        while blocks.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .available
                .wait_timeout(blocks, deadline - now)
                .expect("audio queue poisoned");
            blocks = guard;
        }
        blocks.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.lock().expect("audio queue poisoned").is_empty()
    }
}

/// Producer-side handle handed to the audio backend.
///
/// Cheap to clone, safe to call from a realtime callback: stamping is two
/// atomic reads and the queue push never blocks.
#[derive(Clone)]
pub struct AudioPush {
    queue: Arc<BlockQueue>,
    shared: Arc<PipelineShared>,
    sequence: Arc<AtomicU64>,
    started_at: Instant,
}

impl AudioPush {
    pub(crate) fn new(queue: Arc<BlockQueue>, shared: Arc<PipelineShared>) -> Self {
        Self {
            queue,
            shared,
            sequence: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    /// Copy `samples` into a stamped block and enqueue it.
    pub fn push_samples(&self, samples: &[i16]) {
        let block = PcmBlock {
            samples: samples.to_vec(),
            timestamp: self.started_at.elapsed().as_secs_f64(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        self.shared.stats.note_audio_block_captured();
        if self.queue.push(block) {
            self.shared.stats.note_audio_block_dropped();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::AdaptiveController;

    fn block(sequence: u64) -> PcmBlock {
        PcmBlock {
            samples: vec![0i16; 4],
            timestamp: sequence as f64 * 0.01,
            sequence,
        }
    }

    #[test]
    fn queue_preserves_order() {
        let queue = BlockQueue::new(8);
        for seq in 0..4 {
            assert!(!queue.push(block(seq)));
        }
        for seq in 0..4 {
            let popped = queue.pop_timeout(Duration::ZERO).expect("block expected");
            assert_eq!(popped.sequence, seq);
        }
    }

    #[test]
    fn overflow_drops_the_oldest_block() {
        let queue = BlockQueue::new(2);
        queue.push(block(0));
        queue.push(block(1));
        assert!(queue.push(block(2)), "third push must report a drop");

        assert_eq!(queue.pop_timeout(Duration::ZERO).unwrap().sequence, 1);
        assert_eq!(queue.pop_timeout(Duration::ZERO).unwrap().sequence, 2);
    }

    #[test]
    fn pop_waits_out_the_full_timeout_before_giving_up() {
        let queue = BlockQueue::new(4);
        let timeout = Duration::from_millis(60);
        let started = Instant::now();
        assert!(queue.pop_timeout(timeout).is_none());
        assert!(
            started.elapsed() >= timeout,
            "an empty pop must not return before the deadline"
        );
    }

    #[test]
    fn push_handle_stamps_increasing_sequences() {
        let queue = Arc::new(BlockQueue::new(8));
        let shared = Arc::new(PipelineShared::new(AdaptiveController::default()));
        let push = AudioPush::new(Arc::clone(&queue), Arc::clone(&shared));

        push.push_samples(&[1, 2]);
        push.push_samples(&[3, 4]);

        let first = queue.pop_timeout(Duration::ZERO).unwrap();
        let second = queue.pop_timeout(Duration::ZERO).unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert!(second.timestamp >= first.timestamp);
        assert_eq!(shared.stats.snapshot().audio_blocks_captured, 2);
        assert_eq!(shared.stats.snapshot().audio_blocks_dropped, 0);
    }

    #[test]
    fn dropped_blocks_are_counted() {
        let queue = Arc::new(BlockQueue::new(1));
        let shared = Arc::new(PipelineShared::new(AdaptiveController::default()));
        let push = AudioPush::new(queue, Arc::clone(&shared));

        push.push_samples(&[0]);
        push.push_samples(&[1]);
        assert_eq!(shared.stats.snapshot().audio_blocks_dropped, 1);
    }
}
