//! Fixed-cadence capture loop
//!
//! Runs on its own thread. For target frame interval `T` it aims at the
//! instants `t0 + k*T`, grabbing one frame per target. Sleeps are short and
//! capped because platform sleep granularity is coarser than the timing the
//! cadence needs; inside the slack window the grab proceeds immediately.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::pipeline::PipelineShared;
use crate::StatusSink;

use super::frame::{FrameBufferPool, TimestampedFrame};
use super::queue::FrameQueue;
use super::FrameSource;

/// How early a grab may fire relative to its target instant.
const TIMING_SLACK: Duration = Duration::from_micros(500);

/// Longest single nap while waiting for the next target instant.
const MAX_NAP: Duration = Duration::from_millis(1);

/// Every this many drops the adaptive controller is poked.
const DROP_NOTIFY_INTERVAL: u64 = 5;

pub struct CaptureScheduler {
    source: Box<dyn FrameSource>,
    queue: Arc<FrameQueue>,
    pool: Arc<FrameBufferPool>,
    shared: Arc<PipelineShared>,
    status: StatusSink,
    interval: Duration,
    anchor_interval: u64,
    started_at: Instant,
}

impl CaptureScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Box<dyn FrameSource>,
        queue: Arc<FrameQueue>,
        pool: Arc<FrameBufferPool>,
        shared: Arc<PipelineShared>,
        status: StatusSink,
        fps: u32,
        anchor_interval: u64,
        started_at: Instant,
    ) -> Self {
        Self {
            source,
            queue,
            pool,
            shared,
            status,
            interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            anchor_interval: anchor_interval.max(1),
            started_at,
        }
    }

    /// Spawn the capture thread.
    pub fn spawn(self) -> JoinHandle<()> {
        thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || self.run())
            .expect("failed to spawn capture thread")
    }

    fn run(mut self) {
        crate::platform::request_high_priority(&self.status);

        let mut sequence: u64 = 0;
        let mut next_target = self.started_at;
        let mut last_notified_drop = 0;

        while !self.shared.stop_requested() {
            let now = Instant::now();
            if now + TIMING_SLACK < next_target {
                let remaining = next_target - now;
                thread::sleep(remaining.min(MAX_NAP));
                continue;
            }

            let mut buffer = self.pool.acquire();
            if let Err(err) = self.source.grab(&mut buffer) {
                // A capture failure is fatal to the scheduler, not the
                // process; the monitor notices the exit and stops the session.
                self.pool.release(buffer);
                self.status.emit(&format!("Capture failed: {}", err));
                self.shared.record_fatal(err);
                break;
            }

            let frame = TimestampedFrame {
                pixels: buffer,
                timestamp: self.started_at.elapsed().as_secs_f64(),
                sequence,
                anchor: sequence % self.anchor_interval == 0,
            };
            sequence += 1;
            self.shared.stats.note_frame_produced();

            if let Some(evicted) = self.queue.push(frame) {
                self.pool.release(evicted.pixels);
                self.shared.stats.note_frame_dropped();

                let dropped = self.queue.dropped();
                if dropped >= last_notified_drop + DROP_NOTIFY_INTERVAL {
                    last_notified_drop = dropped;
                    if self.shared.controller.note_drop_burst().is_some() {
                        self.status
                            .emit(&format!("Falling behind: {} frames dropped", dropped));
                    }
                }
            }

            next_target += self.interval;
        }

        self.source.close();
        self.shared.mark_scheduler_done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{PatternSource, QueueItem};
    use crate::pipeline::AdaptiveController;

    fn pipeline_parts(
        queue_capacity: usize,
        pool_size: usize,
        frame_len: usize,
    ) -> (Arc<FrameQueue>, Arc<FrameBufferPool>, Arc<PipelineShared>) {
        (
            Arc::new(FrameQueue::new(queue_capacity)),
            Arc::new(FrameBufferPool::new(pool_size, frame_len)),
            Arc::new(PipelineShared::new(AdaptiveController::default())),
        )
    }

    #[test]
    fn produces_timestamped_frames_in_sequence() {
        let mut source = PatternSource::new(8, 8);
        let geometry = source.open().unwrap();
        let (queue, pool, shared) = pipeline_parts(64, 4, geometry.frame_len());

        let scheduler = CaptureScheduler::new(
            Box::new(source),
            Arc::clone(&queue),
            Arc::clone(&pool),
            Arc::clone(&shared),
            StatusSink::default(),
            200,
            4,
            Instant::now(),
        );
        let handle = scheduler.spawn();

        std::thread::sleep(Duration::from_millis(100));
        shared.request_stop();
        handle.join().unwrap();

        let mut last_seq = None;
        let mut last_ts = -1.0;
        while let Some(QueueItem::Frame(frame)) = queue.pop_timeout(Duration::ZERO) {
            if let Some(prev) = last_seq {
                assert_eq!(frame.sequence, prev + 1);
            }
            assert!(frame.timestamp >= last_ts);
            assert_eq!(frame.anchor, frame.sequence % 4 == 0);
            last_ts = frame.timestamp;
            last_seq = Some(frame.sequence);
        }
        assert!(last_seq.is_some(), "scheduler should have produced frames");
        assert!(shared.scheduler_exited());
    }

    #[test]
    fn capture_failure_is_fatal_and_recorded() {
        let mut source = PatternSource::new(8, 8).with_failure_after(3);
        let geometry = source.open().unwrap();
        let (queue, pool, shared) = pipeline_parts(64, 4, geometry.frame_len());

        let scheduler = CaptureScheduler::new(
            Box::new(source),
            queue,
            pool,
            Arc::clone(&shared),
            StatusSink::default(),
            1000,
            4,
            Instant::now(),
        );
        scheduler.spawn().join().unwrap();

        assert!(shared.has_fatal());
        assert!(shared.scheduler_exited());
        assert_eq!(shared.stats.snapshot().frames_produced, 3);
    }
}
