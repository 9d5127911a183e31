//! Frame writer loop
//!
//! Drains the capture queue on its own thread and feeds the video sink. The
//! writer is where queue occupancy is sampled into the adaptive controller:
//! in normal mode every frame gets its overlays composited and written
//! immediately, in degraded mode overlays are skipped and writes are batched.
//! Segment rollover happens here too, before the controller sees the frame,
//! so a mode transition can never straddle two segment files.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::capture::{FrameBufferPool, FrameQueue, Geometry, QueueItem, TimestampedFrame};
use crate::video::{VideoSink, VideoSinkFactory};
use crate::{Result, StatusSink};

use super::overlay::OverlayComposer;
use super::{PipelineMode, PipelineShared};

/// How long one pop waits before the loop re-checks the stop flag.
const POP_TIMEOUT: Duration = Duration::from_millis(500);

/// Largest number of frames held back in a degraded-mode batch.
const MAX_BATCH: usize = 5;

/// Where the video bytes go: one file, or a series of segment files rolled
/// over on a duration threshold. Clones share the recorded path list, so the
/// session still sees every segment after the plan moves into the writer.
#[derive(Clone)]
pub struct SegmentPlan {
    base: PathBuf,
    threshold: Option<Duration>,
    recorded: Arc<Mutex<Vec<PathBuf>>>,
}

impl SegmentPlan {
    /// Everything goes into `path`, no rollover.
    pub fn single(path: PathBuf) -> Self {
        Self {
            base: path,
            threshold: None,
            recorded: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Roll to a new file every `threshold` of recorded time.
    pub fn segmented(base: PathBuf, threshold: Duration) -> Self {
        Self {
            base,
            threshold: Some(threshold),
            recorded: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn threshold(&self) -> Option<Duration> {
        self.threshold
    }

    /// Paths of every segment opened so far, in order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.recorded.lock().expect("segment list poisoned").clone()
    }

    fn path_for(&self, index: usize) -> PathBuf {
        if self.threshold.is_none() {
            return self.base.clone();
        }
        let stem = self
            .base
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("video");
        let ext = self
            .base
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("raw");
        self.base
            .with_file_name(format!("{}_segment_{:03}.{}", stem, index, ext))
    }

    fn record(&self, path: PathBuf) {
        self.recorded
            .lock()
            .expect("segment list poisoned")
            .push(path);
    }
}

pub struct FrameWriter {
    queue: Arc<FrameQueue>,
    pool: Arc<FrameBufferPool>,
    shared: Arc<PipelineShared>,
    status: StatusSink,
    factory: Box<dyn VideoSinkFactory>,
    plan: SegmentPlan,
    composer: OverlayComposer,
    geometry: Geometry,
    fps: u32,
}

impl FrameWriter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<FrameQueue>,
        pool: Arc<FrameBufferPool>,
        shared: Arc<PipelineShared>,
        status: StatusSink,
        factory: Box<dyn VideoSinkFactory>,
        plan: SegmentPlan,
        composer: OverlayComposer,
        geometry: Geometry,
        fps: u32,
    ) -> Self {
        Self {
            queue,
            pool,
            shared,
            status,
            factory,
            plan,
            composer,
            geometry,
            fps,
        }
    }

    /// Spawn the writer thread.
    pub fn spawn(self) -> JoinHandle<()> {
        thread::Builder::new()
            .name("writer".to_string())
            .spawn(move || self.run())
            .expect("failed to spawn writer thread")
    }

    fn run(mut self) {
        // Failing to open the very first sink leaves nowhere to put frames.
        let mut sink = match self.open_segment(0) {
            Ok(sink) => sink,
            Err(err) => {
                self.shared.record_fatal(err);
                self.shared.mark_writer_done();
                return;
            }
        };

        let mut segment_index = 0usize;
        let mut segment_started: Option<f64> = None;
        let mut batch: Vec<TimestampedFrame> = Vec::with_capacity(MAX_BATCH);

        loop {
            match self.queue.pop_timeout(POP_TIMEOUT) {
                None => {
                    self.flush(&mut sink, &mut batch);
                    // An empty queue after stop means the sentinel was never
                    // pushed; do not wait for it forever.
                    if self.shared.stop_requested() {
                        break;
                    }
                }
                Some(QueueItem::Shutdown) => break,
                Some(QueueItem::Frame(mut frame)) => {
                    // Rollover first so the mode decision below applies to
                    // the segment the frame actually lands in.
                    if let Some(threshold) = self.plan.threshold() {
                        let started = *segment_started.get_or_insert(frame.timestamp);
                        if frame.timestamp - started >= threshold.as_secs_f64() {
                            self.flush(&mut sink, &mut batch);
                            if let Err(err) = sink.finish() {
                                tracing::warn!("segment close failed: {}", err);
                            }
                            segment_index += 1;
                            sink = match self.open_segment(segment_index) {
                                Ok(next) => next,
                                Err(err) => {
                                    self.pool.release(frame.pixels);
                                    self.shared.record_fatal(err);
                                    break;
                                }
                            };
                            segment_started = Some(frame.timestamp);
                            self.status
                                .emit(&format!("Started segment {}", segment_index + 1));
                        }
                    }

                    let (len, capacity) = self.queue.occupancy();
                    if let Some(mode) = self.shared.controller.observe_occupancy(len, capacity) {
                        match mode {
                            PipelineMode::Degraded => {
                                self.status
                                    .emit("Falling behind: skipping overlays to catch up");
                            }
                            PipelineMode::Normal => {
                                self.flush(&mut sink, &mut batch);
                                self.status.emit("Caught up: overlays restored");
                            }
                        }
                    }

                    if self.shared.controller.is_degraded() {
                        batch.push(frame);
                        if batch.len() >= MAX_BATCH {
                            self.flush(&mut sink, &mut batch);
                        }
                    } else {
                        self.composer.compose(&mut frame.pixels);
                        self.write_one(sink.as_mut(), frame);
                    }
                }
            }
        }

        self.flush(&mut sink, &mut batch);
        if let Err(err) = sink.finish() {
            tracing::warn!("video sink close failed: {}", err);
        }
        self.shared.mark_writer_done();
    }

    fn open_segment(&self, index: usize) -> Result<Box<dyn VideoSink>> {
        let path = self.plan.path_for(index);
        let sink = self.factory.open(&path, self.geometry, self.fps)?;
        self.plan.record(path);
        Ok(sink)
    }

    /// Write out any batched frames, oldest first, without overlays.
    fn flush(&self, sink: &mut Box<dyn VideoSink>, batch: &mut Vec<TimestampedFrame>) {
        for frame in batch.drain(..) {
            match sink.write_frame(&frame) {
                Ok(()) => self.shared.stats.note_frame_written(),
                Err(err) => {
                    self.shared.stats.note_frame_write_failure();
                    tracing::warn!("frame {} write failed: {}", frame.sequence, err);
                }
            }
            self.pool.release(frame.pixels);
        }
    }

    fn write_one(&self, sink: &mut dyn VideoSink, frame: TimestampedFrame) {
        match sink.write_frame(&frame) {
            Ok(()) => self.shared.stats.note_frame_written(),
            Err(err) => {
                self.shared.stats.note_frame_write_failure();
                tracing::warn!("frame {} write failed: {}", frame.sequence, err);
            }
        }
        self.pool.release(frame.pixels);
    }
}
