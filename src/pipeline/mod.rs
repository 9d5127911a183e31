//! Frame processing pipeline
//!
//! Shared pipeline state, the adaptive backpressure controller, overlay
//! compositing, and the frame writer loop that drains the capture queue into
//! the video sink.

mod control;
mod overlay;
mod writer;

pub use control::{AdaptiveController, PipelineMode};
pub use overlay::{
    CursorProbe, HighlightSettings, InsetFrame, InsetPosition, InsetProvider, InsetSettings,
    OverlayComposer, OverlaySettings,
};
pub use writer::{FrameWriter, SegmentPlan};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::session::SessionStats;
use crate::RecorderError;

/// State shared by every pipeline thread, passed by `Arc` at spawn time.
///
/// Holds the single global stop flag, the adaptive controller, the statistics
/// counters, and the first fatal error any thread observed. Loops never raise
/// across thread boundaries; they record the error here and exit.
pub struct PipelineShared {
    stop: AtomicBool,
    pub controller: AdaptiveController,
    pub stats: SessionStats,
    first_error: Mutex<Option<RecorderError>>,
    scheduler_done: AtomicBool,
    writer_done: AtomicBool,
}

impl PipelineShared {
    pub fn new(controller: AdaptiveController) -> Self {
        Self {
            stop: AtomicBool::new(false),
            controller,
            stats: SessionStats::default(),
            first_error: Mutex::new(None),
            scheduler_done: AtomicBool::new(false),
            writer_done: AtomicBool::new(false),
        }
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Record a pipeline-fatal error; only the first one is kept.
    pub fn record_fatal(&self, err: RecorderError) {
        let mut slot = self.first_error.lock().expect("error slot poisoned");
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    pub fn take_fatal(&self) -> Option<RecorderError> {
        self.first_error.lock().expect("error slot poisoned").take()
    }

    pub fn has_fatal(&self) -> bool {
        self.first_error
            .lock()
            .expect("error slot poisoned")
            .is_some()
    }

    pub(crate) fn mark_scheduler_done(&self) {
        self.scheduler_done.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mark_writer_done(&self) {
        self.writer_done.store(true, Ordering::SeqCst);
    }

    pub fn scheduler_exited(&self) -> bool {
        self.scheduler_done.load(Ordering::SeqCst)
    }

    pub fn writer_exited(&self) -> bool {
        self.writer_done.load(Ordering::SeqCst)
    }
}

/// Join a worker thread, abandoning it after `timeout`.
///
/// A thread that does not join in time is left to die with the process; the
/// session must still finalize, so indefinite waits are not an option.
pub(crate) fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration, name: &str) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!("{} thread did not stop within {:?}; abandoning", name, timeout);
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    if handle.join().is_err() {
        tracing::error!("{} thread panicked", name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fatal_error_wins() {
        let shared = PipelineShared::new(AdaptiveController::default());
        shared.record_fatal(RecorderError::Capture("first".to_string()));
        shared.record_fatal(RecorderError::Capture("second".to_string()));

        match shared.take_fatal() {
            Some(RecorderError::Capture(msg)) => assert_eq!(msg, "first"),
            other => panic!("unexpected error slot: {:?}", other),
        }
        assert!(!shared.has_fatal());
    }

    #[test]
    fn join_with_timeout_reaps_finished_thread() {
        let handle = std::thread::spawn(|| {});
        join_with_timeout(handle, Duration::from_secs(1), "noop");
    }

    #[test]
    fn join_with_timeout_abandons_stuck_thread() {
        let handle = std::thread::spawn(|| {
            std::thread::sleep(Duration::from_secs(5));
        });
        let started = Instant::now();
        join_with_timeout(handle, Duration::from_millis(50), "stuck");
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
