//! Adaptive backpressure controller
//!
//! A two-state machine shared by the scheduler and the writer. Transitions
//! require a sustained signal in either direction so transient spikes under
//! jitter do not flap the pipeline between modes.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Pipeline processing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Full per-frame processing: overlays composited, frame-by-frame writes.
    Normal,
    /// Overlays skipped and writes batched to regain throughput.
    Degraded,
}

pub struct AdaptiveController {
    degraded: AtomicBool,
    above_streak: AtomicU32,
    below_streak: AtomicU32,
    /// Queue occupancy percentage considered "behind".
    high_water_pct: u32,
    /// Consecutive observations required to change state.
    threshold: u32,
}

impl AdaptiveController {
    pub const DEFAULT_HIGH_WATER_PCT: u32 = 75;
    pub const DEFAULT_THRESHOLD: u32 = 3;

    pub fn new(high_water_pct: u32, threshold: u32) -> Self {
        Self {
            degraded: AtomicBool::new(false),
            above_streak: AtomicU32::new(0),
            below_streak: AtomicU32::new(0),
            high_water_pct,
            threshold: threshold.max(1),
        }
    }

    pub fn mode(&self) -> PipelineMode {
        if self.degraded.load(Ordering::Relaxed) {
            PipelineMode::Degraded
        } else {
            PipelineMode::Normal
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Feed one queue occupancy sample. Returns the new mode when this
    /// observation caused a transition.
    pub fn observe_occupancy(&self, len: usize, capacity: usize) -> Option<PipelineMode> {
        if capacity == 0 {
            return None;
        }
        let behind = len as u64 * 100 >= capacity as u64 * self.high_water_pct as u64;
        if behind {
            self.note_pressure()
        } else {
            self.note_clear()
        }
    }

    /// A burst of queue drops counts as a pressure observation even when the
    /// writer has not sampled occupancy recently.
    pub fn note_drop_burst(&self) -> Option<PipelineMode> {
        self.note_pressure()
    }

    fn note_pressure(&self) -> Option<PipelineMode> {
        self.below_streak.store(0, Ordering::Relaxed);
        let streak = self.above_streak.fetch_add(1, Ordering::Relaxed) + 1;
        if streak >= self.threshold && !self.degraded.swap(true, Ordering::Relaxed) {
            return Some(PipelineMode::Degraded);
        }
        None
    }

    fn note_clear(&self) -> Option<PipelineMode> {
        self.above_streak.store(0, Ordering::Relaxed);
        let streak = self.below_streak.fetch_add(1, Ordering::Relaxed) + 1;
        if streak >= self.threshold && self.degraded.swap(false, Ordering::Relaxed) {
            return Some(PipelineMode::Normal);
        }
        None
    }
}

impl Default for AdaptiveController {
    fn default() -> Self {
        Self::new(Self::DEFAULT_HIGH_WATER_PCT, Self::DEFAULT_THRESHOLD)
    }
}
