//! Session statistics
//!
//! Counters are bumped from multiple threads and read by the monitor; they
//! are plain relaxed atomics because approximate reporting is fine.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct SessionStats {
    frames_produced: AtomicU64,
    frames_dropped: AtomicU64,
    frames_written: AtomicU64,
    frame_write_failures: AtomicU64,
    audio_blocks_captured: AtomicU64,
    audio_blocks_dropped: AtomicU64,
    audio_blocks_written: AtomicU64,
}

impl SessionStats {
    pub fn note_frame_produced(&self) {
        self.frames_produced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_frame_written(&self) {
        self.frames_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_frame_write_failure(&self) {
        self.frame_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_audio_block_captured(&self) {
        self.audio_blocks_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_audio_block_dropped(&self) {
        self.audio_blocks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_audio_block_written(&self) {
        self.audio_blocks_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_produced: self.frames_produced.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_written: self.frames_written.load(Ordering::Relaxed),
            frame_write_failures: self.frame_write_failures.load(Ordering::Relaxed),
            audio_blocks_captured: self.audio_blocks_captured.load(Ordering::Relaxed),
            audio_blocks_dropped: self.audio_blocks_dropped.load(Ordering::Relaxed),
            audio_blocks_written: self.audio_blocks_written.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsSnapshot {
    pub frames_produced: u64,
    pub frames_dropped: u64,
    pub frames_written: u64,
    pub frame_write_failures: u64,
    pub audio_blocks_captured: u64,
    pub audio_blocks_dropped: u64,
    pub audio_blocks_written: u64,
}

impl StatsSnapshot {
    /// Average frame rate achieved over `elapsed` seconds.
    pub fn effective_fps(&self, elapsed_secs: f64) -> f64 {
        if elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.frames_produced as f64 / elapsed_secs
    }

    /// Share of produced frames that made it into the sink, in percent.
    pub fn efficiency_pct(&self) -> f64 {
        if self.frames_produced == 0 {
            return 100.0;
        }
        (self.frames_produced - self.frames_dropped) as f64 * 100.0
            / self.frames_produced as f64
    }

    /// One-line status summary for the monitor.
    pub fn summary_line(&self, elapsed_secs: f64) -> String {
        format!(
            "{:.1} fps | frames: {} | dropped: {} | written: {} | audio blocks: {}",
            self.effective_fps(elapsed_secs),
            self.frames_produced,
            self.frames_dropped,
            self.frames_written,
            self.audio_blocks_written,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accounting_identity_holds() {
        let stats = SessionStats::default();
        for _ in 0..10 {
            stats.note_frame_produced();
        }
        for _ in 0..3 {
            stats.note_frame_dropped();
        }
        for _ in 0..7 {
            stats.note_frame_written();
        }

        let snap = stats.snapshot();
        assert_eq!(
            snap.frames_produced - snap.frames_dropped,
            snap.frames_written
        );
        assert_eq!(snap.efficiency_pct(), 70.0);
    }

    #[test]
    fn effective_fps_guards_zero_elapsed() {
        let stats = SessionStats::default();
        stats.note_frame_produced();
        assert_eq!(stats.snapshot().effective_fps(0.0), 0.0);
    }
}
