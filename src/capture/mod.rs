//! Screen capture pipeline
//!
//! Frame acquisition is abstracted behind the [`FrameSource`] trait so the
//! platform grabber (or a synthetic source in tests) plugs in from outside.
//! The scheduler drives the source at a fixed cadence and feeds the bounded
//! [`FrameQueue`], which applies the anchor-aware overflow policy.

mod frame;
mod queue;
mod scheduler;

pub use frame::{FrameBufferPool, TimestampedFrame};
pub use queue::{FrameQueue, QueueItem};
pub use scheduler::CaptureScheduler;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Bytes per pixel for the BGR24 frames flowing through the pipeline.
pub const BYTES_PER_PIXEL: usize = 3;

/// Pixel dimensions of a capture target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Byte length of one BGR24 frame at this geometry.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

/// A source of screen pixels.
///
/// `grab` must be callable repeatedly from one dedicated thread with bounded
/// latency; it fills the provided buffer with one BGR24 frame.
pub trait FrameSource: Send {
    /// Open the capture target and report its geometry.
    fn open(&mut self) -> Result<Geometry>;

    /// Fill `buffer` with the current frame. `buffer` is exactly
    /// `geometry.frame_len()` bytes.
    fn grab(&mut self, buffer: &mut [u8]) -> Result<()>;

    /// Release platform resources.
    fn close(&mut self);
}

/// Deterministic synthetic frame source for demos and tests.
///
/// Each grabbed frame carries its grab counter in the first eight bytes
/// (little endian) followed by a moving gradient, so consumers can verify
/// ordering without a real screen.
pub struct PatternSource {
    geometry: Geometry,
    tick: u64,
    grab_delay: std::time::Duration,
    fail_after: Option<u64>,
}

impl PatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            geometry: Geometry::new(width, height),
            tick: 0,
            grab_delay: std::time::Duration::ZERO,
            fail_after: None,
        }
    }

    /// Simulate a slow grabber. Useful for exercising queue pressure.
    pub fn with_grab_delay(mut self, delay: std::time::Duration) -> Self {
        self.grab_delay = delay;
        self
    }

    /// Fail every grab after the given number of successful ones.
    pub fn with_failure_after(mut self, grabs: u64) -> Self {
        self.fail_after = Some(grabs);
        self
    }

    /// Read back the grab counter a grabbed frame was stamped with.
    pub fn decode_tick(pixels: &[u8]) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&pixels[..8]);
        u64::from_le_bytes(bytes)
    }
}

impl FrameSource for PatternSource {
    fn open(&mut self) -> Result<Geometry> {
        Ok(self.geometry)
    }

    fn grab(&mut self, buffer: &mut [u8]) -> Result<()> {
        if let Some(limit) = self.fail_after {
            if self.tick >= limit {
                return Err(crate::RecorderError::Capture(
                    "synthetic capture failure".to_string(),
                ));
            }
        }

        if !self.grab_delay.is_zero() {
            std::thread::sleep(self.grab_delay);
        }

        let shift = (self.tick % 256) as u8;
        for (i, px) in buffer.iter_mut().enumerate() {
            *px = ((i % 256) as u8).wrapping_add(shift);
        }
        buffer[..8].copy_from_slice(&self.tick.to_le_bytes());

        self.tick += 1;
        Ok(())
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_frame_len_is_bgr24() {
        let geo = Geometry::new(640, 480);
        assert_eq!(geo.frame_len(), 640 * 480 * 3);
    }

    #[test]
    fn pattern_source_stamps_ticks() {
        let mut source = PatternSource::new(16, 16);
        let geo = source.open().unwrap();
        let mut buffer = vec![0u8; geo.frame_len()];

        source.grab(&mut buffer).unwrap();
        assert_eq!(PatternSource::decode_tick(&buffer), 0);
        source.grab(&mut buffer).unwrap();
        assert_eq!(PatternSource::decode_tick(&buffer), 1);
    }

    #[test]
    fn pattern_source_fails_on_schedule() {
        let mut source = PatternSource::new(8, 8).with_failure_after(1);
        let geo = source.open().unwrap();
        let mut buffer = vec![0u8; geo.frame_len()];

        assert!(source.grab(&mut buffer).is_ok());
        assert!(source.grab(&mut buffer).is_err());
    }
}
