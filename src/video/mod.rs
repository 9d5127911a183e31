//! Video sinks
//!
//! The writer thread hands finished frames to a [`VideoSink`]. Sinks are
//! opened through a [`VideoSinkFactory`] so the pipeline can close one
//! segment file and open the next without knowing the sink type.
//!
//! The bundled [`RawFileSink`] writes a raw BGR24 elementary stream; the
//! reconciler re-encodes it with FFmpeg afterwards. Raw streams of identical
//! geometry concatenate losslessly by byte append, which is what makes
//! segment rollover cheap.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::capture::{Geometry, TimestampedFrame};
use crate::{RecorderError, Result};

pub trait VideoSink: Send {
    /// Write one frame. A failure here is per-frame, not fatal; the caller
    /// decides whether to keep going.
    fn write_frame(&mut self, frame: &TimestampedFrame) -> Result<()>;

    /// Flush and close the sink. Must be called before the file is handed to
    /// the reconciler.
    fn finish(&mut self) -> Result<()>;
}

/// Opens sinks on demand, once per segment.
pub trait VideoSinkFactory: Send {
    fn open(&self, path: &Path, geometry: Geometry, fps: u32) -> Result<Box<dyn VideoSink>>;
}

pub struct RawFileSink {
    writer: Option<BufWriter<File>>,
    frame_len: usize,
}

impl RawFileSink {
    pub fn create(path: &Path, geometry: Geometry) -> Result<Self> {
        let file = File::create(path).map_err(|e| {
            RecorderError::VideoSink(format!("cannot create {}: {}", path.display(), e))
        })?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
            frame_len: geometry.frame_len(),
        })
    }
}

impl VideoSink for RawFileSink {
    fn write_frame(&mut self, frame: &TimestampedFrame) -> Result<()> {
        if frame.pixels.len() != self.frame_len {
            return Err(RecorderError::VideoSink(format!(
                "frame length {} does not match sink geometry ({} bytes)",
                frame.pixels.len(),
                self.frame_len
            )));
        }
        match self.writer.as_mut() {
            Some(writer) => {
                writer.write_all(&frame.pixels)?;
                Ok(())
            }
            None => Err(RecorderError::VideoSink(
                "write after finish".to_string(),
            )),
        }
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Factory for [`RawFileSink`], the default on every platform.
pub struct RawSinkFactory;

impl VideoSinkFactory for RawSinkFactory {
    fn open(&self, path: &Path, geometry: Geometry, _fps: u32) -> Result<Box<dyn VideoSink>> {
        Ok(Box::new(RawFileSink::create(path, geometry)?))
    }
}
