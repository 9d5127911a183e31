//! WAV sink for the audio write loop

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use hound::{WavSpec, WavWriter};

use crate::{RecorderError, Result};

use super::PcmBlock;

/// Destination for PCM blocks. Runs on the audio writer thread.
pub trait PcmSink: Send {
    fn write_block(&mut self, block: &PcmBlock) -> Result<()>;

    /// Flush and close. Called once, after the queue is drained.
    fn finalize(&mut self) -> Result<()>;
}

/// 16-bit PCM WAV file sink.
pub struct WavSink {
    // Held in an Option so finalize can consume the writer in place.
    writer: Option<WavWriter<BufWriter<File>>>,
}

impl WavSink {
    pub fn create(path: &Path, sample_rate: u32, channels: u16) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = WavWriter::create(path, spec).map_err(|e| {
            RecorderError::Audio(format!("cannot create {}: {}", path.display(), e))
        })?;
        Ok(Self {
            writer: Some(writer),
        })
    }
}

impl PcmSink for WavSink {
    fn write_block(&mut self, block: &PcmBlock) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| RecorderError::Audio("write after finalize".to_string()))?;
        for &sample in &block.samples {
            writer
                .write_sample(sample)
                .map_err(|e| RecorderError::Audio(format!("sample write failed: {}", e)))?;
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| RecorderError::Audio(format!("WAV finalize failed: {}", e)))?;
        }
        Ok(())
    }
}
