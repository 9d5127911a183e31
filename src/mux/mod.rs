//! Post-recording reconciliation via FFmpeg

mod ffmpeg;
mod reconciler;

pub use ffmpeg::{find_ffmpeg, probe_ffmpeg, FfmpegTool};
pub use reconciler::{QualityTier, Reconciler};
