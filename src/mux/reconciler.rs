//! Stream reconciliation
//!
//! Turns the raw artifacts a session leaves behind (raw BGR24 video, WAV
//! audio, possibly a series of video segments) into the final H.264/AAC
//! file. Everything in here is best effort from the session's point of
//! view: a reconciliation failure is reported, never raised into the
//! pipeline, and the raw artifacts are preserved for a manual merge.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::Geometry;
use crate::{RecorderError, Result, StatusSink};

use super::ffmpeg::{probe_ffmpeg, run_with_timeout, FfmpegTool};

/// Bound on one FFmpeg merge run.
const MUX_TIMEOUT: Duration = Duration::from_secs(300);

/// Inputs smaller than this are assumed corrupt and refused.
const MIN_ARTIFACT_BYTES: u64 = 1024;

/// Encoding quality tier, mapped onto an x264 preset/CRF pair.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    #[default]
    High,
    Ultra,
}

impl QualityTier {
    pub fn preset_crf(self) -> (&'static str, &'static str) {
        match self {
            QualityTier::Low => ("ultrafast", "28"),
            QualityTier::Medium => ("fast", "25"),
            QualityTier::High => ("medium", "23"),
            QualityTier::Ultra => ("slow", "20"),
        }
    }
}

pub struct Reconciler {
    tool: Option<FfmpegTool>,
    quality: QualityTier,
    fps: u32,
    geometry: Geometry,
    status: StatusSink,
}

impl Reconciler {
    pub fn new(
        tool: Option<FfmpegTool>,
        quality: QualityTier,
        fps: u32,
        geometry: Geometry,
        status: StatusSink,
    ) -> Self {
        Self {
            tool,
            quality,
            fps,
            geometry,
            status,
        }
    }

    /// Merge raw video and WAV audio into `output`.
    pub fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        let video_size = check_artifact(video)?;
        let audio_size = check_artifact(audio)?;
        self.status.emit(&format!(
            "Merging: video {}KB + audio {}KB",
            video_size / 1024,
            audio_size / 1024
        ));
        self.run_ffmpeg(build_mux_args(
            self.geometry,
            self.fps,
            self.quality,
            video,
            Some(audio),
            output,
        ))?;
        self.verify_output(output)
    }

    /// Encode raw video alone, no audio track.
    pub fn encode_video_only(&self, video: &Path, output: &Path) -> Result<()> {
        let video_size = check_artifact(video)?;
        self.status
            .emit(&format!("Encoding video ({}KB), no audio", video_size / 1024));
        self.run_ffmpeg(build_mux_args(
            self.geometry,
            self.fps,
            self.quality,
            video,
            None,
            output,
        ))?;
        self.verify_output(output)
    }

    /// Byte-append raw segments of identical geometry into `target`, removing
    /// each segment once its bytes are safely in the combined file.
    pub fn concatenate_segments(&self, segments: &[PathBuf], target: &Path) -> Result<()> {
        if segments.is_empty() {
            return Err(RecorderError::Mux("no segments to concatenate".to_string()));
        }
        let mut combined = File::create(target)?;
        for segment in segments {
            let mut input = File::open(segment)?;
            io::copy(&mut input, &mut combined)?;
        }
        // Segments are deleted below; make sure their bytes hit the disk
        // in the combined file first.
        combined.sync_all()?;
        for segment in segments {
            if let Err(err) = std::fs::remove_file(segment) {
                tracing::warn!("cannot remove segment {}: {}", segment.display(), err);
            }
        }
        self.status
            .emit(&format!("Combined {} segments", segments.len()));
        Ok(())
    }

    fn run_ffmpeg(&self, args: Vec<String>) -> Result<()> {
        let tool = self.tool.as_ref().ok_or_else(|| {
            RecorderError::Mux(
                "FFmpeg not found; set tools.ffmpeg_path in the config or the \
                 FFMPEG_PATH environment variable"
                    .to_string(),
            )
        })?;
        let version = probe_ffmpeg(&tool.path)?;
        tracing::debug!("using {} from {}", version, tool.origin);

        let mut cmd = Command::new(&tool.path);
        cmd.args(&args);
        let output = run_with_timeout(cmd, MUX_TIMEOUT)?;
        if !output.status.success() {
            let detail = output.stderr.trim();
            return Err(RecorderError::Mux(format!(
                "FFmpeg exited with {}: {}",
                output.status,
                if detail.is_empty() {
                    "no diagnostic output"
                } else {
                    detail
                }
            )));
        }
        Ok(())
    }

    fn verify_output(&self, output: &Path) -> Result<()> {
        let size = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(RecorderError::Mux(format!(
                "FFmpeg reported success but {} is missing or empty",
                output.display()
            )));
        }
        self.status
            .emit(&format!("Merge complete: {}KB", size / 1024));
        Ok(())
    }
}

/// Refuse inputs that do not exist or are implausibly small.
fn check_artifact(path: &Path) -> Result<u64> {
    let size = std::fs::metadata(path)
        .map_err(|_| RecorderError::Mux(format!("input not found: {}", path.display())))?
        .len();
    if size < MIN_ARTIFACT_BYTES {
        return Err(RecorderError::Mux(format!(
            "input too small ({} bytes), likely corrupt: {}",
            size,
            path.display()
        )));
    }
    Ok(size)
}

/// Build the FFmpeg argument list for the merge (or video-only encode).
fn build_mux_args(
    geometry: Geometry,
    fps: u32,
    quality: QualityTier,
    video: &Path,
    audio: Option<&Path>,
    output: &Path,
) -> Vec<String> {
    let (preset, crf) = quality.preset_crf();
    let mut args: Vec<String> = vec![
        "-y".into(),
        // The video input is a raw BGR24 elementary stream; FFmpeg needs
        // its geometry and rate spelled out.
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "bgr24".into(),
        "-video_size".into(),
        format!("{}x{}", geometry.width, geometry.height),
        "-framerate".into(),
        fps.to_string(),
        "-i".into(),
        video.display().to_string(),
    ];
    if let Some(audio) = audio {
        args.push("-i".into());
        args.push(audio.display().to_string());
    }
    args.extend([
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        preset.into(),
        "-crf".into(),
        crf.into(),
    ]);
    if audio.is_some() {
        args.extend([
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "128k".into(),
            "-ar".into(),
            "44100".into(),
            "-ac".into(),
            "2".into(),
        ]);
    }
    args.extend(["-vsync".into(), "cfr".into()]);
    if audio.is_some() {
        // Audio sync compensation and truncation to the shorter stream.
        args.extend(["-async".into(), "1".into()]);
    }
    args.extend(["-movflags".into(), "+faststart".into()]);
    if audio.is_some() {
        args.push("-shortest".into());
    }
    args.push(output.display().to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_tiers_map_to_expected_presets() {
        assert_eq!(QualityTier::Low.preset_crf(), ("ultrafast", "28"));
        assert_eq!(QualityTier::Medium.preset_crf(), ("fast", "25"));
        assert_eq!(QualityTier::High.preset_crf(), ("medium", "23"));
        assert_eq!(QualityTier::Ultra.preset_crf(), ("slow", "20"));
    }

    #[test]
    fn quality_tier_parses_lowercase_names() {
        let tier: QualityTier = serde_json::from_str("\"ultra\"").unwrap();
        assert_eq!(tier, QualityTier::Ultra);
    }

    #[test]
    fn mux_args_describe_the_raw_input_and_both_codecs() {
        let args = build_mux_args(
            Geometry::new(1920, 1080),
            30,
            QualityTier::High,
            Path::new("v.raw"),
            Some(Path::new("a.wav")),
            Path::new("out.mp4"),
        );
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pix_fmt bgr24 -video_size 1920x1080 -framerate 30"));
        assert!(joined.contains("-c:v libx264 -preset medium -crf 23"));
        assert!(joined.contains("-c:a aac -b:a 128k -ar 44100 -ac 2"));
        assert!(joined.contains("-vsync cfr -async 1"));
        assert!(joined.contains("-movflags +faststart -shortest out.mp4"));
    }

    #[test]
    fn video_only_args_carry_no_audio_flags() {
        let args = build_mux_args(
            Geometry::new(640, 480),
            24,
            QualityTier::Low,
            Path::new("v.raw"),
            None,
            Path::new("out.mp4"),
        );
        let joined = args.join(" ");
        assert!(!joined.contains("aac"));
        assert!(!joined.contains("-shortest"));
        assert!(!joined.contains("-async"));
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 1);
    }

    #[test]
    fn artifact_check_rejects_missing_and_tiny_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_artifact(&dir.path().join("missing.raw")).is_err());

        let tiny = dir.path().join("tiny.raw");
        std::fs::write(&tiny, vec![0u8; 16]).unwrap();
        assert!(check_artifact(&tiny).is_err());

        let plausible = dir.path().join("ok.raw");
        std::fs::write(&plausible, vec![0u8; 4096]).unwrap();
        assert_eq!(check_artifact(&plausible).unwrap(), 4096);
    }

    #[test]
    fn segments_concatenate_in_order_and_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("s0.raw");
        let b = dir.path().join("s1.raw");
        std::fs::write(&a, vec![1u8; 100]).unwrap();
        std::fs::write(&b, vec![2u8; 50]).unwrap();

        let reconciler = Reconciler::new(
            None,
            QualityTier::High,
            30,
            Geometry::new(8, 8),
            StatusSink::default(),
        );
        let target = dir.path().join("combined.raw");
        reconciler
            .concatenate_segments(&[a.clone(), b.clone()], &target)
            .unwrap();

        let combined = std::fs::read(&target).unwrap();
        assert_eq!(combined.len(), 150);
        assert!(combined[..100].iter().all(|&x| x == 1));
        assert!(combined[100..].iter().all(|&x| x == 2));
        assert!(!a.exists(), "segments must be removed after concatenation");
        assert!(!b.exists());
    }

    #[test]
    fn mux_without_a_tool_fails_before_touching_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("v.raw");
        let audio = dir.path().join("a.wav");
        std::fs::write(&video, vec![0u8; 4096]).unwrap();
        std::fs::write(&audio, vec![0u8; 4096]).unwrap();

        let reconciler = Reconciler::new(
            None,
            QualityTier::High,
            30,
            Geometry::new(8, 8),
            StatusSink::default(),
        );
        match reconciler.mux(&video, &audio, &dir.path().join("out.mp4")) {
            Err(RecorderError::Mux(msg)) => assert!(msg.contains("FFmpeg not found")),
            other => panic!("expected mux error, got {:?}", other),
        }
    }
}
