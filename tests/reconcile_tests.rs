use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use screenrec::audio::{AudioFormat, AudioPush, AudioSource};
use screenrec::capture::PatternSource;
use screenrec::mux::{find_ffmpeg, QualityTier};
use screenrec::pipeline::OverlaySettings;
use screenrec::session::{RecordingSession, SessionConfig, SessionOutcome};
use screenrec::video::RawSinkFactory;
use screenrec::StatusSink;

fn session_config(output: PathBuf) -> SessionConfig {
    SessionConfig {
        output,
        fps: 60,
        quality: QualityTier::Low,
        queue_capacity: 128,
        pool_size: 8,
        anchor_interval: 60,
        use_segments: false,
        segment_duration: Duration::from_secs(60),
        overlay: OverlaySettings::default(),
        audio_enabled: false,
        audio_sample_rate: 44100,
        audio_channels: 2,
        audio_device: String::new(),
        audio_loopback: false,
        save_audio_separately: false,
        audio_queue_capacity: 64,
        ffmpeg_path: None,
    }
}

/// End-to-end raw recording. With FFmpeg on the machine the merge succeeds
/// and temporaries are cleaned up; without it the raw artifact survives.
#[test]
fn raw_recording_reconciles_or_preserves_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("capture.mp4");

    let mut session = RecordingSession::new(
        session_config(output.clone()),
        Box::new(PatternSource::new(16, 16)),
        Box::new(RawSinkFactory),
        None,
        StatusSink::default(),
    );
    session.start().expect("session should start");
    std::thread::sleep(Duration::from_millis(1500));

    let outcome = session.finalize();
    match outcome {
        SessionOutcome::Success { output: path, stats } => {
            assert!(
                find_ffmpeg(None).is_some(),
                "success is only possible with FFmpeg installed"
            );
            assert_eq!(path, output);
            assert!(path.exists(), "merged output must exist");
            assert!(std::fs::metadata(&path).unwrap().len() > 0);
            assert!(stats.frames_written > 0);

            let leftover_raw: Vec<_> = std::fs::read_dir(dir.path())
                .unwrap()
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().map(|x| x == "raw").unwrap_or(false))
                .collect();
            assert!(
                leftover_raw.is_empty(),
                "temporaries must be removed after a successful merge"
            );
        }
        SessionOutcome::Partial {
            video,
            audio,
            reason,
            stats,
        } => {
            assert!(video.exists(), "raw video must be preserved: {}", reason);
            let frame_len = 16 * 16 * 3;
            let size = std::fs::metadata(&video).unwrap().len();
            assert_eq!(size % frame_len, 0, "raw file must hold whole frames");
            assert_eq!(size / frame_len, stats.frames_written);
            assert!(audio.is_none());
        }
        other => panic!("expected success or partial, got {:?}", other),
    }
}

#[test]
fn segmented_recording_combines_segments_before_reconciling() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("long.mp4");

    let mut config = session_config(output.clone());
    config.use_segments = true;
    config.segment_duration = Duration::from_millis(300);

    let mut session = RecordingSession::new(
        config,
        Box::new(PatternSource::new(16, 16)),
        Box::new(RawSinkFactory),
        None,
        StatusSink::default(),
    );
    session.start().expect("session should start");
    std::thread::sleep(Duration::from_millis(1200));

    match session.finalize() {
        SessionOutcome::Success { output: path, .. } => {
            assert!(path.exists());
        }
        SessionOutcome::Partial { video, stats, .. } => {
            assert!(video.exists(), "combined raw must be preserved");
            let frame_len = 16 * 16 * 3u64;
            let size = std::fs::metadata(&video).unwrap().len();
            assert_eq!(
                size / frame_len,
                stats.frames_written,
                "combined file must hold every written frame"
            );
        }
        other => panic!("expected success or partial, got {:?}", other),
    }

    // Rollover happened at least three times in 1.2s with 300ms segments,
    // and concatenation removes the per-segment files either way.
    let segment_files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains("_segment_"))
        .collect();
    assert!(
        segment_files.is_empty(),
        "segments must be gone after concatenation, found {:?}",
        segment_files
    );
}

/// Pushes a few large PCM blocks from its own thread, standing in for a
/// real capture backend.
struct ScriptedSource {
    done: Arc<AtomicBool>,
}

impl ScriptedSource {
    fn new() -> Self {
        Self {
            done: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl AudioSource for ScriptedSource {
    fn start(&mut self, push: AudioPush) -> screenrec::Result<AudioFormat> {
        let done = Arc::clone(&self.done);
        std::thread::spawn(move || {
            for value in 0..3i16 {
                push.push_samples(&[value; 4096]);
                std::thread::sleep(Duration::from_millis(2));
            }
            done.store(true, Ordering::SeqCst);
        });
        Ok(AudioFormat {
            sample_rate: 8000,
            channels: 1,
        })
    }

    fn stop(&mut self) {
        while !self.done.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

/// A failing merge must leave BOTH raw artifacts on disk, non-empty, and
/// report a partial result. The merge tool is a stub that always exits
/// non-zero, so the outcome is deterministic regardless of the machine.
#[cfg(unix)]
#[test]
fn failed_merge_preserves_raw_video_and_audio() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let stub = dir.path().join("ffmpeg");
    std::fs::write(&stub, "#!/bin/sh\nexit 1\n").unwrap();
    std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

    let output = dir.path().join("capture.mp4");
    let mut config = session_config(output.clone());
    config.audio_enabled = true;
    config.ffmpeg_path = Some(stub);

    let mut session = RecordingSession::new(
        config,
        Box::new(PatternSource::new(16, 16)),
        Box::new(RawSinkFactory),
        Some(Box::new(ScriptedSource::new())),
        StatusSink::default(),
    );
    session.start().expect("session should start");
    std::thread::sleep(Duration::from_millis(600));

    match session.finalize() {
        SessionOutcome::Partial {
            video,
            audio,
            reason,
            ..
        } => {
            assert!(video.exists(), "raw video must survive: {}", reason);
            assert!(std::fs::metadata(&video).unwrap().len() > 0);

            let audio = audio.expect("raw audio must survive a failed merge");
            assert_eq!(audio, output.with_extension("wav"));
            assert!(audio.exists());
            assert!(std::fs::metadata(&audio).unwrap().len() > 0);
        }
        other => panic!("expected partial outcome, got {:?}", other),
    }
}
