//! CLI command implementations

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::audio::CpalSource;
use crate::capture::PatternSource;
use crate::cli::args::ConfigCommand;
use crate::config::Settings;
use crate::mux::{find_ffmpeg, probe_ffmpeg, QualityTier};
use crate::session::{RecordingSession, SessionConfig, SessionOutcome, SessionState};
use crate::video::RawSinkFactory;
use crate::StatusSink;

/// Geometry of the synthetic demo source.
const DEMO_WIDTH: u32 = 1280;
const DEMO_HEIGHT: u32 = 720;

#[allow(clippy::too_many_arguments)]
pub fn record(
    settings: &Settings,
    output: Option<PathBuf>,
    duration: Option<u64>,
    fps: Option<u32>,
    no_audio: bool,
    quality: Option<QualityTier>,
    demo: bool,
) -> Result<()> {
    let mut settings = settings.clone();
    if let Some(fps) = fps {
        settings.video.fps = fps;
    }
    if let Some(quality) = quality {
        settings.video.quality = quality;
    }
    if no_audio {
        settings.audio.enabled = false;
    }
    settings.validate()?;
    settings.ensure_dirs()?;

    let output = output.unwrap_or_else(|| settings.default_output_path());
    let config = SessionConfig::from_settings(&settings, output);

    if !demo {
        anyhow::bail!(
            "no screen capture backend is built in for this platform yet; \
             run with --demo to record the synthetic test pattern"
        );
    }
    let source = Box::new(PatternSource::new(DEMO_WIDTH, DEMO_HEIGHT));

    let audio_source = settings.audio.enabled.then(|| {
        Box::new(CpalSource::new(
            &settings.audio.device,
            settings.audio.sample_rate,
            settings.audio.channels,
            settings.audio.loopback,
        )) as Box<dyn crate::audio::AudioSource>
    });

    let status = StatusSink::new(|msg| println!("{}", msg));
    let mut session = RecordingSession::new(
        config,
        source,
        Box::new(RawSinkFactory),
        audio_source,
        status,
    );

    session
        .start()
        .map_err(|e| anyhow::anyhow!("could not start recording: {}", e))?;

    match duration {
        Some(seconds) => {
            let deadline = Instant::now() + Duration::from_secs(seconds);
            while Instant::now() < deadline && session.state() == SessionState::Running {
                std::thread::sleep(Duration::from_millis(250));
            }
        }
        None => {
            println!("Recording... press Enter to stop");
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
        }
    }

    match session.finalize() {
        SessionOutcome::Success { output, stats } => {
            println!("Saved {}", output.display());
            println!(
                "{} frames written, {} dropped",
                stats.frames_written, stats.frames_dropped
            );
            Ok(())
        }
        SessionOutcome::Partial {
            video,
            audio,
            reason,
            stats,
        } => {
            println!("Merge failed: {}", reason);
            println!("Raw video kept at {}", video.display());
            if let Some(audio) = audio {
                println!("Raw audio kept at {}", audio.display());
            }
            println!(
                "{} frames written, {} dropped",
                stats.frames_written, stats.frames_dropped
            );
            Ok(())
        }
        SessionOutcome::Failed { reason, .. } => {
            anyhow::bail!("recording failed: {}", reason)
        }
    }
}

#[derive(Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: &'static str,
    detail: String,
}

#[derive(Serialize)]
struct DoctorReport {
    data_dir: PathBuf,
    checks: Vec<DoctorCheck>,
}

/// Run diagnostic checks to help troubleshoot local setup issues.
pub fn run_doctor(settings: &Settings, json: bool) -> Result<()> {
    let report = collect_doctor_report(settings);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("screenrec doctor");
    println!("data dir: {}", report.data_dir.display());
    println!();
    for check in &report.checks {
        println!("{:<12} {:<8} {}", check.name, check.status, check.detail);
    }

    Ok(())
}

fn collect_doctor_report(settings: &Settings) -> DoctorReport {
    let mut checks = Vec::new();

    match find_ffmpeg(settings.tools.ffmpeg_path.as_deref()) {
        Some(tool) => {
            let detail = match probe_ffmpeg(&tool.path) {
                Ok(version) => format!("{} ({}, via {})", version, tool.path.display(), tool.origin),
                Err(err) => format!("found at {} but probe failed: {}", tool.path.display(), err),
            };
            let status = if detail.contains("probe failed") {
                "warn"
            } else {
                "ok"
            };
            checks.push(DoctorCheck {
                name: "ffmpeg",
                status,
                detail,
            });
        }
        None => checks.push(DoctorCheck {
            name: "ffmpeg",
            status: "missing",
            detail: "not found; merged output will be unavailable (raw artifacts are kept)"
                .to_string(),
        }),
    }

    {
        use cpal::traits::{DeviceTrait, HostTrait};
        let host = cpal::default_host();
        match host.default_input_device() {
            Some(device) => checks.push(DoctorCheck {
                name: "audio",
                status: "ok",
                detail: format!(
                    "default input device: {}",
                    device.name().unwrap_or_else(|_| "unknown".to_string())
                ),
            }),
            None => checks.push(DoctorCheck {
                name: "audio",
                status: "warn",
                detail: "no input device; recordings will be video only".to_string(),
            }),
        }
    }

    match settings.ensure_dirs() {
        Ok(()) => checks.push(DoctorCheck {
            name: "directories",
            status: "ok",
            detail: format!("{} is writable", settings.general.data_dir.display()),
        }),
        Err(err) => checks.push(DoctorCheck {
            name: "directories",
            status: "error",
            detail: err.to_string(),
        }),
    }

    DoctorReport {
        data_dir: settings.general.data_dir.clone(),
        checks,
    }
}

pub fn config_command(settings: &Settings, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let toml = toml::to_string_pretty(settings)?;
            println!("{}", toml);
        }
        ConfigCommand::Path => {
            let path = Settings::config_path()?;
            println!("{}", path.display());
        }
        ConfigCommand::Init { force } => {
            let path = Settings::config_path()?;
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at {}. Use --force to overwrite.",
                    path.display()
                );
            }
            Settings::write_default(&path)?;
            println!("Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}
