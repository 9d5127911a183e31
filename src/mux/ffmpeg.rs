//! FFmpeg discovery and process handling
//!
//! The merge step shells out to FFmpeg. The binary is located once per
//! session, probed with `-version` before use, and every invocation runs
//! under a hard timeout so a wedged encoder cannot hang finalization.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::{RecorderError, Result};

/// Bound on the `-version` probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A located FFmpeg binary and where it came from.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    pub path: PathBuf,
    pub origin: String,
}

fn exe_name() -> &'static str {
    if cfg!(windows) {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    }
}

/// Resolve a configured path: a directory means "the binary lives in here".
fn resolve_candidate(candidate: &Path) -> Option<PathBuf> {
    let path = if candidate.is_dir() {
        candidate.join(exe_name())
    } else {
        candidate.to_path_buf()
    };
    path.is_file().then_some(path)
}

/// Locate FFmpeg: configured path, then the `FFMPEG_PATH` environment
/// variable, then the system PATH, then common Windows install locations.
pub fn find_ffmpeg(configured: Option<&Path>) -> Option<FfmpegTool> {
    if let Some(candidate) = configured {
        if let Some(path) = resolve_candidate(candidate) {
            return Some(FfmpegTool {
                path,
                origin: "configuration".to_string(),
            });
        }
    }

    if let Some(env_path) = std::env::var_os("FFMPEG_PATH") {
        let env_path = PathBuf::from(env_path);
        if let Some(path) = resolve_candidate(&env_path) {
            return Some(FfmpegTool {
                path,
                origin: "FFMPEG_PATH environment".to_string(),
            });
        }
    }

    if let Some(system_path) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&system_path) {
            let candidate = dir.join(exe_name());
            if candidate.is_file() {
                return Some(FfmpegTool {
                    path: candidate,
                    origin: "system PATH".to_string(),
                });
            }
        }
    }

    #[cfg(windows)]
    {
        let mut candidates = vec![
            PathBuf::from(r"C:\ffmpeg\bin\ffmpeg.exe"),
            PathBuf::from(r"C:\Program Files\ffmpeg\bin\ffmpeg.exe"),
            PathBuf::from(r"C:\Program Files (x86)\ffmpeg\bin\ffmpeg.exe"),
        ];
        if let Some(home) = std::env::var_os("USERPROFILE") {
            let home = PathBuf::from(home);
            candidates.push(home.join(r"ffmpeg\bin\ffmpeg.exe"));
            candidates.push(home.join(r"Downloads\ffmpeg\bin\ffmpeg.exe"));
        }
        for candidate in candidates {
            if candidate.is_file() {
                return Some(FfmpegTool {
                    path: candidate,
                    origin: "well-known install location".to_string(),
                });
            }
        }
    }

    None
}

/// Run `-version` against the binary and return its first output line.
pub fn probe_ffmpeg(path: &Path) -> Result<String> {
    let mut cmd = Command::new(path);
    cmd.arg("-version");
    let output = run_with_timeout(cmd, PROBE_TIMEOUT)?;
    if !output.status.success() {
        return Err(RecorderError::Mux(format!(
            "{} -version exited with {}",
            path.display(),
            output.status
        )));
    }
    Ok(output
        .stdout
        .lines()
        .next()
        .unwrap_or("unknown version")
        .to_string())
}

pub(crate) struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

fn drain_pipe(pipe: Option<impl Read + Send + 'static>) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut out = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut out);
        }
        out
    })
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Run a command to completion, killing it if the deadline passes.
pub(crate) fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<ProcessOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd
        .spawn()
        .map_err(|e| RecorderError::Mux(format!("cannot spawn {:?}: {}", cmd.get_program(), e)))?;

    // Readers run on their own threads so a full pipe cannot deadlock the
    // child against our try_wait loop.
    let stdout = drain_pipe(child.stdout.take());
    let stderr = drain_pipe(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    kill_and_reap(&mut child);
                    return Err(RecorderError::Mux(format!(
                        "process timed out after {:?}",
                        timeout
                    )));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                kill_and_reap(&mut child);
                return Err(RecorderError::Mux(format!("cannot wait on process: {}", e)));
            }
        }
    };

    Ok(ProcessOutput {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_yields_a_mux_error() {
        let cmd = Command::new("/definitely/not/a/real/ffmpeg");
        assert!(run_with_timeout(cmd, Duration::from_secs(1)).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn captures_stdout_of_a_quick_process() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo probe-ok"]);
        let output = run_with_timeout(cmd, Duration::from_secs(5)).unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout.trim(), "probe-ok");
    }

    #[cfg(unix)]
    #[test]
    fn kills_a_process_that_misses_the_deadline() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 10"]);
        let started = Instant::now();
        let result = run_with_timeout(cmd, Duration::from_millis(200));
        assert!(result.is_err(), "timeout must surface as an error");
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "the child must be killed promptly, not waited out"
        );
    }

    #[test]
    fn configured_directory_is_resolved_to_the_binary() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join(exe_name());
        std::fs::write(&binary, b"#!/bin/sh\n").unwrap();

        let resolved = resolve_candidate(dir.path()).expect("directory should resolve");
        assert_eq!(resolved, binary);
        assert_eq!(resolve_candidate(&binary), Some(binary));
        assert_eq!(resolve_candidate(&dir.path().join("missing")), None);
    }
}
