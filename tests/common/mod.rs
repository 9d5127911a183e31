use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use screenrec::capture::{Geometry, TimestampedFrame};
use screenrec::video::{VideoSink, VideoSinkFactory};
use screenrec::Result;

pub fn run_screenrec(args: &[&str]) -> Output {
    TestEnv::new().run(args)
}

pub struct TestEnv {
    home: TempDir,
    config: TempDir,
    data: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            home: tempfile::tempdir().expect("create temporary HOME dir"),
            config: tempfile::tempdir().expect("create temporary XDG config dir"),
            data: tempfile::tempdir().expect("create temporary XDG data dir"),
        }
    }

    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_screenrec"))
            .args(args)
            .env("HOME", self.home.path())
            .env("XDG_CONFIG_HOME", self.config.path())
            .env("XDG_DATA_HOME", self.data.path())
            .env("SCREENREC_DATA_DIR", self.data.path())
            .output()
            .expect("failed to execute screenrec binary")
    }

    #[allow(dead_code)]
    pub fn data_path(&self) -> &Path {
        self.data.path()
    }

    #[allow(dead_code)]
    pub fn config_path(&self) -> PathBuf {
        let output = self.run(&["config", "path"]);
        assert!(
            output.status.success(),
            "config path should succeed\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );

        let path = String::from_utf8_lossy(&output.stdout);
        PathBuf::from(path.trim())
    }
}

/// In-memory video sink that records the sequence number of every frame it
/// receives, for ordering assertions.
#[allow(dead_code)]
pub struct MemorySink {
    sequences: Arc<Mutex<Vec<u64>>>,
    write_delay: std::time::Duration,
}

impl VideoSink for MemorySink {
    fn write_frame(&mut self, frame: &TimestampedFrame) -> Result<()> {
        if !self.write_delay.is_zero() {
            std::thread::sleep(self.write_delay);
        }
        self.sequences
            .lock()
            .expect("sink log poisoned")
            .push(frame.sequence);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[allow(dead_code)]
pub struct MemoryFactory {
    pub sequences: Arc<Mutex<Vec<u64>>>,
    pub write_delay: std::time::Duration,
}

#[allow(dead_code)]
impl MemoryFactory {
    pub fn new() -> Self {
        Self {
            sequences: Arc::new(Mutex::new(Vec::new())),
            write_delay: std::time::Duration::ZERO,
        }
    }

    pub fn with_write_delay(mut self, delay: std::time::Duration) -> Self {
        self.write_delay = delay;
        self
    }

    pub fn written(&self) -> Vec<u64> {
        self.sequences.lock().expect("sink log poisoned").clone()
    }
}

impl VideoSinkFactory for MemoryFactory {
    fn open(&self, _path: &Path, _geo: Geometry, _fps: u32) -> Result<Box<dyn VideoSink>> {
        Ok(Box::new(MemorySink {
            sequences: Arc::clone(&self.sequences),
            write_delay: self.write_delay,
        }))
    }
}
