//! screenrec - a threaded screen and audio recording engine
//!
//! Captures screen pixels at a fixed cadence and audio in parallel, survives
//! backlog with anchor-aware frame dropping and adaptive quality degradation,
//! and merges both streams into one file with FFmpeg at the end.

pub mod audio;
pub mod capture;
pub mod cli;
pub mod config;
pub mod mux;
pub mod pipeline;
pub mod platform;
pub mod session;
pub mod video;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Main error type for screenrec
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Video sink error: {0}")]
    VideoSink(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Mux error: {0}")]
    Mux(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RecorderError>;

/// Fire-and-forget sink for human-readable status lines.
///
/// Every pipeline component reports through one of these. The default sink
/// forwards to tracing; a frontend can inject its own closure. Calls must
/// never block or propagate an error into the caller.
#[derive(Clone)]
pub struct StatusSink {
    inner: Arc<dyn Fn(&str) + Send + Sync>,
}

impl StatusSink {
    pub fn new(sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(sink),
        }
    }

    /// Forward one status line to the sink.
    pub fn emit(&self, msg: &str) {
        (self.inner)(msg);
    }
}

impl Default for StatusSink {
    fn default() -> Self {
        Self::new(|msg| tracing::info!("{}", msg))
    }
}

impl fmt::Debug for StatusSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StatusSink")
    }
}

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "screenrec";
