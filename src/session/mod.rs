//! Recording session lifecycle
//!
//! A [`RecordingSession`] wires the capture scheduler, frame writer, and
//! audio pipeline together, watches them while they run, and reconciles the
//! artifacts they leave behind into the final output file.

mod recording;
mod stats;

pub use recording::{RecordingSession, SessionConfig, SessionOutcome, SessionState};
pub use stats::{SessionStats, StatsSnapshot};
