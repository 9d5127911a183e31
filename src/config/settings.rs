//! Application settings management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::mux::QualityTier;
use crate::pipeline::OverlaySettings;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// General settings
    #[serde(default)]
    pub general: GeneralSettings,

    /// Video capture settings
    #[serde(default)]
    pub video: VideoSettings,

    /// Overlay compositing settings
    #[serde(default)]
    pub overlay: OverlaySettings,

    /// Audio capture settings
    #[serde(default)]
    pub audio: AudioSettings,

    /// External tool settings
    #[serde(default)]
    pub tools: ToolSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Data directory for recordings
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSettings {
    /// Target capture rate in frames per second
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Encoding quality tier (low, medium, high, ultra)
    #[serde(default)]
    pub quality: QualityTier,

    /// Bound on the capture queue, in frames
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Number of pre-allocated frame buffers
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Every Nth frame is an anchor (0 = one per second at the target fps)
    #[serde(default)]
    pub anchor_interval: u64,

    /// Split long recordings into segments
    #[serde(default)]
    pub use_segments: bool,

    /// Segment length in minutes
    #[serde(default = "default_segment_minutes")]
    pub segment_duration_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Record audio alongside the screen
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sample rate for recording
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono, 2 = stereo)
    #[serde(default = "default_channels")]
    pub channels: u16,

    /// Preferred audio device (empty = default)
    #[serde(default)]
    pub device: String,

    /// Capture system audio instead of the microphone (backend permitting)
    #[serde(default)]
    pub loopback: bool,

    /// Keep a copy of the WAV next to the merged output
    #[serde(default)]
    pub save_separately: bool,

    /// Bound on the audio block queue
    #[serde(default = "default_audio_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Explicit path to the FFmpeg binary or its directory
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
}

// Default value functions

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("com", "screenrec", "screenrec")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.local/share/screenrec"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_fps() -> u32 {
    30
}

fn default_queue_capacity() -> usize {
    60
}

fn default_pool_size() -> usize {
    10
}

fn default_segment_minutes() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_channels() -> u16 {
    2
}

fn default_audio_queue_capacity() -> usize {
    crate::audio::DEFAULT_AUDIO_QUEUE_CAPACITY
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            quality: QualityTier::default(),
            queue_capacity: default_queue_capacity(),
            pool_size: default_pool_size(),
            anchor_interval: 0,
            use_segments: false,
            segment_duration_minutes: default_segment_minutes(),
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            device: String::new(),
            loopback: false,
            save_separately: false,
            queue_capacity: default_audio_queue_capacity(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            general: GeneralSettings::default(),
            video: VideoSettings::default(),
            overlay: OverlaySettings::default(),
            audio: AudioSettings::default(),
            tools: ToolSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from the configuration file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("No config file found, using defaults");
            let mut settings = Self::default();
            settings.apply_env_overrides();
            return Ok(settings);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        settings.apply_env_overrides();

        Ok(settings)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("SCREENREC_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.general.data_dir = PathBuf::from(dir);
            }
        }
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "screenrec", "screenrec")
            .context("Could not determine config directory")?;

        let config_dir = dirs.config_dir();
        Ok(config_dir.join("config.toml"))
    }

    /// Write default configuration to a file
    pub fn write_default(path: &PathBuf) -> Result<()> {
        let settings = Self::default();
        let content = toml::to_string_pretty(&settings)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the recordings directory
    pub fn recordings_dir(&self) -> PathBuf {
        self.general.data_dir.join("recordings")
    }

    /// Timestamped default output path for a new recording
    pub fn default_output_path(&self) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.recordings_dir().join(format!("recording_{}.mp4", stamp))
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.general.data_dir)?;
        std::fs::create_dir_all(self.recordings_dir())?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.video.fps == 0 || self.video.fps > 240 {
            anyhow::bail!("video.fps must be between 1 and 240");
        }
        if self.video.queue_capacity == 0 {
            anyhow::bail!("video.queue_capacity must be at least 1");
        }
        if self.video.pool_size == 0 {
            anyhow::bail!("video.pool_size must be at least 1");
        }
        if self.video.use_segments && self.video.segment_duration_minutes == 0 {
            anyhow::bail!("video.segment_duration_minutes must be at least 1");
        }
        if self.audio.sample_rate == 0 {
            anyhow::bail!("audio.sample_rate must be positive");
        }
        if self.audio.channels == 0 {
            anyhow::bail!("audio.channels must be at least 1");
        }
        if self.audio.queue_capacity == 0 {
            anyhow::bail!("audio.queue_capacity must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.overlay.highlight.alpha) {
            anyhow::bail!("overlay.highlight.alpha must be between 0.0 and 1.0");
        }
        if self.overlay.inset.width_pct == 0 || self.overlay.inset.width_pct > 50 {
            anyhow::bail!("overlay.inset.width_pct must be between 1 and 50");
        }
        Ok(())
    }

    /// Anchor spacing in frames, resolving 0 to one anchor per second.
    pub fn anchor_interval(&self) -> u64 {
        if self.video.anchor_interval == 0 {
            self.video.fps as u64
        } else {
            self.video.anchor_interval
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let settings = Settings::default();
        settings.validate().expect("default settings must be valid");
        assert_eq!(settings.video.fps, 30);
        assert_eq!(settings.audio.sample_rate, 44100);
    }

    #[test]
    fn zero_anchor_interval_resolves_to_fps() {
        let mut settings = Settings::default();
        assert_eq!(settings.anchor_interval(), 30);
        settings.video.anchor_interval = 12;
        assert_eq!(settings.anchor_interval(), 12);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut settings = Settings::default();
        settings.video.fps = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.overlay.highlight.alpha = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.video.use_segments = true;
        settings.video.segment_duration_minutes = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.video.queue_capacity, settings.video.queue_capacity);
        assert_eq!(parsed.audio.channels, settings.audio.channels);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let parsed: Settings = toml::from_str("[video]\nfps = 60\n").unwrap();
        assert_eq!(parsed.video.fps, 60);
        assert_eq!(parsed.video.queue_capacity, 60);
        assert!(parsed.audio.enabled);
    }
}
