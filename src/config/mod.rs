//! Configuration module for screenrec
//!
//! Handles loading and managing application settings from TOML files.

mod settings;

pub use settings::{AudioSettings, GeneralSettings, Settings, ToolSettings, VideoSettings};
