//! CLI argument definitions using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::mux::QualityTier;

/// screenrec - Threaded screen and audio recorder
#[derive(Parser, Debug)]
#[command(name = "screenrec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record the screen (and audio) to a video file
    Record {
        /// Output file path (defaults to a timestamped file in the data dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop automatically after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Override the configured capture rate
        #[arg(long)]
        fps: Option<u32>,

        /// Record video only, even if audio is enabled in the config
        #[arg(long)]
        no_audio: bool,

        /// Override the configured quality tier
        #[arg(long, value_enum)]
        quality: Option<QualityTier>,

        /// Use the synthetic test-pattern source instead of the screen
        #[arg(long)]
        demo: bool,
    },

    /// Run diagnostic checks (FFmpeg, audio device, directories)
    Doctor {
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}
