//! screenrec - threaded screen and audio recorder
//!
//! Entry point for the screenrec CLI application.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use screenrec::cli::{Cli, Commands};
use screenrec::config::Settings;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Commands::Completions { shell } => {
            screenrec::cli::completions::print(shell);
        }
        command => {
            // Load configuration only for runtime commands.
            let settings = Settings::load()?;

            match command {
                Commands::Record {
                    output,
                    duration,
                    fps,
                    no_audio,
                    quality,
                    demo,
                } => {
                    screenrec::cli::commands::record(
                        &settings, output, duration, fps, no_audio, quality, demo,
                    )?;
                }
                Commands::Doctor { json } => {
                    screenrec::cli::commands::run_doctor(&settings, json)?;
                }
                Commands::Config(config_cmd) => {
                    screenrec::cli::commands::config_command(&settings, config_cmd)?;
                }
                Commands::Completions { .. } => unreachable!(),
            }
        }
    }

    Ok(())
}
