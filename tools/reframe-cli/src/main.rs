//! Reframe CLI: turn landscape video into a vertical presentation.
//!
//! Usage:
//!   reframe vertical <INPUT>   Export a vertical presentation of a source
//!   reframe probe <INPUT>      Print the probed asset model as JSON
//!   reframe check              Check that ffmpeg and ffprobe are installed

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use reframe_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "reframe",
    about = "Vertical presentation exports for landscape video",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/reframe/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a vertical presentation of a landscape source
    Vertical {
        /// Source video file
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output container: mp4|mov|webm
        #[arg(long)]
        container: Option<String>,

        /// Quality preset: highest|high|medium|low
        #[arg(long)]
        quality: Option<String>,

        /// Output frame rate
        #[arg(long)]
        fps: Option<u32>,

        /// Do not open the result in a player
        #[arg(long)]
        no_play: bool,

        /// Do not copy the result into the library
        #[arg(long)]
        no_save: bool,
    },

    /// Print the probed asset model as JSON
    Probe {
        /// Source media file
        input: PathBuf,
    },

    /// Check that the external media tools are available
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if let Some(path) = cli.log_file.clone() {
        config.logging.file = Some(path);
    }
    reframe_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Vertical {
            input,
            output,
            container,
            quality,
            fps,
            no_play,
            no_save,
        } => {
            commands::vertical::run(
                config,
                commands::vertical::VerticalArgs {
                    input,
                    output,
                    container,
                    quality,
                    fps,
                    play: !no_play,
                    save: !no_save,
                },
            )
            .await
        }
        Commands::Probe { input } => commands::probe::run(input),
        Commands::Check => commands::check::run(),
    }
}
