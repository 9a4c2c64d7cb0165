//! SceneStitch CLI: analyze scene modules, inspect and export timelines.
//!
//! Usage:
//!   scenestitch analyze <FILE>       Discover a module's sequence structure
//!   scenestitch info <TIMELINE>      Show timeline information
//!   scenestitch estimate <TIMELINE>  Estimate pre-render work
//!   scenestitch export <TIMELINE>    Export a timeline to video
//!   scenestitch check                Check system capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use scenestitch_common::AppConfig;

mod commands;
mod preview;

#[derive(Parser)]
#[command(
    name = "scenestitch",
    about = "Timeline compositing for embedded scene modules",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover the Sequence/Transition structure of a scene module
    Analyze {
        /// Path to the module source
        path: PathBuf,

        /// Component id (defaults to the file stem)
        #[arg(long)]
        id: Option<String>,

        /// Frames used for dynamic or missing durations
        #[arg(long)]
        default_duration: Option<u64>,

        /// Print the full analysis as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show timeline information
    Info {
        /// Path to the timeline document
        path: PathBuf,
    },

    /// Estimate pre-render work for a timeline
    Estimate {
        /// Path to the timeline document
        path: PathBuf,
    },

    /// Export a timeline, previewing scene modules from their analyzed structure
    Export {
        /// Path to the timeline document
        path: PathBuf,

        /// Output file (or directory with --frames)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory holding `<module_id>.tsx` sources
        #[arg(long, default_value = "modules")]
        modules_dir: PathBuf,

        /// Write a PNG sequence instead of encoding with ffmpeg
        #[arg(long)]
        frames: bool,

        /// Override output format: mp4-h264, mp4-h265, webm, gif
        #[arg(long)]
        format: Option<String>,
    },

    /// Check system capabilities
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    scenestitch_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Analyze {
            path,
            id,
            default_duration,
            json,
        } => commands::analyze::run(&config, path, id, default_duration, json),
        Commands::Info { path } => commands::info::run(path),
        Commands::Estimate { path } => commands::estimate::run(&config, path),
        Commands::Export {
            path,
            output,
            modules_dir,
            frames,
            format,
        } => commands::export::run(&config, path, output, modules_dir, frames, format).await,
        Commands::Check => commands::check::run(&config),
    }
}
