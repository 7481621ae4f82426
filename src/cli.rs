use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vidfusion")]
#[command(author, version, about = "Chained ffmpeg transformations and clip assembly")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a job file through a transformation session
    Run {
        /// Job file (TOML)
        #[arg(required = true)]
        job: PathBuf,

        /// Show what would be done without executing
        #[arg(long)]
        dry_run: bool,
    },

    /// Probe a media file for duration and dimensions
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Pick random clips from a directory
    Pick {
        /// Directory to pick from
        #[arg(required = true)]
        dir: PathBuf,

        /// Number of clips to pick
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// File extension to match
        #[arg(long, default_value = "mp4")]
        ext: String,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
