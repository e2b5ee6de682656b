use clap::{Parser, Subcommand};
use cs_core::Codec;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clipshare")]
#[command(author, version, about = "Media sharing with background transcoding")]
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
    /// Run the worker pool and expiry sweeper until interrupted
    Serve {
        /// Override the configured worker count
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Store a file and queue its conversions
    Ingest {
        /// File to ingest
        #[arg(required = true)]
        file: PathBuf,

        /// Output codec (repeatable): av1, h264, opus
        #[arg(long = "codec", value_parser = parse_codec)]
        codecs: Vec<Codec>,

        /// Frame rate override for video outputs
        #[arg(long)]
        fps: Option<u32>,

        /// Days to keep the upload (defaults to config)
        #[arg(long)]
        retention_days: Option<u32>,
    },

    /// Process queued jobs until the queue is empty, then exit
    RunOnce,

    /// Show a media with its variants and jobs
    Status {
        /// Media id
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List all stored media
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a media and its files
    Delete {
        /// Media id
        id: String,
    },

    /// Delete expired media now
    Sweep,

    /// Probe a media file and display information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },
}

fn parse_codec(s: &str) -> Result<Codec, String> {
    s.to_ascii_lowercase().parse().map_err(|e: cs_core::Error| e.to_string())
}
