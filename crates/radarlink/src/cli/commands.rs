//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Open the hardware link on startup instead of waiting for a request
    #[arg(long)]
    pub connect: bool,
}

/// History command arguments.
#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Show only the last N samples
    #[arg(short, long)]
    pub last: Option<usize>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Decode command arguments.
#[derive(Debug, Args)]
pub struct DecodeCommand {
    /// Raw capture to decode (reads stdin if omitted)
    pub file: Option<PathBuf>,
}

/// Render command arguments.
#[derive(Debug, Args)]
pub struct RenderCommand {
    /// Number of simulation ticks to run before rendering
    #[arg(short, long, default_value = "40")]
    pub ticks: u32,

    /// Write the SVG here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        file: Option<PathBuf>,
    },
}
