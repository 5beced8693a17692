//! Command-line interface for radarlink.
//!
//! This module provides the CLI structure for the `radarlink` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, DecodeCommand, HistoryCommand, RenderCommand, ServeCommand};

/// radarlink - Relay a rotating range sensor to a radar display
///
/// Decodes `angle,distance` frames from a serial link, keeps a JSON history
/// log, and pushes every sample to connected display clients.
#[derive(Debug, Parser)]
#[command(name = "radarlink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the relay server
    Serve(ServeCommand),

    /// Print the history log
    History(HistoryCommand),

    /// Decode a raw link capture
    Decode(DecodeCommand),

    /// Render the radar view from simulated samples
    Render(RenderCommand),

    /// List serial ports
    Ports,

    /// View or check configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
