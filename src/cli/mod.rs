//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{CleanupCommand, HistoryCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Run multi-stage network automation workflows
#[derive(Debug, Parser, Clone)]
#[command(name = "netflow")]
#[command(version = "0.1.0")]
#[command(about = "Execution engine for multi-stage network automation workflows", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a workflow against a device
    Run(RunCommand),

    /// Validate a workflow document
    Validate(ValidateCommand),

    /// Show execution history
    History(HistoryCommand),

    /// Delete old execution history
    Cleanup(CleanupCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
