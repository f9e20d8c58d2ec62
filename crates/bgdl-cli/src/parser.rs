//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Background file downloads that survive restarts.
#[derive(Parser)]
#[command(name = "bgdl")]
#[command(about = "Background file downloads that survive restarts")]
#[command(version)]
pub struct Cli {
    /// Directory holding staged payloads and the transfer journal
    #[arg(long = "staging-dir", env = "BGDL_STAGING_DIR", global = true)]
    pub staging_dir: Option<PathBuf>,

    /// Seconds to wait for a cancellation to be confirmed
    #[arg(long = "cancel-grace", global = true, default_value_t = 2.0)]
    pub cancel_grace: f64,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}
