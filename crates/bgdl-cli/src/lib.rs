//! Command-line front end for bgdl.
//!
//! Stands in for a host application's command dispatch: parses a command,
//! wires the HTTP facility to the transfer engine, and forwards `fetch`,
//! `list` and `stop` to the manager.

#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tempfile as _;

// Used by the binary target.
use anyhow as _;
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod progress;

pub use bootstrap::{CliConfig, CliContext, bootstrap};
pub use commands::{Commands, FetchArgs};
pub use error::CliError;
pub use parser::Cli;
