//! Available subcommands.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bgdl_core::transfer::DownloadConfiguration;
use clap::{Args, Subcommand};

use crate::error::CliError;

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Download a URL into a file, attaching to a leftover transfer if one exists
    Fetch(FetchArgs),

    /// Show transfers known to the manager, including leftovers
    List {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Cancel and discard the transfer for a destination
    Stop {
        /// Destination file of the transfer
        target: String,
    },
}

/// Arguments for `fetch`.
///
/// A `--config` file supplies a full download configuration; flags given
/// alongside it override its fields.
#[derive(Args, Debug, Default)]
pub struct FetchArgs {
    /// URL to download
    pub url: Option<String>,

    /// Destination file
    pub target: Option<String>,

    /// JSON download configuration (targetFile, downloadURL, requestHeaders, ...)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Request header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    pub headers: Vec<String>,

    /// Session identifier grouping related transfers
    #[arg(long)]
    pub session_id: Option<String>,

    /// Regex identifying the same resource behind different URLs
    #[arg(long)]
    pub uri_matcher: Option<String>,

    /// Title for notification-capable facilities
    #[arg(long)]
    pub title: Option<String>,

    /// Seconds to wait before the first request
    #[arg(long)]
    pub delay: Option<f64>,

    /// Do not draw a progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

impl FetchArgs {
    /// Merge the config file (if any) and flags into one configuration.
    ///
    /// Required fields are not checked here; the manager rejects an
    /// incomplete configuration before any transfer is created.
    pub fn into_configuration(self) -> Result<DownloadConfiguration, CliError> {
        let mut configuration = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path).map_err(|e| {
                    CliError::Io(format!("cannot read {}: {e}", path.display()))
                })?;
                DownloadConfiguration::from_json(&json)?
            }
            None => DownloadConfiguration::default(),
        };

        if let Some(url) = self.url {
            configuration.download_url = Some(url);
        }
        if let Some(target) = self.target {
            configuration.target_file = Some(target);
        }
        if !self.headers.is_empty() {
            let headers = configuration
                .request_headers
                .get_or_insert_with(BTreeMap::new);
            for raw in &self.headers {
                let (name, value) = parse_header(raw)?;
                headers.insert(name, value);
            }
        }
        if self.session_id.is_some() {
            configuration.session_id = self.session_id;
        }
        if self.uri_matcher.is_some() {
            configuration.uri_matcher = self.uri_matcher;
        }
        if self.title.is_some() {
            configuration.notification_title = self.title;
        }
        if self.delay.is_some() {
            configuration.download_delay = self.delay;
        }

        Ok(configuration)
    }
}

fn parse_header(raw: &str) -> Result<(String, String), CliError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| CliError::Arguments(format!("header '{raw}' is not 'Name: value'")))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::Arguments(format!("header '{raw}' has no name")));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
