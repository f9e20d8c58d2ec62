//! Configuration for the HTTP transfer facility.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default `User-Agent` sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("bgdl/", env!("CARGO_PKG_VERSION"));

/// File name of the journal inside the staging directory.
pub const JOURNAL_FILE: &str = "transfers.json";

/// Settings for [`HttpTransferFacility`](crate::HttpTransferFacility).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFacilityConfig {
    /// Directory holding staged payloads and the journal.
    pub staging_dir: PathBuf,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Minimum spacing between progress events for one transfer.
    pub progress_interval: Duration,
}

impl HttpFacilityConfig {
    /// Configuration staging into `staging_dir` with default settings.
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(30),
            progress_interval: Duration::from_millis(100),
        }
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Location of the journal file.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.staging_dir.join(JOURNAL_FILE)
    }

    /// The staging directory.
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }
}
