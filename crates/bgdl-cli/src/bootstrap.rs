//! CLI bootstrap - the composition root.
//!
//! The only place where the HTTP facility and the transfer engine are wired
//! together. Command handlers receive the composed [`CliContext`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bgdl_core::{TransferManagerConfig, TransferManagerPort};
use bgdl_download::{TokioFileStore, TransferManagerDeps, build_transfer_manager};
use bgdl_http::{HttpFacilityConfig, HttpTransferFacility};

use crate::error::CliError;

/// Bootstrap configuration for the CLI.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Directory holding staged payloads and the journal.
    pub staging_dir: PathBuf,
    /// How long to wait for the facility to confirm a cancellation.
    pub cancel_grace: Duration,
}

impl CliConfig {
    /// Config with the staging directory under the user's data directory,
    /// unless `staging_dir` overrides it.
    pub fn with_defaults(staging_dir: Option<PathBuf>) -> Result<Self, CliError> {
        let staging_dir = match staging_dir {
            Some(dir) => dir,
            None => default_staging_dir()?,
        };
        Ok(Self {
            staging_dir,
            cancel_grace: TransferManagerConfig::default().cancel_grace,
        })
    }

    #[must_use]
    pub const fn with_cancel_grace(mut self, cancel_grace: Duration) -> Self {
        self.cancel_grace = cancel_grace;
        self
    }
}

/// `<data dir>/bgdl/transfers`.
pub fn default_staging_dir() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("bgdl").join("transfers"))
        .ok_or_else(|| {
            CliError::Config(
                "cannot determine a data directory; pass --staging-dir or set BGDL_STAGING_DIR"
                    .to_string(),
            )
        })
}

/// Fully composed context for CLI commands.
pub struct CliContext {
    /// Caller-facing transfer manager.
    pub manager: Arc<dyn TransferManagerPort>,
    /// Staging directory in use.
    pub staging_dir: PathBuf,
}

impl CliContext {
    pub fn manager(&self) -> &dyn TransferManagerPort {
        self.manager.as_ref()
    }
}

/// Open the facility, build the manager and adopt leftovers from earlier runs.
pub async fn bootstrap(config: CliConfig) -> Result<CliContext, CliError> {
    let facility = HttpTransferFacility::open(HttpFacilityConfig::new(&config.staging_dir)).await?;

    let manager = build_transfer_manager(TransferManagerDeps {
        native: Arc::new(facility),
        file_store: Arc::new(TokioFileStore::new()),
        config: TransferManagerConfig::new().with_cancel_grace(config.cancel_grace),
    });

    let adopted = manager.reconcile().await?;
    if adopted > 0 {
        tracing::info!(adopted, "Adopted transfers left by a previous run");
    }

    Ok(CliContext {
        manager: Arc::new(manager),
        staging_dir: config.staging_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_staging_dir_wins() {
        let config = CliConfig::with_defaults(Some(PathBuf::from("/tmp/stage"))).unwrap();
        assert_eq!(config.staging_dir, PathBuf::from("/tmp/stage"));
        assert_eq!(config.cancel_grace, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn bootstrap_starts_with_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::with_defaults(Some(dir.path().to_path_buf())).unwrap();
        let ctx = bootstrap(config).await.unwrap();
        assert!(ctx.manager().snapshot().await.is_empty());
        assert!(dir.path().join("transfers.json").exists());
    }
}
