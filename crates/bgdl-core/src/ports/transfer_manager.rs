//! Transfer manager port definition.
//!
//! This port defines the public interface of the download engine. It hides
//! the native facility, cancellation tokens and lock tables behind a small
//! async API that a command-dispatch layer can forward calls to.

use std::time::Duration;

use async_trait::async_trait;

use crate::transfer::{
    DownloadConfiguration, TransferError, TransferOperation, TransferRecord, TransferRequest,
};

/// Configuration for creating a transfer manager.
#[derive(Debug, Clone)]
pub struct TransferManagerConfig {
    /// How long to wait for the facility to confirm a cancellation before
    /// declaring the transfer cancelled anyway.
    pub cancel_grace: Duration,
}

impl Default for TransferManagerConfig {
    fn default() -> Self {
        Self {
            cancel_grace: Duration::from_secs(2),
        }
    }
}

impl TransferManagerConfig {
    /// Create a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cancellation grace period.
    #[must_use]
    pub const fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }
}

/// Port for managing background downloads.
///
/// # Usage
///
/// ```ignore
/// let manager: Arc<dyn TransferManagerPort> = /* ... */;
///
/// let request = TransferRequest::new("https://example.com/f", "/data/f")?;
/// let mut operation = manager.start_async(request).await?;
/// let mut stream = operation.progress_stream().unwrap();
/// while let Some(notification) = stream.next_notification().await {
///     // progress..., then exactly one terminal notification
/// }
/// ```
#[async_trait]
pub trait TransferManagerPort: Send + Sync {
    /// Start a download, or attach to an existing one for the same destination.
    ///
    /// Returns once the native transfer is created or attached, not when it
    /// finishes. Fails with `Configuration` only for invalid requests.
    async fn start_async(&self, request: TransferRequest)
    -> Result<TransferOperation, TransferError>;

    /// Validate a wire configuration and start it.
    ///
    /// Fails fast with `Configuration` before any native transfer is created.
    async fn start_with_configuration(
        &self,
        configuration: DownloadConfiguration,
    ) -> Result<TransferOperation, TransferError> {
        let request = configuration.into_request()?;
        self.start_async(request).await
    }

    /// Request cancellation of the transfer targeting `destination`.
    ///
    /// The acknowledgment does not carry the transfer outcome; that arrives on
    /// the operation's own stream.
    async fn stop(&self, destination: &str) -> Result<(), TransferError>;

    /// Adopt transfers left over from a previous process lifetime.
    ///
    /// Meant to run once at start-up, before requests are served. Each
    /// adoption takes the tag's lock, so a `start` racing with it keeps its
    /// own transfer and the leftover is skipped.
    ///
    /// Returns the number of records adopted.
    async fn reconcile(&self) -> Result<usize, TransferError>;

    /// Snapshot of every record the manager knows.
    async fn snapshot(&self) -> Vec<TransferRecord>;

    /// Request cancellation of every live operation.
    async fn shutdown(&self) -> usize;
}
