//! Native transfer facility port.
//!
//! Every platform provides a different persistent-transfer subsystem. This
//! port is the single capability set the engine depends on; each platform
//! variant implements it and the engine never names a concrete one.
//!
//! # Design
//!
//! - The facility, not the engine, is the durable store of transfer identity
//! - Transfers are tagged with the destination tag so they can be found again
//! - Events for a handle arrive on a channel handed out by `subscribe_progress`

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::transfer::{NativeEvent, NativeHandleId, TransferError, TransferRequest, TransferTag};

/// Receiving side of a native handle's event stream.
pub type NativeEventStream = mpsc::UnboundedReceiver<NativeEvent>;

/// What the facility needs to create a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeTransferSpec {
    /// Tag stored with the transfer so it can be found after a restart.
    pub tag: TransferTag,
    /// Absolute source URI.
    pub source_uri: String,
    /// Request headers, passed through verbatim.
    pub headers: BTreeMap<String, String>,
    /// Session grouping identifier.
    pub session_id: Option<String>,
    /// Title for facilities that show a system notification.
    pub notification_title: Option<String>,
    /// Delay before the first request.
    pub delay: Option<Duration>,
}

impl NativeTransferSpec {
    /// Build the facility spec for a validated request.
    #[must_use]
    pub fn from_request(request: &TransferRequest) -> Self {
        Self {
            tag: request.tag().clone(),
            source_uri: request.source_uri().to_string(),
            headers: request.request_headers().clone(),
            session_id: request.session_id().map(ToString::to_string),
            notification_title: request.notification_title().map(ToString::to_string),
            delay: request.download_delay(),
        }
    }
}

/// Status of a transfer as the facility sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NativeStatus {
    /// Queued, no data yet.
    Pending,
    /// Receiving data.
    Running,
    /// Suspended; resumes when subscribed again.
    Paused {
        /// Why the transfer is suspended.
        reason: String,
    },
    /// The request finished with the given status code.
    Completed {
        /// HTTP status code of the finished request.
        status_code: u16,
    },
    /// The request failed.
    Failed {
        /// Diagnostic text.
        message: String,
    },
    /// The transfer was cancelled.
    Cancelled,
}

impl NativeStatus {
    /// Whether the transfer can still produce data.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::Paused { .. })
    }
}

/// Point-in-time view of one transfer known to the facility.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeTransferSnapshot {
    /// Facility-assigned identifier.
    pub handle: NativeHandleId,
    /// Tag stored with the transfer, if any.
    pub tag: Option<TransferTag>,
    /// Source URI of the transfer.
    pub source_uri: String,
    /// Facility status.
    pub status: NativeStatus,
    /// Bytes received so far.
    pub bytes_received: u64,
    /// Total bytes, 0 if unknown.
    pub bytes_total: u64,
    /// Transfer-internal payload location.
    pub payload_path: PathBuf,
}

/// Port for a platform's persistent transfer facility.
#[async_trait]
pub trait NativeTransferPort: Send + Sync {
    /// Create a transfer for `spec`, or return the handle of the facility's
    /// existing transfer carrying the same tag.
    async fn create_or_attach(
        &self,
        spec: &NativeTransferSpec,
    ) -> Result<NativeHandleId, TransferError>;

    /// Find a transfer carrying `tag`.
    async fn query_existing(
        &self,
        tag: &TransferTag,
    ) -> Result<Option<NativeTransferSnapshot>, TransferError>;

    /// Enumerate every transfer the facility still tracks.
    ///
    /// A finite snapshot, safe to call again.
    async fn list_transfers(&self) -> Result<Vec<NativeTransferSnapshot>, TransferError>;

    /// Ask the facility to stop a transfer.
    ///
    /// Best-effort: the facility confirms with `NativeEvent::Cancelled` on the
    /// handle's stream, or simply stops sending events.
    async fn cancel(&self, handle: &NativeHandleId) -> Result<(), TransferError>;

    /// Subscribe to the handle's events, starting the transfer if it is idle.
    ///
    /// A new subscription replaces the previous one.
    async fn subscribe_progress(
        &self,
        handle: &NativeHandleId,
    ) -> Result<NativeEventStream, TransferError>;

    /// Forget a finished transfer and delete any staging data it still holds.
    ///
    /// Releasing an unknown handle is not an error.
    async fn release(&self, handle: &NativeHandleId) -> Result<(), TransferError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_carries_request_fields() {
        let request = TransferRequest::new("https://h/f?x=1", "/local/f")
            .unwrap()
            .with_header("A", "b")
            .with_session_id("s")
            .with_download_delay(Duration::from_secs(3));

        let spec = NativeTransferSpec::from_request(&request);
        assert_eq!(spec.tag.as_str(), "/local/f");
        assert_eq!(spec.source_uri, "https://h/f?x=1");
        assert_eq!(spec.headers.get("A").map(String::as_str), Some("b"));
        assert_eq!(spec.session_id.as_deref(), Some("s"));
        assert_eq!(spec.delay, Some(Duration::from_secs(3)));
    }

    #[test]
    fn in_flight_statuses() {
        assert!(NativeStatus::Pending.is_in_flight());
        assert!(NativeStatus::Running.is_in_flight());
        assert!(
            NativeStatus::Paused {
                reason: "offline".into()
            }
            .is_in_flight()
        );
        assert!(!NativeStatus::Completed { status_code: 200 }.is_in_flight());
        assert!(!NativeStatus::Cancelled.is_in_flight());
    }
}
