//! Transfer notifications and native facility events.
//!
//! Two vocabularies live here: `NativeEvent` is what a native transfer
//! facility reports about a handle, and `TransferNotification` is what the
//! caller of an operation observes after the engine has normalized it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::errors::TransferError;

/// Notification delivered to the owner of a transfer operation.
///
/// Non-terminal notifications (`Progress`, `Status`) may repeat; exactly one
/// terminal notification (`Completed`, `Failed`, `Cancelled`) ends the stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransferNotification {
    /// Normalized progress (0.0 - 100.0), never decreasing.
    Progress {
        /// Progress percentage.
        percentage: f64,
    },

    /// Informational state change reported by the facility (pending, paused).
    Status {
        /// Human-readable description.
        message: String,
    },

    /// Payload received and moved into the destination.
    Completed,

    /// The transfer failed.
    Failed {
        /// What went wrong.
        error: TransferError,
    },

    /// The transfer was cancelled before completing.
    Cancelled,
}

impl TransferNotification {
    /// Create a progress notification.
    #[must_use]
    pub const fn progress(percentage: f64) -> Self {
        Self::Progress { percentage }
    }

    /// Create a status notification.
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    /// Create a failure notification.
    #[must_use]
    pub const fn failed(error: TransferError) -> Self {
        Self::Failed { error }
    }

    /// Whether this notification ends the operation.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. } | Self::Cancelled)
    }

    /// Progress percentage, if this is a progress notification.
    #[must_use]
    pub const fn percentage(&self) -> Option<f64> {
        match self {
            Self::Progress { percentage } => Some(*percentage),
            _ => None,
        }
    }

    /// Convert a terminal notification into the operation's result.
    ///
    /// Returns `None` for non-terminal notifications.
    #[must_use]
    pub fn into_result(self) -> Option<Result<(), TransferError>> {
        match self {
            Self::Completed => Some(Ok(())),
            Self::Failed { error } => Some(Err(error)),
            Self::Cancelled => Some(Err(TransferError::Cancelled)),
            Self::Progress { .. } | Self::Status { .. } => None,
        }
    }
}

/// Raw event reported by a native transfer facility for one handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NativeEvent {
    /// Bytes received so far; `bytes_total` is 0 when unknown.
    Progress {
        /// Bytes received so far.
        bytes_received: u64,
        /// Total bytes, 0 if unknown.
        bytes_total: u64,
    },

    /// Queued by the facility, waiting to run.
    Pending {
        /// Facility-provided reason.
        reason: String,
    },

    /// Suspended by the facility (network loss, process exit).
    Paused {
        /// Facility-provided reason.
        reason: String,
    },

    /// The facility finished the request. Success is decided by `status_code`.
    Completed {
        /// HTTP status code of the finished request.
        status_code: u16,
        /// Transfer-internal location of the received payload.
        payload_path: PathBuf,
    },

    /// Transport failure or rejected request.
    Failed {
        /// HTTP status code if the server answered.
        status_code: Option<u16>,
        /// Diagnostic text from the facility.
        message: String,
    },

    /// The facility confirmed cancellation.
    Cancelled,
}

impl NativeEvent {
    /// Whether the facility will send nothing further for this handle.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled
        )
    }
}

/// Whether an HTTP status code of a completed native request means success.
#[must_use]
pub const fn is_success_status(status_code: u16) -> bool {
    matches!(status_code, 200 | 206)
}
