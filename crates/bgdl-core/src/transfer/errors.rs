//! Transfer error types.
//!
//! These errors are designed to be serializable and not depend on external
//! error types like `std::io::Error`. For I/O errors, we capture the kind
//! and message as strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for transfer operations.
///
/// Designed to be serializable across a command-dispatch boundary
/// without depending on non-serializable types like `std::io::Error`.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransferError {
    /// The request is missing its source URI or destination, or one is malformed.
    ///
    /// Raised before any native transfer is created.
    #[error("Configuration error: {message}")]
    Configuration {
        /// What was wrong with the configuration.
        message: String,
    },

    /// A live record already exists for this destination tag.
    ///
    /// Internal only: the manager converts it into an attach.
    #[error("Duplicate transfer tag: {tag}")]
    DuplicateTag {
        /// The tag that is already in use.
        tag: String,
    },

    /// The native facility reported a non-success status or a transport failure.
    #[error("Transfer failed: {message}")]
    Transfer {
        /// Diagnostic text as provided by the native layer.
        message: String,
        /// HTTP status code if available.
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// Moving the payload into the destination failed.
    #[error("Finalization failed ({kind}): {message}")]
    Finalization {
        /// The kind of I/O error (e.g., "`NotFound`", "`PermissionDenied`").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// The transfer was cancelled by its owner.
    #[error("Transfer cancelled")]
    Cancelled,

    /// No live transfer exists for the destination.
    #[error("download request not found: {tag}")]
    NotFound {
        /// The destination tag that was looked up.
        tag: String,
    },

    /// The native transfer facility could not service a request.
    #[error("Transfer facility error: {message}")]
    Facility {
        /// Detailed error message.
        message: String,
    },
}

impl TransferError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a duplicate tag error.
    pub fn duplicate_tag(tag: impl Into<String>) -> Self {
        Self::DuplicateTag { tag: tag.into() }
    }

    /// Create a transfer error without a status code.
    pub fn transfer(message: impl Into<String>) -> Self {
        Self::Transfer {
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a transfer error from a non-success HTTP status code.
    ///
    /// The message is the stable reason name for well-known codes, falling
    /// back to the diagnostic text provided by the native layer.
    pub fn from_status(status_code: u16, diagnostic: Option<&str>) -> Self {
        let message = status_reason(status_code).map_or_else(
            || {
                diagnostic.map_or_else(
                    || format!("Download operation failed with reason: {status_code}"),
                    ToString::to_string,
                )
            },
            ToString::to_string,
        );
        Self::Transfer {
            message,
            status_code: Some(status_code),
        }
    }

    /// Create a finalization error from kind and message strings.
    pub fn finalization(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Finalization {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create a finalization error from a `std::io::Error`.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        let kind = err.kind();
        Self::Finalization {
            kind: format!("{kind:?}"),
            message: err.to_string(),
        }
    }

    /// Finalization refused because the destination volume cannot hold the
    /// payload.
    #[must_use]
    pub fn insufficient_space(needed: u64, available: u64) -> Self {
        Self::Finalization {
            kind: INSUFFICIENT_SPACE.to_string(),
            message: format!(
                "not enough free space at destination: need {needed} bytes, {available} available"
            ),
        }
    }

    /// Create a not found error.
    pub fn not_found(tag: impl Into<String>) -> Self {
        Self::NotFound { tag: tag.into() }
    }

    /// Create a facility error.
    pub fn facility(message: impl Into<String>) -> Self {
        Self::Facility {
            message: message.into(),
        }
    }

    /// Check if this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// HTTP status code attached to this error, if any.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Transfer { status_code, .. } => *status_code,
            _ => None,
        }
    }

    /// Convert to a user-friendly message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration { message } => message.clone(),
            Self::DuplicateTag { tag } => format!("A download to '{tag}' is already running."),
            Self::Transfer {
                message,
                status_code: Some(code),
            } => format!("Download failed (HTTP {code}): {message}"),
            Self::Transfer { message, .. } => format!("Download failed: {message}"),
            Self::Finalization { message, .. } => {
                format!("Cannot move downloaded file into place: {message}")
            }
            Self::Cancelled => "Download was cancelled.".to_string(),
            Self::NotFound { .. } => "download request not found".to_string(),
            Self::Facility { message } => format!("Transfer service unavailable: {message}"),
        }
    }
}

/// Stable reason name for a well-known HTTP status code.
#[must_use]
pub const fn status_reason(status_code: u16) -> Option<&'static str> {
    match status_code {
        400 => Some("BAD_REQUEST"),
        401 => Some("UNAUTHORIZED"),
        403 => Some("FORBIDDEN"),
        404 => Some("NOT_FOUND"),
        416 => Some("CANNOT_RESUME"),
        500 => Some("INTERNAL_SERVER_ERROR"),
        _ => None,
    }
}

/// Finalization error kind reported when the destination volume is full.
pub const INSUFFICIENT_SPACE: &str = "InsufficientSpace";

/// Convenience result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;
