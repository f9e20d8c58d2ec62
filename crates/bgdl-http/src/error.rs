//! Internal error types for the HTTP facility.
//!
//! These errors stay inside `bgdl-http` and are mapped to
//! [`TransferError`] at the port boundary.

use std::path::PathBuf;

use bgdl_core::transfer::TransferError;
use thiserror::Error;

/// Result type alias for facility operations.
pub type HttpResult<T> = Result<T, HttpFacilityError>;

/// Errors raised by the HTTP facility.
#[derive(Debug, Error)]
pub enum HttpFacilityError {
    /// Network or HTTP client error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// File-system operation on the staging area failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path the operation touched.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The journal could not be encoded or decoded.
    #[error("Corrupt transfer journal: {0}")]
    Journal(#[from] serde_json::Error),

    /// No transfer with this handle is journaled.
    #[error("Unknown transfer handle '{handle}'")]
    UnknownHandle {
        /// The handle that was not found.
        handle: String,
    },
}

impl HttpFacilityError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<HttpFacilityError> for TransferError {
    fn from(err: HttpFacilityError) -> Self {
        Self::facility(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_the_path() {
        let err = HttpFacilityError::io(
            "/stage/f.1",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/stage/f.1"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn maps_to_facility_error() {
        let err: TransferError = HttpFacilityError::UnknownHandle {
            handle: "h1".into(),
        }
        .into();
        assert!(matches!(err, TransferError::Facility { message } if message.contains("h1")));
    }
}
