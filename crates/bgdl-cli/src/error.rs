//! CLI-specific error types and mappings.
//!
//! Maps [`TransferError`] to exit codes and user-facing messages.

use bgdl_core::transfer::TransferError;
use bgdl_http::HttpFacilityError;
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// The download itself failed.
    #[error("{0}")]
    Transfer(String),

    /// Argument parsing error.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// Missing or invalid download configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No transfer exists for the destination.
    #[error("{0}")]
    NotFound(String),

    /// IO error (file not found, permission denied, etc.).
    #[error("IO error: {0}")]
    Io(String),

    /// The transfer facility could not be reached or opened.
    #[error("Facility error: {0}")]
    Facility(String),

    /// Interrupted by the user.
    #[error("Download was cancelled.")]
    Cancelled,
}

impl CliError {
    /// Map error to appropriate exit code.
    ///
    /// Exit codes follow Unix conventions:
    /// - 0: Success
    /// - 1: General error
    /// - 2: Misuse of shell command (invalid arguments)
    /// - 64-78: Reserved for specific error categories (see sysexits.h)
    /// - 130: Terminated by Ctrl+C
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Transfer(_) => 1,
            Self::Arguments(_) => 2,  // EX_USAGE
            Self::NotFound(_) => 66,  // EX_NOINPUT
            Self::Facility(_) => 69,  // EX_UNAVAILABLE
            Self::Io(_) => 74,        // EX_IOERR
            Self::Config(_) => 78,    // EX_CONFIG
            Self::Cancelled => 130,
        }
    }
}

impl From<TransferError> for CliError {
    fn from(err: TransferError) -> Self {
        match &err {
            TransferError::Configuration { .. } => Self::Config(err.user_message()),
            TransferError::NotFound { tag } => Self::NotFound(format!("No download for '{tag}'")),
            TransferError::Finalization { .. } => Self::Io(err.user_message()),
            TransferError::Facility { .. } => Self::Facility(err.user_message()),
            TransferError::Cancelled => Self::Cancelled,
            TransferError::Transfer { .. } | TransferError::DuplicateTag { .. } => {
                Self::Transfer(err.user_message())
            }
        }
    }
}

impl From<HttpFacilityError> for CliError {
    fn from(err: HttpFacilityError) -> Self {
        Self::Facility(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
