//! Transfer domain types, events, errors, and the operation handle.
//!
//! This module contains pure data types for the transfer system. No
//! networking or file-system access is allowed here.
//!
//! # Structure
//!
//! - `types` - Identifiers and records (`TransferTag`, `TransferRequest`, `TransferRecord`)
//! - `events` - Caller notifications and native facility events
//! - `errors` - Error types for transfer operations
//! - `config` - The JSON configuration accepted at start
//! - `operation` - The caller-facing `TransferOperation` handle

pub mod config;
pub mod errors;
pub mod events;
pub mod operation;
pub mod types;

// Re-export commonly used types
pub use config::DownloadConfiguration;
pub use errors::{INSUFFICIENT_SPACE, TransferError, TransferResult, status_reason};
pub use events::{NativeEvent, TransferNotification, is_success_status};
pub use operation::{NotificationStream, TransferOperation, TransferState};
pub use types::{
    NativeHandleId, TransferRecord, TransferRequest, TransferStatus, TransferTag, UriMatcher,
};
