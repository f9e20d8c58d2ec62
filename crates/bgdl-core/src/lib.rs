//! Core domain types and port definitions for bgdl.
//!
//! `bgdl` is a background file-download manager: a transfer survives the
//! suspension or restart of its owning process, reports progress, can be
//! cancelled, and is de-duplicated by destination.
//!
//! - `transfer` - Pure domain types, errors, notifications and the operation handle
//! - `ports` - Traits the engine expects from infrastructure

pub mod ports;
pub mod transfer;

// Re-export commonly used types for convenience
pub use ports::{
    FileStorePort, NativeEventStream, NativeStatus, NativeTransferPort, NativeTransferSnapshot,
    NativeTransferSpec, TransferManagerConfig, TransferManagerPort,
};
pub use transfer::{
    DownloadConfiguration, NativeEvent, NativeHandleId, NotificationStream, TransferError,
    TransferNotification, TransferOperation, TransferRecord, TransferRequest, TransferResult,
    TransferState, TransferStatus, TransferTag, UriMatcher, is_success_status, status_reason,
};
