//! Transfer engine for bgdl.
//!
//! This crate implements `TransferManagerPort` on top of any
//! `NativeTransferPort`. It owns the in-memory registry, matches requests
//! against the facility before creating anything, turns native byte counts
//! into percentages and moves finished payloads into place.
//!
//! - `registry` - In-memory table of transfer records
//! - `progress` - Byte counts to monotonic percentages
//! - `reconciler` - Matching requests and leftovers against the facility
//! - `finalize` - Moving payloads to their destination
//! - `manager` - The `TransferManagerPort` implementation

// Re-export core types for convenience
pub use bgdl_core::ports::{
    FileStorePort, NativeTransferPort, TransferManagerConfig, TransferManagerPort,
};
pub use bgdl_core::transfer::{
    DownloadConfiguration, TransferError, TransferNotification, TransferOperation,
    TransferRecord, TransferRequest, TransferStatus, TransferTag,
};

// Internal modules
pub(crate) mod progress;
pub(crate) mod registry;

mod finalize;
mod fs;
mod manager;
mod reconciler;

pub use finalize::FinalizationStep;
pub use fs::TokioFileStore;
pub use progress::ProgressBridge;
pub use reconciler::{Reconciler, Reconciliation};
pub use registry::TransferRegistry;

pub use manager::{TransferManagerDeps, TransferManagerImpl, build_transfer_manager};
