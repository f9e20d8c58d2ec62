//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the core domain expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No HTTP client types in any signature
//! - No cancellation-token or lock types leak through
//! - Facilities are addressed only through `NativeTransferPort`

pub mod file_store;
pub mod native_transfer;
pub mod transfer_manager;

// Re-export port traits for convenience
pub use file_store::FileStorePort;
pub use native_transfer::{
    NativeEventStream, NativeStatus, NativeTransferPort, NativeTransferSnapshot,
    NativeTransferSpec,
};
pub use transfer_manager::{TransferManagerConfig, TransferManagerPort};
