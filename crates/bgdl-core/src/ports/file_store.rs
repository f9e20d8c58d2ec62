//! File-system primitives used by finalization.
//!
//! Kept behind a port so finalization can be exercised against failures the
//! real file system rarely produces on demand.

use std::io;
use std::path::Path;

use async_trait::async_trait;

/// Port for the file operations finalization needs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStorePort: Send + Sync {
    /// Create `path` and all missing parents.
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Delete the file at `path`.
    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Atomically move `from` to `to`.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Copy `from` to `to`, returning the number of bytes copied.
    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    /// Size in bytes of the file at `path`.
    async fn file_len(&self, path: &Path) -> io::Result<u64>;

    /// Bytes available to this process on the volume holding `dir`.
    async fn available_space(&self, dir: &Path) -> io::Result<u64>;
}
