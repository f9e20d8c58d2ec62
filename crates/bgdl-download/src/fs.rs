//! Default file store backed by `tokio::fs`.

use std::io;
use std::path::Path;

use async_trait::async_trait;

use bgdl_core::ports::FileStorePort;

/// `FileStorePort` over the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileStore;

impl TokioFileStore {
    /// Create a file store.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileStorePort for TokioFileStore {
    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        tokio::fs::copy(from, to).await
    }

    async fn file_len(&self, path: &Path) -> io::Result<u64> {
        Ok(tokio::fs::metadata(path).await?.len())
    }

    async fn available_space(&self, dir: &Path) -> io::Result<u64> {
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || fs2::available_space(dir))
            .await
            .map_err(io::Error::other)?
    }
}
