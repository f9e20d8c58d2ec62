//! Payload finalization.
//!
//! Once the facility reports a successful transfer, the payload sits in a
//! transfer-internal location. Finalization moves it to the caller's
//! destination, replacing whatever was there.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use bgdl_core::ports::FileStorePort;
use bgdl_core::transfer::TransferError;

/// Suffix of the sibling file a cross-volume copy is written to.
const PART_SUFFIX: &str = ".bgdl-part";

/// Moves a received payload into its destination.
///
/// 1. Creates the destination's parent directory if missing
/// 2. Renames the payload over the destination, replacing any existing file
/// 3. If the rename fails (e.g. across file systems), checks free space,
///    copies the payload to a sibling `.bgdl-part` file, renames that over
///    the destination and removes the staged payload
///
/// The destination only ever changes through a rename, so a failed copy
/// leaves any previous file intact. Nothing is retried beyond the copy
/// fallback.
pub struct FinalizationStep<'a> {
    store: &'a dyn FileStorePort,
}

impl<'a> FinalizationStep<'a> {
    /// Create a finalization step over `store`.
    pub const fn new(store: &'a dyn FileStorePort) -> Self {
        Self { store }
    }

    /// Move `payload` to `destination`.
    pub async fn run(&self, payload: &Path, destination: &Path) -> Result<(), TransferError> {
        if payload == destination {
            return Ok(());
        }

        let parent = destination.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            self.store
                .create_dir_all(parent)
                .await
                .map_err(|e| TransferError::from_io_error(&e))?;
        }

        let Err(rename_err) = self.store.rename(payload, destination).await else {
            return Ok(());
        };

        tracing::debug!(
            target: "bgdl.download",
            payload = %payload.display(),
            destination = %destination.display(),
            error = %rename_err,
            "Rename failed, falling back to copy"
        );

        self.copy_into_place(payload, destination, parent.unwrap_or_else(|| Path::new(".")))
            .await?;

        if let Err(e) = self.store.remove_file(payload).await {
            tracing::warn!(
                target: "bgdl.download",
                payload = %payload.display(),
                error = %e,
                "Failed to remove staged payload after copy"
            );
        }
        Ok(())
    }

    async fn copy_into_place(
        &self,
        payload: &Path,
        destination: &Path,
        dir: &Path,
    ) -> Result<(), TransferError> {
        let needed = self
            .store
            .file_len(payload)
            .await
            .map_err(|e| TransferError::from_io_error(&e))?;
        match self.store.available_space(dir).await {
            Ok(available) if available < needed => {
                return Err(TransferError::insufficient_space(needed, available));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(
                    target: "bgdl.download",
                    dir = %dir.display(),
                    error = %e,
                    "Free space unknown, copying anyway"
                );
            }
        }

        let part = part_path(destination);
        let copied = match self.store.copy(payload, &part).await {
            Ok(_) => self.store.rename(&part, destination).await,
            Err(e) => Err(e),
        };
        if let Err(e) = copied {
            if let Err(cleanup) = self.store.remove_file(&part).await {
                tracing::debug!(
                    target: "bgdl.download",
                    part = %part.display(),
                    error = %cleanup,
                    "Failed to remove partial copy"
                );
            }
            return Err(TransferError::from_io_error(&e));
        }
        Ok(())
    }
}

fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(PART_SUFFIX);
    destination.with_file_name(name)
}
