//! Transfer registry.
//!
//! A pure in-memory table of every transfer record the manager knows about,
//! keyed by destination tag. The native facility is the durable store; this
//! table is rebuilt by reconciliation after a restart.
//!
//! # Design
//!
//! - Pure synchronous state (no async, no IO, no tracing)
//! - At most one live (`Pending`/`Active`) record per tag
//! - Insertion order is preserved so listings are stable
//!
//! The caller (`TransferManagerImpl`) is responsible for synchronization.

use indexmap::IndexMap;

use bgdl_core::transfer::{TransferError, TransferRecord, TransferStatus, TransferTag};

/// In-memory table of transfer records.
#[derive(Debug, Default)]
pub struct TransferRegistry {
    records: IndexMap<TransferTag, TransferRecord>,
}

impl TransferRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the record for `tag`.
    pub fn find_by_tag(&self, tag: &TransferTag) -> Option<&TransferRecord> {
        self.records.get(tag)
    }

    /// Insert a record.
    ///
    /// Fails with `DuplicateTag` if a live record already holds the tag. A
    /// terminal record for the same tag is replaced.
    pub fn insert(&mut self, record: TransferRecord) -> Result<(), TransferError> {
        if let Some(existing) = self.records.get(&record.tag) {
            if existing.status.is_live() {
                return Err(TransferError::duplicate_tag(record.tag.as_str()));
            }
        }
        self.records.insert(record.tag.clone(), record);
        Ok(())
    }

    /// Remove the record for `tag`. Removing an absent tag is a no-op.
    pub fn remove(&mut self, tag: &TransferTag) -> Option<TransferRecord> {
        self.records.shift_remove(tag)
    }

    /// Snapshot of all records, in insertion order.
    pub fn list_all(&self) -> Vec<TransferRecord> {
        self.records.values().cloned().collect()
    }

    /// Apply a progress report to the record for `tag`.
    ///
    /// Returns `false` if there is no record or the report was stale.
    pub fn record_progress(
        &mut self,
        tag: &TransferTag,
        bytes_received: u64,
        bytes_total: u64,
    ) -> bool {
        self.records
            .get_mut(tag)
            .is_some_and(|record| record.apply_progress(bytes_received, bytes_total))
    }

    /// Set the status of the record for `tag`.
    pub fn set_status(&mut self, tag: &TransferTag, status: TransferStatus) {
        if let Some(record) = self.records.get_mut(tag) {
            record.status = status;
        }
    }

    /// Mark the record for `tag` as failed.
    pub fn set_failed(&mut self, tag: &TransferTag, error: &TransferError) {
        if let Some(record) = self.records.get_mut(tag) {
            record.fail(error);
        }
    }

    /// Number of live records.
    pub fn live_len(&self) -> usize {
        self.records
            .values()
            .filter(|record| record.status.is_live())
            .count()
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
