//! On-disk record of the facility's transfers.
//!
//! The journal is what makes the facility durable: it lives next to the
//! staged payloads and is rewritten on every status change, so a new process
//! can list and resume transfers a previous one started. Byte counts are not
//! written per chunk; on load they are recovered from the payload sizes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bgdl_core::ports::{NativeStatus, NativeTransferSnapshot, NativeTransferSpec};
use bgdl_core::transfer::{NativeHandleId, TransferTag};
use serde::{Deserialize, Serialize};

use crate::error::{HttpFacilityError, HttpResult};

const JOURNAL_VERSION: u32 = 1;

/// One journaled transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub handle: NativeHandleId,
    #[serde(default)]
    pub tag: Option<TransferTag>,
    pub source_uri: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub notification_title: Option<String>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    pub status: NativeStatus,
    #[serde(default)]
    pub bytes_received: u64,
    #[serde(default)]
    pub bytes_total: u64,
    pub payload_path: PathBuf,
}

impl JournalEntry {
    /// New pending entry for `spec`.
    pub fn pending(handle: NativeHandleId, spec: &NativeTransferSpec, payload_path: PathBuf) -> Self {
        Self {
            handle,
            tag: Some(spec.tag.clone()),
            source_uri: spec.source_uri.clone(),
            headers: spec.headers.clone(),
            session_id: spec.session_id.clone(),
            notification_title: spec.notification_title.clone(),
            delay_ms: spec
                .delay
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            status: NativeStatus::Pending,
            bytes_received: 0,
            bytes_total: 0,
            payload_path,
        }
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay_ms.map(Duration::from_millis)
    }

    pub fn to_snapshot(&self) -> NativeTransferSnapshot {
        NativeTransferSnapshot {
            handle: self.handle.clone(),
            tag: self.tag.clone(),
            source_uri: self.source_uri.clone(),
            status: self.status.clone(),
            bytes_received: self.bytes_received,
            bytes_total: self.bytes_total,
            payload_path: self.payload_path.clone(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JournalFile {
    version: u32,
    transfers: Vec<JournalEntry>,
}

/// In-memory journal backed by a JSON file.
///
/// Not synchronized; the facility keeps it behind a mutex.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    entries: Vec<JournalEntry>,
}

impl Journal {
    /// Load the journal at `path`, starting empty if the file is missing.
    ///
    /// Transfers that were running when the previous process stopped are
    /// marked paused; their byte counts come from the staged payloads.
    pub async fn load(path: impl Into<PathBuf>) -> HttpResult<Self> {
        let path = path.into();
        let mut entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<JournalFile>(&bytes)?.transfers,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(HttpFacilityError::io(&path, e)),
        };

        for entry in &mut entries {
            if !entry.status.is_in_flight() {
                continue;
            }
            if entry.status == NativeStatus::Running {
                entry.status = NativeStatus::Paused {
                    reason: "interrupted by process exit".to_string(),
                };
            }
            entry.bytes_received = tokio::fs::metadata(&entry.payload_path)
                .await
                .map_or(0, |meta| meta.len());
        }

        Ok(Self { path, entries })
    }

    /// Write the journal, replacing the file atomically.
    pub async fn save(&self) -> HttpResult<()> {
        let file = JournalFile {
            version: JOURNAL_VERSION,
            transfers: self.entries.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| HttpFacilityError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| HttpFacilityError::io(&self.path, e))
    }

    #[cfg(test)]
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, handle: &NativeHandleId) -> Option<&JournalEntry> {
        self.entries.iter().find(|e| &e.handle == handle)
    }

    pub fn get_mut(&mut self, handle: &NativeHandleId) -> Option<&mut JournalEntry> {
        self.entries.iter_mut().find(|e| &e.handle == handle)
    }

    pub fn find_by_tag(&self, tag: &TransferTag) -> Option<&JournalEntry> {
        self.entries.iter().find(|e| e.tag.as_ref() == Some(tag))
    }

    /// Whether some entry already stages into `payload_path`.
    pub fn payload_in_use(&self, payload_path: &Path) -> bool {
        self.entries.iter().any(|e| e.payload_path == payload_path)
    }

    pub fn insert(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    pub fn remove(&mut self, handle: &NativeHandleId) -> Option<JournalEntry> {
        let index = self.entries.iter().position(|e| &e.handle == handle)?;
        Some(self.entries.remove(index))
    }

    pub fn snapshots(&self) -> Vec<NativeTransferSnapshot> {
        self.entries.iter().map(JournalEntry::to_snapshot).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgdl_core::transfer::TransferRequest;

    fn spec(destination: &str) -> NativeTransferSpec {
        let request = TransferRequest::new("http://h/f", destination)
            .unwrap()
            .with_header("Authorization", "Bearer t")
            .with_download_delay(Duration::from_secs(2));
        NativeTransferSpec::from_request(&request)
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::load(dir.path().join("transfers.json")).await.unwrap();
        assert!(journal.snapshots().is_empty());
    }

    #[tokio::test]
    async fn entries_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transfers.json");

        let mut journal = Journal::load(&path).await.unwrap();
        let entry = JournalEntry::pending(
            NativeHandleId::new("h1"),
            &spec("/local/f"),
            dir.path().join("f.1"),
        );
        journal.insert(entry.clone());
        journal.save().await.unwrap();

        let reloaded = Journal::load(&path).await.unwrap();
        let tag = TransferTag::from_destination("/local/f").unwrap();
        assert_eq!(reloaded.find_by_tag(&tag), Some(&entry));
        assert_eq!(entry.delay(), Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn running_entries_reload_as_paused_with_payload_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transfers.json");
        let payload = dir.path().join("f.1");
        tokio::fs::write(&payload, vec![0u8; 400]).await.unwrap();

        let mut journal = Journal::load(&path).await.unwrap();
        let mut entry = JournalEntry::pending(NativeHandleId::new("h1"), &spec("/local/f"), payload);
        entry.status = NativeStatus::Running;
        entry.bytes_total = 1000;
        journal.insert(entry);
        journal.save().await.unwrap();

        let reloaded = Journal::load(&path).await.unwrap();
        let entry = reloaded.get(&NativeHandleId::new("h1")).unwrap();
        assert!(matches!(entry.status, NativeStatus::Paused { .. }));
        assert_eq!(entry.bytes_received, 400);
        assert_eq!(entry.bytes_total, 1000);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transfers.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let err = Journal::load(&path).await.unwrap_err();
        assert!(matches!(err, HttpFacilityError::Journal(_)));
    }

    #[test]
    fn remove_is_idempotent() {
        let mut journal = Journal::empty("/unused");
        journal.insert(JournalEntry::pending(
            NativeHandleId::new("h1"),
            &spec("/local/f"),
            PathBuf::from("/stage/f.1"),
        ));
        assert!(journal.remove(&NativeHandleId::new("h1")).is_some());
        assert!(journal.remove(&NativeHandleId::new("h1")).is_none());
    }
}
