//! HTTP(S) implementation of the native transfer port.
//!
//! Each transfer is journaled under the staging directory and fetched by a
//! background task started on the first subscription. A transfer that was
//! interrupted by a process exit is resumed with a `Range` request when the
//! staged payload still holds data.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bgdl_core::ports::{
    NativeEventStream, NativeStatus, NativeTransferPort, NativeTransferSnapshot,
    NativeTransferSpec,
};
use bgdl_core::transfer::{NativeEvent, NativeHandleId, TransferError, TransferTag};
use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::HttpFacilityConfig;
use crate::error::{HttpFacilityError, HttpResult};
use crate::journal::{Journal, JournalEntry};
use crate::throttle::ProgressThrottle;

/// A fetch task and the subscriber it reports to.
struct Run {
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<NativeEvent>,
    task: JoinHandle<()>,
}

struct Shared {
    config: HttpFacilityConfig,
    client: reqwest::Client,
    journal: Mutex<Journal>,
    // Whoever removes a run owns the terminal event for it.
    runs: Mutex<HashMap<NativeHandleId, Run>>,
}

/// Native transfer facility over HTTP(S).
///
/// Lock order: `runs` before `journal`.
#[derive(Clone)]
pub struct HttpTransferFacility {
    shared: Arc<Shared>,
}

impl HttpTransferFacility {
    /// Open the facility, creating the staging directory and loading the
    /// journal left by a previous process.
    pub async fn open(config: HttpFacilityConfig) -> HttpResult<Self> {
        tokio::fs::create_dir_all(config.staging_dir())
            .await
            .map_err(|e| HttpFacilityError::io(config.staging_dir(), e))?;

        let journal = Journal::load(config.journal_path()).await?;
        journal.save().await?;

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .build()?;

        tracing::debug!(
            target: "bgdl.http",
            journal = %journal.path().display(),
            transfers = journal.snapshots().len(),
            "Opened HTTP transfer facility"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                client,
                journal: Mutex::new(journal),
                runs: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn config(&self) -> &HttpFacilityConfig {
        &self.shared.config
    }
}

#[async_trait]
impl NativeTransferPort for HttpTransferFacility {
    async fn create_or_attach(
        &self,
        spec: &NativeTransferSpec,
    ) -> Result<NativeHandleId, TransferError> {
        let mut journal = self.shared.journal.lock().await;
        if let Some(existing) = journal.find_by_tag(&spec.tag) {
            return Ok(existing.handle.clone());
        }

        let handle = NativeHandleId::new(uuid::Uuid::new_v4().to_string());
        let payload = staging_path(&journal, self.shared.config.staging_dir(), spec.tag.file_name());
        journal.insert(JournalEntry::pending(handle.clone(), spec, payload));
        if let Err(e) = journal.save().await {
            journal.remove(&handle);
            return Err(e.into());
        }

        tracing::debug!(
            target: "bgdl.http",
            tag = %spec.tag,
            handle = %handle,
            "Created HTTP transfer"
        );
        Ok(handle)
    }

    async fn query_existing(
        &self,
        tag: &TransferTag,
    ) -> Result<Option<NativeTransferSnapshot>, TransferError> {
        let journal = self.shared.journal.lock().await;
        Ok(journal.find_by_tag(tag).map(JournalEntry::to_snapshot))
    }

    async fn list_transfers(&self) -> Result<Vec<NativeTransferSnapshot>, TransferError> {
        Ok(self.shared.journal.lock().await.snapshots())
    }

    async fn cancel(&self, handle: &NativeHandleId) -> Result<(), TransferError> {
        // The journal is updated under the runs lock so a settling task or a
        // new subscription observes either the old run or the cancellation.
        let (run, payload_path) = {
            let mut runs = self.shared.runs.lock().await;
            let run = runs.remove(handle);
            if let Some(run) = &run {
                run.cancel.cancel();
            }

            let mut journal = self.shared.journal.lock().await;
            let Some(entry) = journal.get_mut(handle) else {
                return Ok(());
            };
            if run.is_none() && !entry.status.is_in_flight() {
                // Already finished; nothing left to stop.
                return Ok(());
            }
            entry.status = NativeStatus::Cancelled;
            entry.bytes_received = 0;
            let payload_path = entry.payload_path.clone();
            journal.save().await?;
            (run, payload_path)
        };

        let subscriber = match run {
            Some(run) => {
                join_quietly(handle, run.task).await;
                Some(run.events)
            }
            None => None,
        };

        remove_payload(&payload_path).await?;
        tracing::debug!(target: "bgdl.http", handle = %handle, "Cancelled HTTP transfer");

        if let Some(events) = subscriber {
            let _ = events.send(NativeEvent::Cancelled);
        }
        Ok(())
    }

    async fn subscribe_progress(
        &self,
        handle: &NativeHandleId,
    ) -> Result<NativeEventStream, TransferError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut runs = self.shared.runs.lock().await;
        if let Some(run) = runs.get_mut(handle) {
            run.events = tx;
            return Ok(rx);
        }

        let entry = self
            .shared
            .journal
            .lock()
            .await
            .get(handle)
            .cloned()
            .ok_or_else(|| HttpFacilityError::UnknownHandle {
                handle: handle.to_string(),
            })?;

        if let Some(event) = terminal_event(&entry) {
            let _ = tx.send(event);
            return Ok(rx);
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&self.shared).drive(handle.clone(), cancel.clone()));
        runs.insert(
            handle.clone(),
            Run {
                cancel,
                events: tx,
                task,
            },
        );
        Ok(rx)
    }

    async fn release(&self, handle: &NativeHandleId) -> Result<(), TransferError> {
        let run = self.shared.runs.lock().await.remove(handle);
        if let Some(run) = run {
            run.cancel.cancel();
            join_quietly(handle, run.task).await;
        }

        let entry = {
            let mut journal = self.shared.journal.lock().await;
            let Some(entry) = journal.remove(handle) else {
                return Ok(());
            };
            journal.save().await?;
            entry
        };

        remove_payload(&entry.payload_path).await?;
        tracing::debug!(target: "bgdl.http", handle = %handle, "Released HTTP transfer");
        Ok(())
    }
}

impl Shared {
    async fn drive(self: Arc<Self>, handle: NativeHandleId, cancel: CancellationToken) {
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            outcome = self.fetch(&handle) => outcome,
        };
        self.settle(&handle, outcome).await;
    }

    /// Fetch the resource into the staged payload, returning the final
    /// response status.
    async fn fetch(&self, handle: &NativeHandleId) -> HttpResult<u16> {
        let entry = self
            .journal
            .lock()
            .await
            .get(handle)
            .cloned()
            .ok_or_else(|| HttpFacilityError::UnknownHandle {
                handle: handle.to_string(),
            })?;

        if let Some(delay) = entry.delay().filter(|_| entry.bytes_received == 0) {
            self.emit(
                handle,
                NativeEvent::Pending {
                    reason: format!("delayed by {}ms", delay.as_millis()),
                },
            )
            .await;
            tokio::time::sleep(delay).await;
        }

        self.set_status(handle, NativeStatus::Running).await?;

        let resume_from = if entry.bytes_received > 0 {
            payload_len(&entry.payload_path).await
        } else {
            0
        };
        if entry.bytes_total > 0 && resume_from >= entry.bytes_total {
            return Ok(StatusCode::OK.as_u16());
        }

        let mut request = self.client.get(&entry.source_uri);
        for (name, value) in &entry.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if resume_from > 0 {
            request = request.header(RANGE, format!("bytes={resume_from}-"));
        }

        let response = request.send().await?;
        let status = response.status();

        let offset = match status {
            StatusCode::PARTIAL_CONTENT if resume_from > 0 => resume_from,
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => 0,
            other => {
                tracing::debug!(
                    target: "bgdl.http",
                    handle = %handle,
                    status = other.as_u16(),
                    "Server refused transfer"
                );
                return Ok(other.as_u16());
            }
        };
        if resume_from > 0 {
            tracing::debug!(
                target: "bgdl.http",
                handle = %handle,
                resume_from,
                resumed = offset > 0,
                "Resuming HTTP transfer"
            );
        }

        let path = &entry.payload_path;
        let mut file = if offset > 0 {
            tokio::fs::OpenOptions::new().append(true).open(path).await
        } else {
            tokio::fs::File::create(path).await
        }
        .map_err(|e| HttpFacilityError::io(path, e))?;

        let bytes_total = response.content_length().map_or(0, |len| len + offset);
        let mut received = offset;
        let mut throttle = ProgressThrottle::new(self.config.progress_interval);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| HttpFacilityError::io(path, e))?;
            received += chunk.len() as u64;

            self.record_progress(handle, received, bytes_total).await;
            if throttle.should_emit(received, bytes_total) {
                self.emit(
                    handle,
                    NativeEvent::Progress {
                        bytes_received: received,
                        bytes_total,
                    },
                )
                .await;
            }
        }
        file.flush().await.map_err(|e| HttpFacilityError::io(path, e))?;

        Ok(status.as_u16())
    }

    async fn settle(&self, handle: &NativeHandleId, outcome: HttpResult<u16>) {
        let mut runs = self.runs.lock().await;
        let Some(run) = runs.remove(handle) else {
            return;
        };

        let status = match outcome {
            Ok(status_code) => NativeStatus::Completed { status_code },
            Err(err) => NativeStatus::Failed {
                message: err.to_string(),
            },
        };

        let event = {
            let mut journal = self.journal.lock().await;
            let Some(entry) = journal.get_mut(handle) else {
                return;
            };
            entry.status = status;
            let event = terminal_event(entry);
            if let Err(e) = journal.save().await {
                tracing::warn!(target: "bgdl.http", handle = %handle, error = %e, "Failed to save journal");
            }
            event
        };
        drop(runs);

        let Some(event) = event else {
            return;
        };
        tracing::debug!(target: "bgdl.http", handle = %handle, event = ?event, "HTTP transfer settled");
        let _ = run.events.send(event);
    }

    async fn set_status(&self, handle: &NativeHandleId, status: NativeStatus) -> HttpResult<()> {
        let mut journal = self.journal.lock().await;
        let entry = journal
            .get_mut(handle)
            .ok_or_else(|| HttpFacilityError::UnknownHandle {
                handle: handle.to_string(),
            })?;
        entry.status = status;
        journal.save().await
    }

    async fn record_progress(&self, handle: &NativeHandleId, bytes_received: u64, bytes_total: u64) {
        if let Some(entry) = self.journal.lock().await.get_mut(handle) {
            entry.bytes_received = bytes_received;
            entry.bytes_total = bytes_total;
        }
    }

    async fn emit(&self, handle: &NativeHandleId, event: NativeEvent) {
        if let Some(run) = self.runs.lock().await.get(handle) {
            let _ = run.events.send(event);
        }
    }
}

/// Event replayed to a subscriber of an already finished transfer.
fn terminal_event(entry: &JournalEntry) -> Option<NativeEvent> {
    match &entry.status {
        NativeStatus::Completed { status_code } => Some(NativeEvent::Completed {
            status_code: *status_code,
            payload_path: entry.payload_path.clone(),
        }),
        NativeStatus::Failed { message } => Some(NativeEvent::Failed {
            status_code: None,
            message: message.clone(),
        }),
        NativeStatus::Cancelled => Some(NativeEvent::Cancelled),
        NativeStatus::Pending | NativeStatus::Running | NativeStatus::Paused { .. } => None,
    }
}

/// `<staging_dir>/<file_name>.<unix millis>`, unique within the journal.
fn staging_path(journal: &Journal, staging_dir: &Path, file_name: &str) -> PathBuf {
    let mut millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis());
    loop {
        let candidate = staging_dir.join(format!("{file_name}.{millis}"));
        if !journal.payload_in_use(&candidate) {
            return candidate;
        }
        millis += 1;
    }
}

async fn payload_len(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map_or(0, |meta| meta.len())
}

async fn remove_payload(path: &Path) -> HttpResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HttpFacilityError::io(path, e)),
    }
}

async fn join_quietly(handle: &NativeHandleId, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        tracing::warn!(target: "bgdl.http", handle = %handle, error = %e, "Transfer task ended abnormally");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgdl_core::transfer::TransferRequest;

    #[test]
    fn staging_names_skip_payloads_in_use() {
        let mut journal = Journal::empty("/stage/transfers.json");
        let staging = Path::new("/stage");
        let first = staging_path(&journal, staging, "f.bin");
        assert!(first.file_name().unwrap().to_str().unwrap().starts_with("f.bin."));

        let request = TransferRequest::new("http://h/f", "/local/f.bin").unwrap();
        journal.insert(JournalEntry::pending(
            NativeHandleId::new("h1"),
            &NativeTransferSpec::from_request(&request),
            first.clone(),
        ));
        let second = staging_path(&journal, staging, "f.bin");
        assert_ne!(first, second);
    }

    #[test]
    fn finished_entries_replay_their_outcome() {
        let request = TransferRequest::new("http://h/f", "/local/f").unwrap();
        let mut entry = JournalEntry::pending(
            NativeHandleId::new("h1"),
            &NativeTransferSpec::from_request(&request),
            PathBuf::from("/stage/f.1"),
        );
        assert_eq!(terminal_event(&entry), None);

        entry.status = NativeStatus::Completed { status_code: 200 };
        assert_eq!(
            terminal_event(&entry),
            Some(NativeEvent::Completed {
                status_code: 200,
                payload_path: PathBuf::from("/stage/f.1"),
            })
        );

        entry.status = NativeStatus::Cancelled;
        assert_eq!(terminal_event(&entry), Some(NativeEvent::Cancelled));
    }
}
