//! Scripted in-memory transfer facility for engine tests.
//!
//! Resources are registered per URI as a list of chunks. A transfer plays its
//! resource once subscribed, writing each chunk to a staging file and emitting
//! progress. Chunks can be held back with a gate so tests control timing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};

use bgdl_core::ports::{
    NativeEventStream, NativeStatus, NativeTransferPort, NativeTransferSnapshot,
    NativeTransferSpec,
};
use bgdl_core::transfer::{NativeEvent, NativeHandleId, TransferError, TransferTag};

/// How the facility answers a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelMode {
    /// Stop immediately and confirm with `NativeEvent::Cancelled`.
    Confirm,
    /// Ignore the request and keep transferring.
    Ignore,
}

/// What a URI serves.
#[derive(Debug, Clone)]
pub struct Resource {
    pub chunks: Vec<Vec<u8>>,
    pub status_code: u16,
    pub held: bool,
}

impl Resource {
    pub fn ok(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            status_code: 200,
            held: false,
        }
    }

    pub fn status(status_code: u16) -> Self {
        Self {
            chunks: vec![],
            status_code,
            held: false,
        }
    }

    /// Chunks wait for `ScriptedFacility::allow`.
    pub fn held(mut self) -> Self {
        self.held = true;
        self
    }

    fn total(&self) -> u64 {
        self.chunks.iter().map(|c| c.len() as u64).sum()
    }
}

struct Transfer {
    tag: TransferTag,
    source_uri: String,
    resource: Resource,
    next_chunk: usize,
    received: Vec<u8>,
    status: NativeStatus,
    payload: PathBuf,
    events: Option<mpsc::UnboundedSender<NativeEvent>>,
    gate: Arc<Semaphore>,
    playing: bool,
}

impl Transfer {
    fn snapshot(&self, handle: &str) -> NativeTransferSnapshot {
        NativeTransferSnapshot {
            handle: NativeHandleId::new(handle),
            tag: Some(self.tag.clone()),
            source_uri: self.source_uri.clone(),
            status: self.status.clone(),
            bytes_received: self.received.len() as u64,
            bytes_total: self.resource.total(),
            payload_path: self.payload.clone(),
        }
    }

    fn send(&self, event: NativeEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

#[derive(Default)]
struct State {
    resources: HashMap<String, Resource>,
    transfers: HashMap<String, Transfer>,
    next_id: u64,
}

struct Shared {
    staging: PathBuf,
    cancel_mode: CancelMode,
    state: Mutex<State>,
    created: AtomicUsize,
    subscribes: AtomicUsize,
    cancels: AtomicUsize,
    releases: AtomicUsize,
    chunks_served: AtomicUsize,
    last_spec: Mutex<Option<NativeTransferSpec>>,
}

/// In-memory `NativeTransferPort`.
#[derive(Clone)]
pub struct ScriptedFacility {
    shared: Arc<Shared>,
}

impl ScriptedFacility {
    pub fn new(staging: &Path) -> Self {
        Self::with_cancel_mode(staging, CancelMode::Confirm)
    }

    pub fn with_cancel_mode(staging: &Path, cancel_mode: CancelMode) -> Self {
        Self {
            shared: Arc::new(Shared {
                staging: staging.to_path_buf(),
                cancel_mode,
                state: Mutex::new(State::default()),
                created: AtomicUsize::new(0),
                subscribes: AtomicUsize::new(0),
                cancels: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
                chunks_served: AtomicUsize::new(0),
                last_spec: Mutex::new(None),
            }),
        }
    }

    /// Serve `resource` at `uri`.
    pub fn serve(&self, uri: &str, resource: Resource) {
        self.shared
            .state
            .lock()
            .unwrap()
            .resources
            .insert(uri.to_string(), resource);
    }

    /// Let `n` more chunks of the transfer tagged `destination` through.
    pub fn allow(&self, destination: &Path, n: usize) {
        let tag = tag_of(destination);
        let state = self.shared.state.lock().unwrap();
        for transfer in state.transfers.values() {
            if transfer.tag == tag {
                transfer.gate.add_permits(n);
            }
        }
    }

    /// Leave a finished transfer behind, as a previous process would.
    pub fn seed_completed(&self, destination: &Path, uri: &str, body: &[u8]) -> PathBuf {
        let handle = self.insert_transfer(destination, uri, Resource::ok(vec![body.to_vec()]));
        let mut state = self.shared.state.lock().unwrap();
        let transfer = state.transfers.get_mut(&handle).unwrap();
        transfer.next_chunk = 1;
        transfer.received = body.to_vec();
        transfer.status = NativeStatus::Completed { status_code: 200 };
        std::fs::write(&transfer.payload, body).unwrap();
        transfer.payload.clone()
    }

    /// Leave an interrupted transfer behind with its first chunk received.
    pub fn seed_interrupted(&self, destination: &Path, uri: &str, chunks: Vec<Vec<u8>>) {
        let handle = self.insert_transfer(destination, uri, Resource::ok(chunks));
        let mut state = self.shared.state.lock().unwrap();
        let transfer = state.transfers.get_mut(&handle).unwrap();
        let first = transfer.resource.chunks[0].clone();
        std::fs::write(&transfer.payload, &first).unwrap();
        transfer.received = first;
        transfer.next_chunk = 1;
        transfer.status = NativeStatus::Paused {
            reason: "process exited".into(),
        };
    }

    /// Leave a cancelled transfer behind.
    pub fn seed_cancelled(&self, destination: &Path, uri: &str) {
        let handle = self.insert_transfer(destination, uri, Resource::ok(vec![]));
        let mut state = self.shared.state.lock().unwrap();
        state.transfers.get_mut(&handle).unwrap().status = NativeStatus::Cancelled;
    }

    pub fn created(&self) -> usize {
        self.shared.created.load(Ordering::SeqCst)
    }

    pub fn subscribes(&self) -> usize {
        self.shared.subscribes.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.shared.cancels.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.shared.releases.load(Ordering::SeqCst)
    }

    pub fn chunks_served(&self) -> usize {
        self.shared.chunks_served.load(Ordering::SeqCst)
    }

    /// The spec of the most recently created transfer.
    pub fn last_spec(&self) -> Option<NativeTransferSpec> {
        self.shared.last_spec.lock().unwrap().clone()
    }

    /// Number of transfers the facility still tracks.
    pub fn tracked(&self) -> usize {
        self.shared.state.lock().unwrap().transfers.len()
    }

    fn insert_transfer(&self, destination: &Path, uri: &str, resource: Resource) -> String {
        let tag = tag_of(destination);
        let mut state = self.shared.state.lock().unwrap();
        state.next_id += 1;
        let handle = format!("h{}", state.next_id);
        let payload = self
            .shared
            .staging
            .join(format!("{}.{}", tag.file_name(), state.next_id));
        let permits = if resource.held {
            0
        } else {
            resource.chunks.len()
        };

        state.transfers.insert(
            handle.clone(),
            Transfer {
                tag,
                source_uri: uri.to_string(),
                resource,
                next_chunk: 0,
                received: Vec::new(),
                status: NativeStatus::Pending,
                payload,
                events: None,
                gate: Arc::new(Semaphore::new(permits)),
                playing: false,
            },
        );
        handle
    }
}

fn tag_of(destination: &Path) -> TransferTag {
    TransferTag::from_destination(&destination.to_string_lossy()).unwrap()
}

enum Step {
    Chunk(Arc<Semaphore>),
    Finish,
    Stop,
}

/// Play the remaining chunks of `handle`, then report the terminal status.
async fn play(shared: Arc<Shared>, handle: String) {
    loop {
        let step = {
            let state = shared.state.lock().unwrap();
            match state.transfers.get(&handle) {
                Some(t) if !t.status.is_in_flight() => Step::Stop,
                Some(t) if t.next_chunk < t.resource.chunks.len() => Step::Chunk(Arc::clone(&t.gate)),
                Some(_) => Step::Finish,
                None => Step::Stop,
            }
        };

        match step {
            Step::Stop => return,
            Step::Chunk(gate) => {
                let Ok(permit) = gate.acquire().await else {
                    return;
                };
                permit.forget();

                let (payload, body) = {
                    let mut state = shared.state.lock().unwrap();
                    let Some(t) = state.transfers.get_mut(&handle) else {
                        return;
                    };
                    if !t.status.is_in_flight() {
                        return;
                    }
                    let chunk = t.resource.chunks[t.next_chunk].clone();
                    t.next_chunk += 1;
                    t.received.extend_from_slice(&chunk);
                    t.status = NativeStatus::Running;
                    (t.payload.clone(), t.received.clone())
                };

                tokio::fs::write(&payload, &body).await.unwrap();
                shared.chunks_served.fetch_add(1, Ordering::SeqCst);

                let state = shared.state.lock().unwrap();
                if let Some(t) = state.transfers.get(&handle) {
                    if t.status.is_in_flight() {
                        t.send(NativeEvent::Progress {
                            bytes_received: t.received.len() as u64,
                            bytes_total: t.resource.total(),
                        });
                    }
                }
            }
            Step::Finish => {
                let mut state = shared.state.lock().unwrap();
                let Some(t) = state.transfers.get_mut(&handle) else {
                    return;
                };
                let status_code = t.resource.status_code;
                t.status = NativeStatus::Completed { status_code };
                t.send(NativeEvent::Completed {
                    status_code,
                    payload_path: t.payload.clone(),
                });
                return;
            }
        }
    }
}

#[async_trait]
impl NativeTransferPort for ScriptedFacility {
    async fn create_or_attach(
        &self,
        spec: &NativeTransferSpec,
    ) -> Result<NativeHandleId, TransferError> {
        {
            let state = self.shared.state.lock().unwrap();
            if let Some((handle, _)) = state
                .transfers
                .iter()
                .find(|(_, t)| t.tag == spec.tag && t.status.is_in_flight())
            {
                return Ok(NativeHandleId::new(handle.clone()));
            }
        }

        self.shared.created.fetch_add(1, Ordering::SeqCst);
        *self.shared.last_spec.lock().unwrap() = Some(spec.clone());
        let resource = self
            .shared
            .state
            .lock()
            .unwrap()
            .resources
            .get(&spec.source_uri)
            .cloned()
            .unwrap_or_else(|| Resource::status(404));
        let handle = self.insert_transfer(&spec.tag.to_path(), &spec.source_uri, resource);
        Ok(NativeHandleId::new(handle))
    }

    async fn query_existing(
        &self,
        tag: &TransferTag,
    ) -> Result<Option<NativeTransferSnapshot>, TransferError> {
        let state = self.shared.state.lock().unwrap();
        Ok(state
            .transfers
            .iter()
            .find(|(_, t)| &t.tag == tag)
            .map(|(handle, t)| t.snapshot(handle)))
    }

    async fn list_transfers(&self) -> Result<Vec<NativeTransferSnapshot>, TransferError> {
        let state = self.shared.state.lock().unwrap();
        let mut all: Vec<_> = state
            .transfers
            .iter()
            .map(|(handle, t)| t.snapshot(handle))
            .collect();
        all.sort_by(|a, b| a.handle.as_str().cmp(b.handle.as_str()));
        Ok(all)
    }

    async fn cancel(&self, handle: &NativeHandleId) -> Result<(), TransferError> {
        self.shared.cancels.fetch_add(1, Ordering::SeqCst);
        if self.shared.cancel_mode == CancelMode::Ignore {
            return Ok(());
        }

        let mut state = self.shared.state.lock().unwrap();
        if let Some(t) = state.transfers.get_mut(handle.as_str()) {
            if t.status.is_in_flight() {
                t.status = NativeStatus::Cancelled;
                t.gate.close();
                let _ = std::fs::remove_file(&t.payload);
                t.send(NativeEvent::Cancelled);
            }
        }
        Ok(())
    }

    async fn subscribe_progress(
        &self,
        handle: &NativeHandleId,
    ) -> Result<NativeEventStream, TransferError> {
        self.shared.subscribes.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();

        let start = {
            let mut state = self.shared.state.lock().unwrap();
            let t = state
                .transfers
                .get_mut(handle.as_str())
                .ok_or_else(|| TransferError::facility(format!("unknown handle {handle}")))?;

            match &t.status {
                NativeStatus::Completed { status_code } => {
                    let _ = tx.send(NativeEvent::Completed {
                        status_code: *status_code,
                        payload_path: t.payload.clone(),
                    });
                }
                NativeStatus::Cancelled => {
                    let _ = tx.send(NativeEvent::Cancelled);
                }
                _ => {}
            }
            t.events = Some(tx);
            let start = !t.playing && t.status.is_in_flight();
            t.playing = true;
            start
        };

        if start {
            tokio::spawn(play(Arc::clone(&self.shared), handle.as_str().to_string()));
        }
        Ok(rx)
    }

    async fn release(&self, handle: &NativeHandleId) -> Result<(), TransferError> {
        self.shared.releases.fetch_add(1, Ordering::SeqCst);
        let removed = self
            .shared
            .state
            .lock()
            .unwrap()
            .transfers
            .remove(handle.as_str());
        if let Some(t) = removed {
            t.gate.close();
            let _ = tokio::fs::remove_file(&t.payload).await;
        }
        Ok(())
    }
}
