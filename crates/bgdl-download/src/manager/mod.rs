//! Transfer manager implementation.
//!
//! This module provides the concrete implementation of `TransferManagerPort`:
//! per-tag serialization of `start`/`stop`, reconciliation against the native
//! facility, one driver task per transfer, and lease-verified terminal
//! commits.
//!
//! # Architecture
//!
//! - **Manager**: Resolves requests, registers records, spawns drivers
//! - **Driver**: Follows native events, writes progress to the registry and hub
//! - **Hub**: Fans notifications out to every attached operation, latching the
//!   terminal one
//!
//! # Concurrency Model
//!
//! - Tag locks serialize everything touching one destination
//! - Lease tokens prevent stale terminal commits
//! - Lock order: tag → active → registry (consistent everywhere)

mod driver;
mod hub;
mod locks;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use bgdl_core::ports::{
    FileStorePort, NativeStatus, NativeTransferPort, NativeTransferSpec, TransferManagerConfig,
    TransferManagerPort,
};
use bgdl_core::transfer::{
    NativeHandleId, TransferError, TransferOperation, TransferRecord, TransferRequest,
    TransferState, TransferStatus, TransferTag,
};

use crate::reconciler::{Reconciler, Reconciliation};
use crate::registry::TransferRegistry;

use driver::{DriverDeps, DriverJob, DriverStart};
use hub::NotificationHub;
use locks::TagLocks;

/// Lease ID for tracking live transfers.
///
/// Used to prevent stale terminal commits when a transfer is replaced while
/// its driver is still unwinding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LeaseId(u64);

/// State for a transfer with a running driver.
struct ActiveTransfer {
    /// Unique lease for this driver.
    lease: LeaseId,
    /// Native handle being followed.
    handle: NativeHandleId,
    /// Cancellation token shared by every attached operation.
    cancel: CancellationToken,
    /// Notification fan-out.
    hub: Arc<NotificationHub>,
}

/// Dependencies for creating a transfer manager.
pub struct TransferManagerDeps<N, F>
where
    N: NativeTransferPort + 'static,
    F: FileStorePort + 'static,
{
    /// The platform's persistent transfer facility.
    pub native: Arc<N>,
    /// File-system primitives used by finalization.
    pub file_store: Arc<F>,
    /// Configuration for the manager.
    pub config: TransferManagerConfig,
}

/// Build a transfer manager from its dependencies.
///
/// Returns an implementation of `TransferManagerPort` that can be stored as
/// `Arc<dyn TransferManagerPort>` in adapters.
pub fn build_transfer_manager<N, F>(deps: TransferManagerDeps<N, F>) -> TransferManagerImpl
where
    N: NativeTransferPort + 'static,
    F: FileStorePort + 'static,
{
    TransferManagerImpl::new(deps.native, deps.file_store, deps.config)
}

/// Concrete implementation of the transfer manager.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct TransferManagerImpl {
    inner: Arc<Inner>,
}

struct Inner {
    /// Native transfer facility.
    native: Arc<dyn NativeTransferPort>,
    /// Reconciler over the same facility.
    reconciler: Reconciler,
    /// Shared driver dependencies.
    driver_deps: DriverDeps,
    /// Known records, shared with drivers.
    registry: Arc<Mutex<TransferRegistry>>,
    /// Transfers with a running driver, keyed by tag.
    active: Mutex<HashMap<TransferTag, ActiveTransfer>>,
    /// Per-tag serialization.
    locks: TagLocks,
    /// Counter for generating lease IDs.
    lease_counter: AtomicU64,
}

impl TransferManagerImpl {
    /// Create a new transfer manager.
    fn new<N, F>(native: Arc<N>, file_store: Arc<F>, config: TransferManagerConfig) -> Self
    where
        N: NativeTransferPort + 'static,
        F: FileStorePort + 'static,
    {
        let native: Arc<dyn NativeTransferPort> = native;
        let registry = Arc::new(Mutex::new(TransferRegistry::new()));

        Self {
            inner: Arc::new(Inner {
                reconciler: Reconciler::new(Arc::clone(&native)),
                driver_deps: DriverDeps {
                    native: Arc::clone(&native),
                    file_store,
                    registry: Arc::clone(&registry),
                    config,
                },
                native,
                registry,
                active: Mutex::new(HashMap::new()),
                locks: TagLocks::new(),
                lease_counter: AtomicU64::new(0),
            }),
        }
    }

    /// Number of transfers with a running driver.
    pub async fn active_count(&self) -> usize {
        self.inner.active.lock().await.len()
    }
}

impl Inner {
    /// Join the running transfer for `tag`, if any.
    async fn join_active(&self, tag: &TransferTag) -> Option<TransferOperation> {
        let active = self.active.lock().await;
        let transfer = active.get(tag)?;
        let (rx, state) = transfer.hub.subscribe().await;
        let cancel = transfer.cancel.clone();

        tracing::info!(
            target: "bgdl.download",
            tag = %tag,
            handle = %transfer.handle,
            "Joined running transfer"
        );
        Some(TransferOperation::new(tag.clone(), true, rx, state, move || {
            cancel.cancel();
        }))
    }

    /// Create or attach the native transfer for `request` and register it.
    ///
    /// Must be called with the tag lock held.
    async fn open_native(
        &self,
        request: &TransferRequest,
    ) -> Result<(TransferRecord, DriverStart, bool), TransferError> {
        let tag = request.tag();
        let source = request.source_uri().to_string();

        let (record, start, attached) = match self.reconciler.resolve(request).await? {
            Reconciliation::Create => {
                let spec = NativeTransferSpec::from_request(request);
                let handle = self.native.create_or_attach(&spec).await?;
                tracing::debug!(
                    target: "bgdl.download",
                    tag = %tag,
                    handle = %handle,
                    "Created native transfer"
                );
                let start = DriverStart::Follow {
                    bytes_received: 0,
                    bytes_total: 0,
                };
                (TransferRecord::new(tag.clone(), handle, source), start, false)
            }
            Reconciliation::Attach(snapshot) => {
                let status = if matches!(snapshot.status, NativeStatus::Pending) {
                    TransferStatus::Pending
                } else {
                    TransferStatus::Active
                };
                let mut record =
                    TransferRecord::new(tag.clone(), snapshot.handle, source).with_status(status);
                record.bytes_received = snapshot.bytes_received;
                record.bytes_total = snapshot.bytes_total;
                let start = DriverStart::Follow {
                    bytes_received: snapshot.bytes_received,
                    bytes_total: snapshot.bytes_total,
                };
                (record, start, true)
            }
            Reconciliation::AlreadyComplete(snapshot) => {
                let mut record = TransferRecord::new(tag.clone(), snapshot.handle, source)
                    .with_status(TransferStatus::Active);
                record.bytes_received = snapshot.bytes_received;
                record.bytes_total = snapshot.bytes_total;
                let start = DriverStart::Finalize {
                    payload_path: snapshot.payload_path,
                };
                (record, start, true)
            }
        };

        let mut registry = self.registry.lock().await;
        match registry.insert(record.clone()) {
            Err(TransferError::DuplicateTag { .. }) => {
                // An adopted orphan holds the tag; this start takes it over.
                tracing::debug!(
                    target: "bgdl.download",
                    tag = %tag,
                    "Taking over adopted record"
                );
                registry.remove(tag);
                registry.insert(record.clone())?;
                Ok((record, start, attached))
            }
            Err(e) => Err(e),
            Ok(()) => Ok((record, start, attached)),
        }
    }

    /// Commit the terminal outcome of a driver.
    ///
    /// Verifies the lease, clears the registry entry, releases the native
    /// handle and delivers the terminal notification.
    async fn finish(&self, tag: &TransferTag, lease: LeaseId, outcome: Result<(), TransferError>) {
        let _guard = self.locks.acquire(tag).await;

        let Some(transfer) = self.take_lease(tag, lease).await else {
            tracing::debug!(target: "bgdl.download", tag = %tag, "Ignoring stale finish (lease mismatch)");
            return;
        };

        {
            let mut registry = self.registry.lock().await;
            match &outcome {
                Ok(()) => registry.set_status(tag, TransferStatus::Completed),
                Err(TransferError::Cancelled) => registry.set_status(tag, TransferStatus::Cancelled),
                Err(e) => registry.set_failed(tag, e),
            }
            registry.remove(tag);
        }

        if let Err(e) = self.native.release(&transfer.handle).await {
            tracing::warn!(
                target: "bgdl.download",
                tag = %tag,
                handle = %transfer.handle,
                error = %e,
                "Failed to release native transfer"
            );
        }

        match &outcome {
            Ok(()) => tracing::info!(target: "bgdl.download", tag = %tag, "Transfer completed"),
            Err(TransferError::Cancelled) => {
                tracing::info!(target: "bgdl.download", tag = %tag, "Transfer cancelled");
            }
            Err(e) => {
                tracing::warn!(target: "bgdl.download", tag = %tag, error = %e, "Transfer failed");
            }
        }

        transfer.hub.finish(outcome).await;
    }

    /// Remove the active entry for `tag` if it still holds `lease`.
    async fn take_lease(&self, tag: &TransferTag, lease: LeaseId) -> Option<ActiveTransfer> {
        let mut active = self.active.lock().await;
        if active.get(tag).is_some_and(|t| t.lease == lease) {
            active.remove(tag)
        } else {
            None
        }
    }

    /// Cancel and forget a registry record that has no running driver.
    async fn discard_orphan(&self, record: &TransferRecord) -> Result<(), TransferError> {
        if record.status.is_live() {
            self.native.cancel(&record.native_handle_id).await?;
        }
        self.native.release(&record.native_handle_id).await?;
        self.registry.lock().await.remove(&record.tag);

        tracing::info!(
            target: "bgdl.download",
            tag = %record.tag,
            handle = %record.native_handle_id,
            "Discarded adopted transfer"
        );
        Ok(())
    }
}

#[async_trait]
impl TransferManagerPort for TransferManagerImpl {
    async fn start_async(
        &self,
        request: TransferRequest,
    ) -> Result<TransferOperation, TransferError> {
        let tag = request.tag().clone();
        let _guard = self.inner.locks.acquire(&tag).await;

        if let Some(operation) = self.inner.join_active(&tag).await {
            return Ok(operation);
        }

        let (record, start, attached) = self.inner.open_native(&request).await?;

        let initial = TransferState {
            status: record.status,
            ..TransferState::pending()
        };
        let hub = Arc::new(NotificationHub::new(initial));
        let (rx, state) = hub.subscribe().await;
        let cancel = CancellationToken::new();
        let lease = LeaseId(self.inner.lease_counter.fetch_add(1, Ordering::Relaxed));

        self.inner.active.lock().await.insert(
            tag.clone(),
            ActiveTransfer {
                lease,
                handle: record.native_handle_id.clone(),
                cancel: cancel.clone(),
                hub: Arc::clone(&hub),
            },
        );

        tracing::info!(
            target: "bgdl.download",
            tag = %tag,
            handle = %record.native_handle_id,
            source = %request.source_uri(),
            attached,
            "Transfer started"
        );

        let job = DriverJob {
            tag: tag.clone(),
            handle: record.native_handle_id,
            destination: request.destination_path().to_path_buf(),
            start,
            cancel: cancel.clone(),
            hub,
        };
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = driver::run_job(&job, &inner.driver_deps).await;
            inner.finish(&job.tag, lease, outcome).await;
        });

        Ok(TransferOperation::new(tag, attached, rx, state, move || {
            cancel.cancel();
        }))
    }

    async fn stop(&self, destination: &str) -> Result<(), TransferError> {
        let tag = TransferTag::from_destination(destination)?;

        {
            let active = self.inner.active.lock().await;
            if let Some(transfer) = active.get(&tag) {
                transfer.cancel.cancel();
                tracing::info!(target: "bgdl.download", tag = %tag, "Cancellation requested");
                return Ok(());
            }
        }

        let _guard = self.inner.locks.acquire(&tag).await;

        // The driver may have started between the check above and the lock.
        {
            let active = self.inner.active.lock().await;
            if let Some(transfer) = active.get(&tag) {
                transfer.cancel.cancel();
                return Ok(());
            }
        }

        let record = self.inner.registry.lock().await.find_by_tag(&tag).cloned();
        match record {
            Some(record) => self.inner.discard_orphan(&record).await,
            None => Err(TransferError::not_found(tag.as_str())),
        }
    }

    async fn reconcile(&self) -> Result<usize, TransferError> {
        let known: HashSet<TransferTag> = {
            let active = self.inner.active.lock().await;
            let registry = self.inner.registry.lock().await;
            active
                .keys()
                .cloned()
                .chain(registry.list_all().into_iter().map(|r| r.tag))
                .collect()
        };

        let orphans = self
            .inner
            .reconciler
            .orphans(|tag| known.contains(tag))
            .await?;

        let mut adopted = 0;
        for record in orphans {
            let tag = record.tag.clone();
            let _guard = self.inner.locks.acquire(&tag).await;
            // A start may have claimed or finished the transfer since listing
            if self.inner.active.lock().await.contains_key(&tag) {
                tracing::debug!(target: "bgdl.download", tag = %tag, "Orphan claimed by a start");
                continue;
            }
            let current = self.inner.native.query_existing(&tag).await?;
            if current.is_none_or(|snapshot| snapshot.handle != record.native_handle_id) {
                tracing::debug!(target: "bgdl.download", tag = %tag, "Orphan no longer tracked");
                continue;
            }
            match self.inner.registry.lock().await.insert(record) {
                Ok(()) => {
                    adopted += 1;
                    tracing::info!(target: "bgdl.download", tag = %tag, "Adopted transfer from previous run");
                }
                Err(e) => {
                    tracing::debug!(target: "bgdl.download", tag = %tag, error = %e, "Skipping orphan");
                }
            }
        }

        Ok(adopted)
    }

    async fn snapshot(&self) -> Vec<TransferRecord> {
        self.inner.registry.lock().await.list_all()
    }

    async fn shutdown(&self) -> usize {
        let active = self.inner.active.lock().await;
        for transfer in active.values() {
            transfer.cancel.cancel();
        }
        let count = active.len();
        tracing::info!(target: "bgdl.download", count, "Shutdown: cancelled live transfers");
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_id_equality() {
        let l1 = LeaseId(1);
        let l2 = LeaseId(1);
        let l3 = LeaseId(2);

        assert_eq!(l1, l2);
        assert_ne!(l1, l3);
    }
}
