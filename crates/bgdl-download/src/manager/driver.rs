//! Per-operation driver.
//!
//! The driver follows one native transfer from subscription to its terminal
//! event and runs finalization on success. It operates on a `DriverJob`
//! value and cloned `DriverDeps`; terminal bookkeeping stays with the
//! manager.
//!
//! # Design Principles
//!
//! - Progress goes to the registry and the notification hub, never directly
//!   to callers
//! - Cancellation is handled via `tokio::select!` around the event stream
//! - After cancellation is requested, a natural completion that still arrives
//!   within the grace period wins

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use bgdl_core::ports::{FileStorePort, NativeTransferPort, TransferManagerConfig};
use bgdl_core::transfer::{
    NativeEvent, NativeHandleId, TransferError, TransferTag, is_success_status,
};

use crate::finalize::FinalizationStep;
use crate::progress::ProgressBridge;
use crate::registry::TransferRegistry;

use super::hub::NotificationHub;

/// Dependencies shared by every driver.
#[derive(Clone)]
pub(crate) struct DriverDeps {
    pub native: Arc<dyn NativeTransferPort>,
    pub file_store: Arc<dyn FileStorePort>,
    pub registry: Arc<Mutex<TransferRegistry>>,
    pub config: TransferManagerConfig,
}

/// How the driver begins.
#[derive(Debug, Clone)]
pub(crate) enum DriverStart {
    /// Subscribe to the native events, seeding progress with the given counts.
    Follow { bytes_received: u64, bytes_total: u64 },
    /// The native transfer already finished; finalize the payload directly.
    Finalize { payload_path: PathBuf },
}

/// One transfer for the driver to follow.
pub(crate) struct DriverJob {
    pub tag: TransferTag,
    pub handle: NativeHandleId,
    pub destination: PathBuf,
    pub start: DriverStart,
    pub cancel: CancellationToken,
    pub hub: Arc<NotificationHub>,
}

/// Run a job to its terminal outcome.
///
/// `Err(TransferError::Cancelled)` means the caller's cancellation won.
pub(crate) async fn run_job(job: &DriverJob, deps: &DriverDeps) -> Result<(), TransferError> {
    let payload = match &job.start {
        DriverStart::Finalize { payload_path } => payload_path.clone(),
        DriverStart::Follow {
            bytes_received,
            bytes_total,
        } => {
            let mut bridge = ProgressBridge::new();
            if let Some(percentage) = bridge.observe(*bytes_received, *bytes_total) {
                job.hub.progress(percentage).await;
            }
            follow_events(job, deps, &mut bridge).await?
        }
    };

    FinalizationStep::new(deps.file_store.as_ref())
        .run(&payload, &job.destination)
        .await
}

/// Consume native events until a terminal one, returning the payload path of
/// a successful transfer.
async fn follow_events(
    job: &DriverJob,
    deps: &DriverDeps,
    bridge: &mut ProgressBridge,
) -> Result<PathBuf, TransferError> {
    let mut events = deps.native.subscribe_progress(&job.handle).await?;
    let mut cancel_deadline: Option<Instant> = None;

    loop {
        let event = match cancel_deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;

                    event = events.recv() => event,

                    () = sleep_until(deadline) => {
                        tracing::debug!(
                            target: "bgdl.download",
                            tag = %job.tag,
                            "No cancellation confirmation within grace period"
                        );
                        return Err(TransferError::Cancelled);
                    }
                }
            }
            None => {
                tokio::select! {
                    biased;

                    () = job.cancel.cancelled() => {
                        request_native_cancel(job, deps).await;
                        cancel_deadline = Some(Instant::now() + deps.config.cancel_grace);
                        continue;
                    }

                    event = events.recv() => event,
                }
            }
        };

        let cancelling = cancel_deadline.is_some();
        let Some(event) = event else {
            return Err(stream_closed(cancelling));
        };

        match event {
            NativeEvent::Progress {
                bytes_received,
                bytes_total,
            } => {
                if !cancelling {
                    report_progress(job, deps, bridge, bytes_received, bytes_total).await;
                }
            }
            NativeEvent::Pending { reason } => {
                job.hub
                    .status(format!("Download pending with reason {reason}"))
                    .await;
            }
            NativeEvent::Paused { reason } => {
                job.hub
                    .status(format!("Download paused with reason {reason}"))
                    .await;
            }
            NativeEvent::Completed {
                status_code,
                payload_path,
            } => {
                return if is_success_status(status_code) {
                    Ok(payload_path)
                } else {
                    Err(TransferError::from_status(status_code, None))
                };
            }
            NativeEvent::Failed { .. } | NativeEvent::Cancelled if cancelling => {
                return Err(TransferError::Cancelled);
            }
            NativeEvent::Failed {
                status_code,
                message,
            } => {
                return Err(match status_code {
                    Some(code) => TransferError::from_status(code, Some(&message)),
                    None => TransferError::transfer(message),
                });
            }
            NativeEvent::Cancelled => return Err(TransferError::Cancelled),
        }
    }
}

async fn report_progress(
    job: &DriverJob,
    deps: &DriverDeps,
    bridge: &mut ProgressBridge,
    bytes_received: u64,
    bytes_total: u64,
) {
    deps.registry
        .lock()
        .await
        .record_progress(&job.tag, bytes_received, bytes_total);

    if bytes_total > 0 {
        job.hub.activate();
    }
    if let Some(percentage) = bridge.observe(bytes_received, bytes_total) {
        job.hub.progress(percentage).await;
    }
}

async fn request_native_cancel(job: &DriverJob, deps: &DriverDeps) {
    tracing::debug!(
        target: "bgdl.download",
        tag = %job.tag,
        handle = %job.handle,
        "Requesting native cancellation"
    );
    if let Err(e) = deps.native.cancel(&job.handle).await {
        tracing::warn!(
            target: "bgdl.download",
            tag = %job.tag,
            handle = %job.handle,
            error = %e,
            "Native cancel failed"
        );
    }
}

fn stream_closed(cancelling: bool) -> TransferError {
    if cancelling {
        TransferError::Cancelled
    } else {
        TransferError::transfer("native event stream closed before the transfer finished")
    }
}
