//! Caller-facing handle for one transfer.
//!
//! A `TransferOperation` is a view onto a transfer owned by the manager. It
//! carries the single-subscriber notification stream, the latest observed
//! state, and the capability to request cancellation. The engine that drives
//! the transfer stays behind the `TransferManagerPort`; nothing here knows how
//! cancellation is implemented.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, watch};
use tokio_stream::Stream;

use super::errors::TransferError;
use super::events::TransferNotification;
use super::types::{TransferStatus, TransferTag};

/// Latest observed state of a transfer, shared by every handle attached to it.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferState {
    /// Lifecycle status.
    pub status: TransferStatus,
    /// Highest progress percentage delivered so far.
    pub percentage: Option<f64>,
    /// Failure reason once the transfer failed or was cancelled.
    pub error: Option<TransferError>,
}

impl TransferState {
    /// Initial state of a freshly created transfer.
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            status: TransferStatus::Pending,
            percentage: None,
            error: None,
        }
    }
}

impl Default for TransferState {
    fn default() -> Self {
        Self::pending()
    }
}

type Canceller = Arc<dyn Fn() + Send + Sync>;

/// Handle for one download, returned by `start`.
pub struct TransferOperation {
    tag: TransferTag,
    attached: bool,
    notifications: Option<mpsc::UnboundedReceiver<TransferNotification>>,
    state: watch::Receiver<TransferState>,
    canceller: Canceller,
}

impl TransferOperation {
    /// Assemble a handle. Called by manager implementations.
    pub fn new(
        tag: TransferTag,
        attached: bool,
        notifications: mpsc::UnboundedReceiver<TransferNotification>,
        state: watch::Receiver<TransferState>,
        canceller: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            tag,
            attached,
            notifications: Some(notifications),
            state,
            canceller: Arc::new(canceller),
        }
    }

    /// Destination tag of the transfer.
    #[must_use]
    pub const fn tag(&self) -> &TransferTag {
        &self.tag
    }

    /// Whether `start` joined a transfer that already existed.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.attached
    }

    /// Take the notification stream.
    ///
    /// The stream is single-subscriber and not restartable: the first call
    /// returns it, later calls return `None`.
    pub fn progress_stream(&mut self) -> Option<NotificationStream> {
        self.notifications.take().map(|rx| NotificationStream { rx })
    }

    /// Request cancellation.
    ///
    /// Returns immediately. A `Cancelled` notification follows unless the
    /// transfer already reached another terminal state.
    pub fn cancel(&self) {
        (self.canceller)();
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> TransferStatus {
        self.state.borrow().status
    }

    /// Current shared state.
    #[must_use]
    pub fn state(&self) -> TransferState {
        self.state.borrow().clone()
    }

    /// Outcome once terminal, `None` while still running.
    ///
    /// A cancelled transfer reports `Err(TransferError::Cancelled)`.
    #[must_use]
    pub fn result(&self) -> Option<Result<(), TransferError>> {
        outcome_of(&self.state.borrow())
    }

    /// Wait until the transfer is terminal and return its outcome.
    ///
    /// Does not consume notifications; the stream stays available.
    pub async fn wait(&self) -> Result<(), TransferError> {
        let mut state = self.state.clone();
        loop {
            if let Some(outcome) = outcome_of(&state.borrow_and_update()) {
                return outcome;
            }
            if state.changed().await.is_err() {
                return outcome_of(&state.borrow()).unwrap_or_else(|| {
                    Err(TransferError::transfer(
                        "transfer dropped before reaching a terminal state",
                    ))
                });
            }
        }
    }
}

impl fmt::Debug for TransferOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferOperation")
            .field("tag", &self.tag)
            .field("attached", &self.attached)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

fn outcome_of(state: &TransferState) -> Option<Result<(), TransferError>> {
    match state.status {
        TransferStatus::Completed => Some(Ok(())),
        TransferStatus::Cancelled => Some(Err(TransferError::Cancelled)),
        TransferStatus::Failed => Some(Err(state
            .error
            .clone()
            .unwrap_or_else(|| TransferError::transfer("unspecified transfer error")))),
        TransferStatus::Pending | TransferStatus::Active => None,
    }
}

/// Stream of notifications for one operation, ending after the terminal one.
#[derive(Debug)]
pub struct NotificationStream {
    rx: mpsc::UnboundedReceiver<TransferNotification>,
}

impl NotificationStream {
    /// Receive the next notification, `None` once the stream is finished.
    pub async fn next_notification(&mut self) -> Option<TransferNotification> {
        self.rx.recv().await
    }

    /// Drain the stream, returning every remaining notification in order.
    pub async fn collect_all(mut self) -> Vec<TransferNotification> {
        let mut all = Vec::new();
        while let Some(notification) = self.rx.recv().await {
            all.push(notification);
        }
        all
    }
}

impl Stream for NotificationStream {
    type Item = TransferNotification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
