//! Notification fan-out for one transfer.
//!
//! Every operation attached to a transfer gets its own single-subscriber
//! channel. The hub latches the terminal notification: it is delivered once
//! to every subscriber, always last, and a subscriber joining after the fact
//! receives it immediately.

use tokio::sync::{Mutex, mpsc, watch};

use bgdl_core::transfer::{TransferError, TransferNotification, TransferState, TransferStatus};

#[derive(Default)]
struct HubInner {
    subscribers: Vec<mpsc::UnboundedSender<TransferNotification>>,
    last_percentage: Option<f64>,
    terminal: Option<TransferNotification>,
}

impl HubInner {
    fn broadcast(&mut self, notification: &TransferNotification) {
        self.subscribers
            .retain(|tx| tx.send(notification.clone()).is_ok());
    }
}

/// Shared notification state of one transfer.
pub(crate) struct NotificationHub {
    inner: Mutex<HubInner>,
    state: watch::Sender<TransferState>,
}

impl NotificationHub {
    pub(crate) fn new(initial: TransferState) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            inner: Mutex::new(HubInner::default()),
            state,
        }
    }

    /// Open a channel for a new operation.
    ///
    /// A late subscriber first receives the latest percentage, then the
    /// terminal notification if the transfer already finished.
    pub(crate) async fn subscribe(
        &self,
    ) -> (
        mpsc::UnboundedReceiver<TransferNotification>,
        watch::Receiver<TransferState>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().await;

        if let Some(percentage) = inner.last_percentage {
            let _ = tx.send(TransferNotification::progress(percentage));
        }
        if let Some(terminal) = &inner.terminal {
            let _ = tx.send(terminal.clone());
        } else {
            inner.subscribers.push(tx);
        }

        (rx, self.state.subscribe())
    }

    /// Mark the transfer as receiving data.
    pub(crate) fn activate(&self) {
        self.state.send_if_modified(|state| {
            let pending = state.status == TransferStatus::Pending;
            if pending {
                state.status = TransferStatus::Active;
            }
            pending
        });
    }

    /// Deliver a progress percentage.
    pub(crate) async fn progress(&self, percentage: f64) {
        let mut inner = self.inner.lock().await;
        if inner.terminal.is_some() {
            return;
        }
        inner.last_percentage = Some(percentage);
        self.state.send_modify(|state| {
            state.status = TransferStatus::Active;
            state.percentage = Some(percentage);
        });
        inner.broadcast(&TransferNotification::progress(percentage));
    }

    /// Deliver an informational status message.
    pub(crate) async fn status(&self, message: String) {
        let mut inner = self.inner.lock().await;
        if inner.terminal.is_none() {
            inner.broadcast(&TransferNotification::status(message));
        }
    }

    /// Deliver the terminal outcome and close every channel.
    ///
    /// Returns `false` if a terminal notification was already delivered.
    pub(crate) async fn finish(&self, outcome: Result<(), TransferError>) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.terminal.is_some() {
            return false;
        }

        let (status, error, notification) = match outcome {
            Ok(()) => (TransferStatus::Completed, None, TransferNotification::Completed),
            Err(TransferError::Cancelled) => (
                TransferStatus::Cancelled,
                Some(TransferError::Cancelled),
                TransferNotification::Cancelled,
            ),
            Err(e) => (
                TransferStatus::Failed,
                Some(e.clone()),
                TransferNotification::failed(e),
            ),
        };

        // State first: a caller seeing the terminal notification can rely on
        // `TransferOperation::result` being set.
        self.state.send_modify(|state| {
            state.status = status;
            state.error = error;
        });
        inner.broadcast(&notification);
        inner.subscribers.clear();
        inner.terminal = Some(notification);
        true
    }
}
