//! Matching requests and leftovers against the native facility.
//!
//! The in-memory registry is wiped on restart; the facility is not. Before a
//! new native transfer is created, the facility is asked whether it already
//! tracks one for the same destination, so an interrupted download is
//! re-attached instead of started twice.

use std::sync::Arc;

use bgdl_core::ports::{NativeStatus, NativeTransferPort, NativeTransferSnapshot};
use bgdl_core::transfer::{
    TransferError, TransferRecord, TransferRequest, TransferStatus, TransferTag,
    is_success_status,
};

/// Outcome of matching one request against the facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Nothing usable exists; create a new native transfer.
    Create,
    /// A matching transfer is still in flight; attach to it.
    Attach(NativeTransferSnapshot),
    /// A matching transfer already finished successfully; finalize it now.
    AlreadyComplete(NativeTransferSnapshot),
}

/// Queries the facility for transfers matching a request or left over from a
/// previous process lifetime.
pub struct Reconciler {
    native: Arc<dyn NativeTransferPort>,
}

impl Reconciler {
    /// Create a reconciler over `native`.
    pub fn new(native: Arc<dyn NativeTransferPort>) -> Self {
        Self { native }
    }

    /// Decide whether `request` creates, attaches, or short-circuits.
    ///
    /// A transfer matches when it carries the request's tag. Untagged
    /// transfers also match on exact source URI, or through the request's
    /// URI matcher. A failed or cancelled match is released so a fresh
    /// transfer can replace it.
    ///
    /// Callers must hold the tag's lock across this call and the following
    /// create, so the answer cannot go stale.
    pub async fn resolve(&self, request: &TransferRequest) -> Result<Reconciliation, TransferError> {
        let found = match self.native.query_existing(request.tag()).await? {
            Some(snapshot) => Some(snapshot),
            None => self.find_untagged(request).await?,
        };

        let Some(snapshot) = found else {
            return Ok(Reconciliation::Create);
        };

        match &snapshot.status {
            status if status.is_in_flight() => {
                tracing::debug!(
                    target: "bgdl.download",
                    tag = %request.tag(),
                    handle = %snapshot.handle,
                    "Re-attaching to in-flight native transfer"
                );
                Ok(Reconciliation::Attach(snapshot))
            }
            NativeStatus::Completed { status_code } if is_success_status(*status_code) => {
                tracing::debug!(
                    target: "bgdl.download",
                    tag = %request.tag(),
                    handle = %snapshot.handle,
                    "Native transfer already complete"
                );
                Ok(Reconciliation::AlreadyComplete(snapshot))
            }
            status => {
                tracing::debug!(
                    target: "bgdl.download",
                    tag = %request.tag(),
                    handle = %snapshot.handle,
                    status = ?status,
                    "Releasing stale native transfer"
                );
                self.native.release(&snapshot.handle).await?;
                Ok(Reconciliation::Create)
            }
        }
    }

    /// Records for tagged transfers the manager does not know yet.
    ///
    /// `is_known` reports tags the manager already tracks; those are left
    /// alone. Unknown stale transfers are released.
    pub async fn orphans(
        &self,
        is_known: impl Fn(&TransferTag) -> bool + Send,
    ) -> Result<Vec<TransferRecord>, TransferError> {
        let mut adopted = Vec::new();

        for snapshot in self.native.list_transfers().await? {
            let Some(tag) = snapshot.tag.clone() else {
                continue;
            };
            if is_known(&tag) {
                continue;
            }

            let Some(status) = adopted_status(&snapshot.status) else {
                tracing::debug!(
                    target: "bgdl.download",
                    tag = %tag,
                    handle = %snapshot.handle,
                    "Releasing stale orphan"
                );
                self.native.release(&snapshot.handle).await?;
                continue;
            };

            let mut record = TransferRecord::new(tag, snapshot.handle, snapshot.source_uri)
                .with_status(status);
            record.bytes_received = snapshot.bytes_received;
            record.bytes_total = snapshot.bytes_total;
            adopted.push(record);
        }

        Ok(adopted)
    }

    async fn find_untagged(
        &self,
        request: &TransferRequest,
    ) -> Result<Option<NativeTransferSnapshot>, TransferError> {
        let uri = request.source_uri().as_str();
        let transfers = self.native.list_transfers().await?;

        Ok(transfers.into_iter().find(|snapshot| {
            snapshot.tag.is_none()
                && (snapshot.source_uri == uri
                    || request
                        .uri_matcher()
                        .is_some_and(|m| m.same_resource(&snapshot.source_uri, uri)))
        }))
    }
}

/// Registry status for an orphan, `None` if it should be released.
const fn adopted_status(status: &NativeStatus) -> Option<TransferStatus> {
    match status {
        NativeStatus::Pending => Some(TransferStatus::Pending),
        NativeStatus::Running | NativeStatus::Paused { .. } => Some(TransferStatus::Active),
        NativeStatus::Completed { status_code } if is_success_status(*status_code) => {
            Some(TransferStatus::Completed)
        }
        NativeStatus::Completed { .. } | NativeStatus::Failed { .. } | NativeStatus::Cancelled => {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bgdl_core::ports::{NativeEventStream, NativeTransferSpec};
    use bgdl_core::transfer::NativeHandleId;
    use mockall::mock;
    use std::path::PathBuf;

    mock! {
        Native {}

        #[async_trait]
        impl NativeTransferPort for Native {
            async fn create_or_attach(&self, spec: &NativeTransferSpec) -> Result<NativeHandleId, TransferError>;
            async fn query_existing(&self, tag: &TransferTag) -> Result<Option<NativeTransferSnapshot>, TransferError>;
            async fn list_transfers(&self) -> Result<Vec<NativeTransferSnapshot>, TransferError>;
            async fn cancel(&self, handle: &NativeHandleId) -> Result<(), TransferError>;
            async fn subscribe_progress(&self, handle: &NativeHandleId) -> Result<NativeEventStream, TransferError>;
            async fn release(&self, handle: &NativeHandleId) -> Result<(), TransferError>;
        }
    }

    fn snapshot(handle: &str, tag: Option<&str>, uri: &str, status: NativeStatus) -> NativeTransferSnapshot {
        NativeTransferSnapshot {
            handle: NativeHandleId::new(handle),
            tag: tag.map(|t| TransferTag::from_destination(t).unwrap()),
            source_uri: uri.to_string(),
            status,
            bytes_received: 10,
            bytes_total: 100,
            payload_path: PathBuf::from("/staging/f.1"),
        }
    }

    fn reconciler(native: MockNative) -> Reconciler {
        Reconciler::new(Arc::new(native))
    }

    #[tokio::test]
    async fn creates_when_nothing_matches() {
        let mut native = MockNative::new();
        native.expect_query_existing().returning(|_| Ok(None));
        native.expect_list_transfers().returning(|| Ok(vec![]));

        let request = TransferRequest::new("http://h/f", "/local/f").unwrap();
        let result = reconciler(native).resolve(&request).await.unwrap();
        assert_eq!(result, Reconciliation::Create);
    }

    #[tokio::test]
    async fn attaches_to_in_flight_tag_match() {
        let mut native = MockNative::new();
        native.expect_query_existing().returning(|_| {
            Ok(Some(snapshot("7", Some("/local/f"), "http://h/f", NativeStatus::Running)))
        });
        native.expect_list_transfers().never();

        let request = TransferRequest::new("http://h/f", "/local/f").unwrap();
        let result = reconciler(native).resolve(&request).await.unwrap();
        assert!(matches!(result, Reconciliation::Attach(s) if s.handle.as_str() == "7"));
    }

    #[tokio::test]
    async fn completed_match_short_circuits() {
        let mut native = MockNative::new();
        native.expect_query_existing().returning(|_| {
            Ok(Some(snapshot(
                "7",
                Some("/local/f"),
                "http://h/f",
                NativeStatus::Completed { status_code: 200 },
            )))
        });

        let request = TransferRequest::new("http://h/f", "/local/f").unwrap();
        let result = reconciler(native).resolve(&request).await.unwrap();
        assert!(matches!(result, Reconciliation::AlreadyComplete(_)));
    }

    #[tokio::test]
    async fn failed_match_is_released_and_recreated() {
        let mut native = MockNative::new();
        native.expect_query_existing().returning(|_| {
            Ok(Some(snapshot(
                "7",
                Some("/local/f"),
                "http://h/f",
                NativeStatus::Failed {
                    message: "reset".into(),
                },
            )))
        });
        native
            .expect_release()
            .withf(|h| h.as_str() == "7")
            .times(1)
            .returning(|_| Ok(()));

        let request = TransferRequest::new("http://h/f", "/local/f").unwrap();
        let result = reconciler(native).resolve(&request).await.unwrap();
        assert_eq!(result, Reconciliation::Create);
    }

    #[tokio::test]
    async fn untagged_transfer_matches_through_uri_matcher() {
        let mut native = MockNative::new();
        native.expect_query_existing().returning(|_| Ok(None));
        native.expect_list_transfers().returning(|| {
            Ok(vec![
                snapshot("1", Some("/other"), "http://h/files/42?sig=aaa", NativeStatus::Running),
                snapshot("2", None, "http://h/files/42?sig=bbb", NativeStatus::Running),
            ])
        });

        let request = TransferRequest::new("http://h/files/42?sig=ccc", "/local/f")
            .unwrap()
            .with_uri_matcher(r"/files/\d+")
            .unwrap();
        let result = reconciler(native).resolve(&request).await.unwrap();
        assert!(matches!(result, Reconciliation::Attach(s) if s.handle.as_str() == "2"));
    }

    #[tokio::test]
    async fn transfer_tagged_for_another_destination_never_matches() {
        let mut native = MockNative::new();
        native.expect_query_existing().returning(|_| Ok(None));
        native.expect_list_transfers().returning(|| {
            Ok(vec![snapshot("1", Some("/other"), "http://h/f", NativeStatus::Running)])
        });

        let request = TransferRequest::new("http://h/f", "/local/f").unwrap();
        let result = reconciler(native).resolve(&request).await.unwrap();
        assert_eq!(result, Reconciliation::Create);
    }

    #[tokio::test]
    async fn orphans_are_adopted_and_stale_ones_released() {
        let mut native = MockNative::new();
        native.expect_list_transfers().returning(|| {
            Ok(vec![
                snapshot("1", Some("/a"), "http://h/a", NativeStatus::Paused { reason: "offline".into() }),
                snapshot("2", Some("/b"), "http://h/b", NativeStatus::Completed { status_code: 200 }),
                snapshot("3", Some("/c"), "http://h/c", NativeStatus::Cancelled),
                snapshot("4", Some("/known"), "http://h/k", NativeStatus::Running),
                snapshot("5", None, "http://h/untagged", NativeStatus::Running),
            ])
        });
        native
            .expect_release()
            .withf(|h| h.as_str() == "3")
            .times(1)
            .returning(|_| Ok(()));

        let known = TransferTag::from_destination("/known").unwrap();
        let adopted = reconciler(native)
            .orphans(|tag| *tag == known)
            .await
            .unwrap();

        let summary: Vec<_> = adopted
            .iter()
            .map(|r| (r.tag.as_str().to_string(), r.status))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("/a".to_string(), TransferStatus::Active),
                ("/b".to_string(), TransferStatus::Completed),
            ]
        );
        assert_eq!(adopted[0].bytes_received, 10);
    }
}
