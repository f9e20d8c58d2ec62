//! Per-tag mutual exclusion.
//!
//! Every `start`, `stop` and terminal commit for a tag runs under that tag's
//! lock, so the reconciler's match-then-create sequence cannot race. Distinct
//! tags never contend.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard};

use bgdl_core::transfer::TransferTag;

/// Lock table keyed by transfer tag.
///
/// Entries are weak: a tag's mutex lives only while someone holds or waits
/// for it.
#[derive(Debug, Default)]
pub(crate) struct TagLocks {
    table: Mutex<HashMap<TransferTag, Weak<Mutex<()>>>>,
}

impl TagLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `tag`.
    pub(crate) async fn acquire(&self, tag: &TransferTag) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock().await;
            table.retain(|_, weak| weak.strong_count() > 0);
            if let Some(lock) = table.get(tag).and_then(Weak::upgrade) {
                lock
            } else {
                let lock = Arc::new(Mutex::new(()));
                table.insert(tag.clone(), Arc::downgrade(&lock));
                lock
            }
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        let table = self.table.lock().await;
        table.values().filter(|weak| weak.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tag(dest: &str) -> TransferTag {
        TransferTag::from_destination(dest).unwrap()
    }

    #[tokio::test]
    async fn same_tag_is_exclusive() {
        let locks = Arc::new(TagLocks::new());
        let guard = locks.acquire(&tag("/a")).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(&tag("/a")).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn distinct_tags_do_not_contend() {
        let locks = TagLocks::new();
        let _a = locks.acquire(&tag("/a")).await;
        let _b = tokio::time::timeout(Duration::from_secs(1), locks.acquire(&tag("/b")))
            .await
            .unwrap();
        assert_eq!(locks.len().await, 2);
    }

    #[tokio::test]
    async fn released_entries_are_dropped() {
        let locks = TagLocks::new();
        drop(locks.acquire(&tag("/a")).await);
        assert_eq!(locks.len().await, 0);
    }
}
