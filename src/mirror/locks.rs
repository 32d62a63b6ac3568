//! Per-repository mutual exclusion.
//!
//! Locks are created lazily and shared through a table keyed by
//! [`RepositoryId`].  An entry leaves the table only when the last lease on it
//! is dropped, and that check runs under the table mutex, so two callers can
//! never end up holding unrelated lock objects for the same repository.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

use super::RepositoryId;

type Table = Mutex<HashMap<RepositoryId, Arc<AsyncMutex<()>>>>;

#[derive(Clone, Default)]
pub struct LockTable {
    table: Arc<Table>,
}

/// A counted reference to a table entry.  Dropping the last one removes it.
struct Lease {
    table: Arc<Table>,
    id: RepositoryId,
    mutex: Arc<AsyncMutex<()>>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let unused = table
            .get(&self.id)
            // One count for the table and one for this lease.
            .is_some_and(|m| Arc::ptr_eq(m, &self.mutex) && Arc::strong_count(m) == 2);
        if unused {
            table.remove(&self.id);
            trace!(repo_id = %self.id, "repository lock released from table");
        }
    }
}

/// Held while a caller has exclusive access to one repository's mirror.
pub struct RepoLockGuard {
    // Field order matters: the mutex guard must drop before the lease.
    _guard: OwnedMutexGuard<()>,
    _lease: Lease,
    waited: bool,
}

impl RepoLockGuard {
    /// Whether acquisition had to wait for another holder.
    pub fn waited(&self) -> bool {
        self.waited
    }
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<RepositoryId, Arc<AsyncMutex<()>>>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lease(&self, id: &RepositoryId) -> Lease {
        let mutex = Arc::clone(self.entries().entry(id.clone()).or_default());
        Lease {
            table: Arc::clone(&self.table),
            id: id.clone(),
            mutex,
        }
    }

    /// Wait as long as it takes for the lock of `id`.
    pub async fn lock(&self, id: &RepositoryId) -> RepoLockGuard {
        let lease = self.lease(id);
        if let Ok(guard) = Arc::clone(&lease.mutex).try_lock_owned() {
            return RepoLockGuard { _guard: guard, _lease: lease, waited: false };
        }
        let guard = Arc::clone(&lease.mutex).lock_owned().await;
        RepoLockGuard { _guard: guard, _lease: lease, waited: true }
    }

    /// Wait at most `timeout` for the lock of `id`; `None` when it expired.
    pub async fn lock_timeout(&self, id: &RepositoryId, timeout: Duration) -> Option<RepoLockGuard> {
        let lease = self.lease(id);
        if let Ok(guard) = Arc::clone(&lease.mutex).try_lock_owned() {
            return Some(RepoLockGuard { _guard: guard, _lease: lease, waited: false });
        }
        // The timeout future, and its clone of the mutex, is gone by the
        // time `lease` drops on the error path.
        let acquired = tokio::time::timeout(timeout, Arc::clone(&lease.mutex).lock_owned()).await;
        match acquired {
            Ok(guard) => Some(RepoLockGuard { _guard: guard, _lease: lease, waited: true }),
            Err(_) => None,
        }
    }

    /// Number of repositories with a live lock entry.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> RepositoryId {
        RepositoryId::from_url(s)
    }

    #[tokio::test]
    async fn entry_removed_after_last_holder() {
        let locks = LockTable::new();
        let guard = locks.lock(&id("https://example.com/a")).await;
        assert!(!guard.waited());
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn distinct_repositories_do_not_contend() {
        let locks = LockTable::new();
        let _a = locks.lock(&id("https://example.com/a")).await;
        let b = locks
            .lock_timeout(&id("https://example.com/b"), Duration::from_millis(10))
            .await;
        assert!(b.is_some());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_leaves_holder_entry_intact() {
        let locks = LockTable::new();
        let repo = id("https://example.com/a");
        let held = locks.lock(&repo).await;

        let second = locks.lock_timeout(&repo, Duration::from_secs(1)).await;
        assert!(second.is_none());
        assert_eq!(locks.len(), 1, "holder's entry must survive the timed-out waiter");

        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn waiter_shares_entry_with_holder() {
        let locks = LockTable::new();
        let repo = id("https://example.com/a");
        let held = locks.lock(&repo).await;

        let waiter = {
            let locks = locks.clone();
            let repo = repo.clone();
            tokio::spawn(async move { locks.lock(&repo).await.waited() })
        };
        // Give the waiter time to park on the mutex, then let it through.
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert!(waiter.await.unwrap());
        assert!(locks.is_empty());
    }
}
