//! Status tracking and serialized access for repository mirrors.
//!
//! [`RepoCacheManager`] owns the status table and the lock table.  Handlers
//! poll [`RepoCacheManager::get_status`] (or [`RepoCacheManager::resolve`]),
//! trigger background clones, and read mirrors through
//! [`RepoCacheManager::access_repo`], which holds the repository lock for the
//! duration of the caller's action.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::locks::LockTable;
use super::store::{GitMirrorStore, MirrorError, MirrorOutcome, MirrorStore};
use super::{Availability, RepoStatus, RepositoryId};
use crate::config::MirrorConfig;
use crate::metrics::{MirrorOutcomeLabel, MetricsRegistry};

const DEFAULT_CLONE_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_LOCK_WAIT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("timed out after {waited:?} waiting for the lock of repository {repo_id}")]
    LockTimeout { repo_id: RepositoryId, waited: Duration },
    #[error("{0:#}")]
    Action(anyhow::Error),
}

struct Inner {
    root: PathBuf,
    store: Arc<dyn MirrorStore>,
    statuses: Mutex<HashMap<RepositoryId, RepoStatus>>,
    locks: LockTable,
    clone_timeout: Duration,
    lock_wait_timeout: Duration,
    metrics: MetricsRegistry,
    shutdown: CancellationToken,
}

/// Handle to the mirror cache.  Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct RepoCacheManager {
    inner: Arc<Inner>,
}

impl RepoCacheManager {
    pub fn new(root: impl Into<PathBuf>, store: Arc<dyn MirrorStore>, metrics: MetricsRegistry) -> Self {
        Self::with_timeouts(root, store, metrics, DEFAULT_CLONE_TIMEOUT, DEFAULT_LOCK_WAIT_TIMEOUT)
    }

    pub fn with_timeouts(
        root: impl Into<PathBuf>,
        store: Arc<dyn MirrorStore>,
        metrics: MetricsRegistry,
        clone_timeout: Duration,
        lock_wait_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: root.into(),
                store,
                statuses: Mutex::new(HashMap::new()),
                locks: LockTable::new(),
                clone_timeout,
                lock_wait_timeout,
                metrics,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Build a manager backed by the git binary named in `config`.
    pub fn from_config(config: &MirrorConfig, metrics: MetricsRegistry) -> Self {
        Self::with_timeouts(
            config.root.clone(),
            Arc::new(GitMirrorStore::new(config.git_binary.clone())),
            metrics,
            config.clone_timeout(),
            config.lock_wait_timeout(),
        )
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Directory where the mirror of `url` lives (whether or not it exists).
    pub fn mirror_path(&self, url: &str) -> PathBuf {
        RepositoryId::from_url(url).mirror_path(&self.inner.root)
    }

    fn statuses(&self) -> MutexGuard<'_, HashMap<RepositoryId, RepoStatus>> {
        self.inner.statuses.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, id: &RepositoryId, status: RepoStatus) {
        info!(repo_id = %id, %status, "mirror status changed");
        self.statuses().insert(id.clone(), status);
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Current status of `url`; `Pending` if it was never triggered.
    pub fn get_status(&self, url: &str) -> RepoStatus {
        let id = RepositoryId::from_url(url);
        self.statuses().get(&id).copied().unwrap_or(RepoStatus::Pending)
    }

    /// Start a background clone or refresh of `url` unless one is running.
    ///
    /// Returns `true` when this call started the work.  Must be called from
    /// within a Tokio runtime.
    pub fn trigger_clone(&self, url: &str) -> bool {
        let id = RepositoryId::from_url(url);
        if self.is_shut_down() {
            warn!(repo_id = %id, %url, "manager shut down; not starting clone");
            return false;
        }
        {
            let mut statuses = self.statuses();
            if statuses.get(&id) == Some(&RepoStatus::Cloning) {
                debug!(repo_id = %id, %url, "already cloning");
                return false;
            }
            statuses.insert(id.clone(), RepoStatus::Cloning);
        }
        info!(repo_id = %id, %url, "mirror clone triggered");
        self.inner.metrics.metrics.mirrors_cloning.inc();

        let this = self.clone();
        let url = url.to_string();
        tokio::spawn(async move { this.run_mirror(id, url).await });
        true
    }

    async fn run_mirror(&self, id: RepositoryId, url: String) {
        let inner = &self.inner;
        let guard = tokio::select! {
            guard = inner.locks.lock(&id) => Some(guard),
            () = inner.shutdown.cancelled() => None,
        };
        let result = match guard {
            None => Err(MirrorError::Cancelled),
            Some(_) => tokio::select! {
                res = tokio::time::timeout(inner.clone_timeout, inner.store.ensure_mirror(&url, &inner.root)) => {
                    res.unwrap_or_else(|_| Err(MirrorError::TimedOut(inner.clone_timeout)))
                }
                () = inner.shutdown.cancelled() => Err(MirrorError::Cancelled),
            },
        };
        if matches!(result, Err(MirrorError::Cancelled)) {
            warn!(repo_id = %id, %url, "mirror task cancelled by shutdown");
        }

        // Publish while still holding the lock.
        let status = self.settle(&id, &url, result).await;
        self.set_status(&id, status);
        drop(guard);
        inner.metrics.metrics.mirrors_cloning.dec();
    }

    /// Map the store's result onto the next status.  A failed or interrupted
    /// refresh of a mirror that is still usable keeps serving the stale copy.
    async fn settle(&self, id: &RepositoryId, url: &str, result: Result<MirrorOutcome, MirrorError>) -> RepoStatus {
        let inner = &self.inner;
        let metrics = &inner.metrics.metrics;
        let error = match result {
            Ok(MirrorOutcome::Cloned) => {
                metrics.record_mirror_run(MirrorOutcomeLabel::Cloned);
                return RepoStatus::Ready;
            }
            Ok(MirrorOutcome::Updated) => {
                metrics.record_mirror_run(MirrorOutcomeLabel::Updated);
                return RepoStatus::Ready;
            }
            Err(MirrorError::Update(e)) => {
                warn!(repo_id = %id, %url, error = %format!("{e:#}"), "mirror refresh failed; serving stale copy");
                metrics.record_mirror_run(MirrorOutcomeLabel::Stale);
                return RepoStatus::Ready;
            }
            Err(e @ (MirrorError::TimedOut(_) | MirrorError::Cancelled)) => {
                if inner.store.has_usable_mirror(url, &inner.root).await {
                    warn!(repo_id = %id, %url, error = %e, "mirror refresh interrupted; serving stale copy");
                    metrics.record_mirror_run(MirrorOutcomeLabel::Stale);
                    return RepoStatus::Ready;
                }
                e
            }
            Err(e) => e,
        };
        error!(repo_id = %id, %url, error = %error, "mirror clone failed");
        metrics.record_mirror_run(MirrorOutcomeLabel::Failed);
        RepoStatus::Error
    }

    /// Gate used by request handlers: starts a clone for unknown
    /// repositories and reports what to answer.
    pub fn resolve(&self, url: &str) -> Availability {
        match self.get_status(url) {
            RepoStatus::Pending => {
                if self.trigger_clone(url) {
                    Availability::Started
                } else if self.is_shut_down() {
                    Availability::Failed
                } else {
                    Availability::StillCloning
                }
            }
            RepoStatus::Cloning => Availability::StillCloning,
            RepoStatus::Error => Availability::Failed,
            RepoStatus::Ready => Availability::Ready,
        }
    }

    // -----------------------------------------------------------------------
    // Access
    // -----------------------------------------------------------------------

    /// Run `action` with the mirror path of `url` while holding the
    /// repository lock.  Every access to one repository is serialized,
    /// readers included; a clone or refresh holds the same lock.
    ///
    /// Gives up with [`AccessError::LockTimeout`] after the configured wait.
    /// Callers are expected to have seen `Ready` first.
    pub async fn access_repo<F, Fut, T>(&self, url: &str, action: F) -> Result<T, AccessError>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let id = RepositoryId::from_url(url);
        let metrics = &self.inner.metrics.metrics;
        let waited = self.inner.lock_wait_timeout;

        let Some(guard) = self.inner.locks.lock_timeout(&id, waited).await else {
            metrics.lock_timeouts.inc();
            warn!(repo_id = %id, ?waited, "gave up waiting for repository lock");
            return Err(AccessError::LockTimeout { repo_id: id, waited });
        };
        if guard.waited() {
            metrics.lock_waits.inc();
        }

        let path = id.mirror_path(&self.inner.root);
        let result = action(path).await.map_err(AccessError::Action);
        drop(guard);
        result
    }

    /// Cancel in-flight clone/update tasks.  Their git processes are killed;
    /// a repository whose mirror is still usable stays `Ready`, the rest end
    /// in `Error`.
    ///
    /// Shutdown is terminal: later calls to [`Self::trigger_clone`] return
    /// `false` without starting work.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Number of repositories currently holding a lock-table entry.
    pub fn active_locks(&self) -> usize {
        self.inner.locks.len()
    }
}
