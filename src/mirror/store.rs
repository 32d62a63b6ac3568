//! Creating and refreshing mirrors on disk.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::RepositoryId;
use crate::git;

/// What a successful [`MirrorStore::ensure_mirror`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorOutcome {
    Cloned,
    Updated,
}

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// No usable mirror exists and creating one failed.
    #[error("mirror clone failed: {0:#}")]
    Clone(anyhow::Error),
    /// A usable mirror exists but refreshing it failed.
    #[error("mirror update failed: {0:#}")]
    Update(anyhow::Error),
    #[error("mirror operation timed out after {0:?}")]
    TimedOut(Duration),
    #[error("mirror operation cancelled")]
    Cancelled,
}

/// Filesystem side of the mirror cache.  The manager owns one and calls it
/// from background tasks while holding the repository lock.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Make sure `cache_root/<id(url)>` holds a current mirror of `url`.
    async fn ensure_mirror(&self, url: &str, cache_root: &Path) -> Result<MirrorOutcome, MirrorError>;

    /// Whether a mirror of `url` that can be served already exists, e.g.
    /// after a refresh was interrupted.
    async fn has_usable_mirror(&self, url: &str, cache_root: &Path) -> bool;
}

// ---------------------------------------------------------------------------
// git-backed store
// ---------------------------------------------------------------------------

/// [`MirrorStore`] that shells out to the git binary.
///
/// A directory that fails the bare-repo check, or whose refresh fails while
/// it has no refs at all, is treated as left over from an interrupted clone:
/// it is removed and cloned again.
#[derive(Debug, Clone)]
pub struct GitMirrorStore {
    git: String,
}

impl GitMirrorStore {
    pub fn new(git: impl Into<String>) -> Self {
        Self { git: git.into() }
    }

    pub fn git_binary(&self) -> &str {
        &self.git
    }

    async fn has_refs(&self, path: &Path) -> bool {
        git::git_for_each_ref(&self.git, path, "refs", "refname", "%(refname)")
            .await
            .map(|out| out.lines().any(|l| !l.trim().is_empty()))
            .unwrap_or(false)
    }

    async fn clone_fresh(&self, url: &str, path: &Path) -> Result<MirrorOutcome, MirrorError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MirrorError::Clone(anyhow::Error::new(e).context(format!(
                    "failed to create mirror root: {}",
                    parent.display()
                ))))?;
        }
        git::git_clone_mirror(&self.git, url, path)
            .await
            .map_err(MirrorError::Clone)?;
        info!(path = %path.display(), "mirror cloned");
        Ok(MirrorOutcome::Cloned)
    }
}

impl Default for GitMirrorStore {
    fn default() -> Self {
        Self::new("git")
    }
}

#[async_trait]
impl MirrorStore for GitMirrorStore {
    #[instrument(skip(self), fields(root = %cache_root.display()))]
    async fn ensure_mirror(&self, url: &str, cache_root: &Path) -> Result<MirrorOutcome, MirrorError> {
        let path = RepositoryId::from_url(url).mirror_path(cache_root);

        if tokio::fs::symlink_metadata(&path).await.is_err() {
            return self.clone_fresh(url, &path).await;
        }

        if git::validate_bare_repo(&path).await {
            match git::git_remote_update(&self.git, &path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "mirror updated");
                    return Ok(MirrorOutcome::Updated);
                }
                Err(e) if self.has_refs(&path).await => return Err(MirrorError::Update(e)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "refresh of empty mirror failed; re-cloning");
                }
            }
        } else {
            warn!(path = %path.display(), "incomplete mirror directory; re-cloning");
        }

        git::remove_repo(&path).await.map_err(MirrorError::Clone)?;
        self.clone_fresh(url, &path).await
    }

    async fn has_usable_mirror(&self, url: &str, cache_root: &Path) -> bool {
        let path = RepositoryId::from_url(url).mirror_path(cache_root);
        git::validate_bare_repo(&path).await && self.has_refs(&path).await
    }
}
