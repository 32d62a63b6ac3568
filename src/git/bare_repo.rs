//! Bare mirror directory checks.
//!
//! Helpers for deciding whether a directory under the mirror root holds a
//! usable bare repository, and for removing one that does not.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Check whether `path` looks like a bare Git repository.
///
/// Requires a `HEAD` file, an `objects/` directory, and either a `refs/`
/// directory or a `packed-refs` file.  This is a lightweight heuristic, not
/// a full integrity check: a clone killed half-way can still pass it.
#[instrument(fields(path = %path.display()))]
pub async fn validate_bare_repo(path: &Path) -> bool {
    if !is_dir(path).await {
        debug!("path does not exist or is not a directory");
        return false;
    }

    if !is_file(&path.join("HEAD")).await {
        debug!("HEAD file not found; not a bare repo");
        return false;
    }

    if !is_dir(&path.join("objects")).await {
        warn!("HEAD exists but objects/ is missing");
        return false;
    }

    let has_refs = is_dir(&path.join("refs")).await || is_file(&path.join("packed-refs")).await;
    if !has_refs {
        warn!("HEAD exists but neither refs/ nor packed-refs is present");
    }
    has_refs
}

// ---------------------------------------------------------------------------
// Remove
// ---------------------------------------------------------------------------

/// Recursively remove the repository at `path`.  Missing paths are a no-op.
#[instrument(fields(path = %path.display()))]
pub async fn remove_repo(path: &Path) -> Result<()> {
    if tokio::fs::symlink_metadata(path).await.is_err() {
        debug!("path does not exist; nothing to remove");
        return Ok(());
    }

    tokio::fs::remove_dir_all(path)
        .await
        .with_context(|| format!("failed to remove repo directory: {}", path.display()))?;

    debug!("repo directory removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn validate_nonexistent_path() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(!validate_bare_repo(&tmp.path().join("missing")).await);
    }

    #[tokio::test]
    async fn head_without_objects_is_partial() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("HEAD"), "ref: refs/heads/main\n").unwrap();
        assert!(!validate_bare_repo(tmp.path()).await);
    }

    #[tokio::test]
    async fn packed_refs_layout_is_accepted() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::create_dir(tmp.path().join("objects")).unwrap();
        std::fs::write(tmp.path().join("packed-refs"), "").unwrap();
        assert!(validate_bare_repo(tmp.path()).await);
    }

    #[tokio::test]
    async fn remove_nonexistent_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        remove_repo(&tmp.path().join("missing")).await.unwrap();
    }

    #[tokio::test]
    async fn remove_deletes_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        std::fs::create_dir_all(repo.join("objects/pack")).unwrap();
        std::fs::write(repo.join("HEAD"), "x").unwrap();
        remove_repo(&repo).await.unwrap();
        assert!(!repo.exists());
    }
}
