//! Git command wrappers using [`tokio::process::Command`].
//!
//! Every function in this module shells out to the `git` binary named by the
//! caller.  Child processes are spawned with `kill_on_drop`, so dropping the
//! returned future (on timeout or cancellation) also terminates git.

use std::path::Path;
use std::process::{Output, Stdio};

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, instrument};

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

fn git_command(git: &str) -> Command {
    let mut cmd = Command::new(git);
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    cmd
}

/// Run `cmd` to completion and fail with git's stderr on a non-zero exit.
async fn run(mut cmd: Command, what: &str) -> Result<Output> {
    let output = cmd
        .output()
        .await
        .with_context(|| format!("failed to spawn {what}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{what} failed (status {}): {}", output.status, stderr.trim());
    }
    Ok(output)
}

// ---------------------------------------------------------------------------
// Clone / update
// ---------------------------------------------------------------------------

/// Fetch refspecs of a mirror: branches and tags only, so forge-private
/// namespaces such as `refs/pull/*` never reach the cache.
pub const MIRROR_REFSPECS: [&str; 2] = ["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"];

/// Create a shallow, tree-filtered bare mirror of `url` at `dest`.
///
/// The mirror carries every branch and tag at depth 1 and defers tree and
/// blob objects below the root commit until they are asked for.  The
/// refspecs are stored in the mirror's config, so later updates keep the
/// same scope.
#[instrument(skip(git), fields(%url, dest = %dest.display()))]
pub async fn git_clone_mirror(git: &str, url: &str, dest: &Path) -> Result<()> {
    let mut cmd = git_command(git);
    cmd.arg("clone")
        .arg("--bare")
        .arg("--no-single-branch")
        .arg("--depth")
        .arg("1")
        .arg("--filter=tree:0");
    for refspec in MIRROR_REFSPECS {
        cmd.arg("--config").arg(format!("remote.origin.fetch={refspec}"));
    }
    cmd.arg(url).arg(dest);

    debug!("spawning git clone --bare");
    run(cmd, "git clone --bare").await?;
    debug!("git clone --bare succeeded");
    Ok(())
}

/// Refresh every remote-tracking ref of an existing mirror, pruning refs that
/// were deleted upstream.
#[instrument(skip(git), fields(repo = %repo_path.display()))]
pub async fn git_remote_update(git: &str, repo_path: &Path) -> Result<()> {
    let mut cmd = git_command(git);
    cmd.arg("-C")
        .arg(repo_path)
        .arg("remote")
        .arg("update")
        .arg("--prune");

    debug!("spawning git remote update");
    run(cmd, "git remote update").await?;
    debug!("git remote update complete");
    Ok(())
}

// ---------------------------------------------------------------------------
// Read plumbing
// ---------------------------------------------------------------------------

/// Run `git for-each-ref` below `prefix` and return raw stdout.
#[instrument(skip(git, format), fields(repo = %repo_path.display(), %prefix, %sort))]
pub async fn git_for_each_ref(
    git: &str,
    repo_path: &Path,
    prefix: &str,
    sort: &str,
    format: &str,
) -> Result<String> {
    let mut cmd = git_command(git);
    cmd.arg("-C")
        .arg(repo_path)
        .arg("for-each-ref")
        .arg(format!("--sort={sort}"))
        .arg(format!("--format={format}"))
        .arg(prefix);

    let output = run(cmd, "git for-each-ref").await?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Return the short name of the branch `HEAD` points at.
#[instrument(skip(git), fields(repo = %repo_path.display()))]
pub async fn git_head_branch(git: &str, repo_path: &Path) -> Result<String> {
    let mut cmd = git_command(git);
    cmd.arg("-C")
        .arg(repo_path)
        .arg("symbolic-ref")
        .arg("--short")
        .arg("HEAD");

    let output = run(cmd, "git symbolic-ref").await?;
    let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if branch.is_empty() {
        bail!("git symbolic-ref returned an empty branch name");
    }
    Ok(branch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::testutil::{git, git_available, init_origin};

    #[tokio::test]
    async fn missing_binary_reports_spawn_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let err = git_remote_update("/nonexistent/git-binary", tmp.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[tokio::test]
    async fn clone_of_unreachable_remote_fails() {
        if !git_available() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        let url = format!("file://{}/does-not-exist", tmp.path().display());
        let err = git_clone_mirror("git", &url, &tmp.path().join("mirror"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("git clone --bare failed"));
    }

    #[tokio::test]
    async fn mirror_clone_then_update() {
        if !git_available() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        let origin = init_origin(tmp.path());
        let dest = tmp.path().join("mirror");

        git_clone_mirror("git", &origin.url, &dest).await.unwrap();
        assert!(dest.join("HEAD").is_file());
        assert!(!dest.join(".git").exists(), "mirror must be bare");

        git_remote_update("git", &dest).await.unwrap();
        let head = git_head_branch("git", &dest).await.unwrap();
        assert_eq!(head, "main");
    }

    #[tokio::test]
    async fn mirror_keeps_only_branches_and_tags() {
        if !git_available() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        let origin = init_origin(tmp.path());
        git(&origin.path, &["update-ref", "refs/pull/1/head", "old-topic"], &[]);
        let dest = tmp.path().join("mirror");

        let refs = |out: String| out.lines().map(str::to_string).collect::<Vec<_>>();

        git_clone_mirror("git", &origin.url, &dest).await.unwrap();
        let listed = refs(git_for_each_ref("git", &dest, "refs", "refname", "%(refname)").await.unwrap());
        assert_eq!(
            listed,
            vec!["refs/heads/main", "refs/heads/old-topic", "refs/tags/v1.0"]
        );

        // Updates keep the same scope and prune deleted branches.
        git(&origin.path, &["update-ref", "refs/pull/2/merge", "main"], &[]);
        git(&origin.path, &["branch", "later"], &[]);
        git(&origin.path, &["branch", "-D", "old-topic"], &[]);
        git_remote_update("git", &dest).await.unwrap();
        let listed = refs(git_for_each_ref("git", &dest, "refs", "refname", "%(refname)").await.unwrap());
        assert_eq!(listed, vec!["refs/heads/later", "refs/heads/main", "refs/tags/v1.0"]);
    }
}
