//! Throw-away origin repositories for tests that need a real `git`.

use std::path::{Path, PathBuf};
use std::process::Command;

pub(crate) struct Origin {
    pub path: PathBuf,
    pub url: String,
}

pub(crate) fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub(crate) fn git(dir: &Path, args: &[&str], env: &[(&str, &str)]) {
    let mut cmd = Command::new("git");
    cmd.arg("-C")
        .arg(dir)
        .args(["-c", "user.name=Test Author", "-c", "user.email=author@example.com"])
        .args(["-c", "commit.gpgsign=false", "-c", "tag.gpgsign=false"])
        .args(args);
    for (k, v) in env {
        cmd.env(k, v);
    }
    let status = cmd.status().expect("spawn git");
    assert!(status.success(), "git {args:?} failed");
}

/// Build an origin with `main`, a stale `old-topic` branch committed in 2020
/// by "Old Timer", and a lightweight tag `v1.0` on `main`.
pub(crate) fn init_origin(base: &Path) -> Origin {
    let path = base.join("origin");
    std::fs::create_dir_all(&path).unwrap();

    git(&path, &["init", "--quiet", "--initial-branch=main"], &[]);
    std::fs::write(path.join("README.md"), "hello\n").unwrap();
    git(&path, &["add", "README.md"], &[]);
    git(&path, &["commit", "--quiet", "-m", "initial"], &[]);
    git(&path, &["tag", "v1.0"], &[]);

    git(&path, &["checkout", "--quiet", "-b", "old-topic"], &[]);
    std::fs::write(path.join("old.txt"), "old\n").unwrap();
    git(&path, &["add", "old.txt"], &[]);
    let old = [
        ("GIT_COMMITTER_DATE", "2020-01-01T00:00:00+0000"),
        ("GIT_AUTHOR_DATE", "2020-01-01T00:00:00+0000"),
        ("GIT_COMMITTER_NAME", "Old Timer"),
        ("GIT_COMMITTER_EMAIL", "old@example.com"),
    ];
    git(&path, &["commit", "--quiet", "-m", "old work"], &old);
    git(&path, &["checkout", "--quiet", "main"], &[]);

    let url = format!("file://{}", path.display());
    Origin { path, url }
}
