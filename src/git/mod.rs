//! Git command wrappers and bare mirror helpers.
//!
//! All operations shell out to the `git` binary using `tokio::process::Command`
//! for non-blocking execution.

pub mod bare_repo;
pub mod commands;
pub mod refs;

#[cfg(test)]
pub(crate) mod testutil;

pub use bare_repo::{remove_repo, validate_bare_repo};
pub use commands::{git_clone_mirror, git_for_each_ref, git_head_branch, git_remote_update};
pub use refs::{default_branch, list_branches, list_tags, RefInfo};
