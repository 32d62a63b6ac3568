//! Branch and tag listings read from a mirror.
//!
//! These run inside [`RepoCacheManager::access_repo`](crate::mirror::RepoCacheManager::access_repo),
//! so the caller already holds the repository lock.

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Months, Utc};
use serde::Serialize;
use tracing::{debug, trace};

use super::commands::{git_for_each_ref, git_head_branch};

const FIELD_SEP: char = '\0';

const BRANCH_FORMAT: &str =
    "%(refname:lstrip=2)%00%(objectname)%00%(committerdate:iso-strict)%00%(committername)%00%(committeremail:trim)";

const TAG_FORMAT: &str = "%(refname:lstrip=2)%00%(objectname)%00%(creatordate:iso-strict)%00%00";

/// Branches untouched for longer than this are considered stale.
const ACTIVE_WINDOW_MONTHS: u32 = 3;

/// One branch or tag of a mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefInfo {
    pub name: String,
    pub commit: String,
    pub date: DateTime<Utc>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub committer_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub committer_email: String,
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Branches of the mirror, most recently committed first.
pub async fn list_branches(git: &str, repo_path: &Path) -> Result<Vec<RefInfo>> {
    let out = git_for_each_ref(git, repo_path, "refs/heads", "-committerdate", BRANCH_FORMAT).await?;
    let refs = parse_ref_lines(&out);
    debug!(count = refs.len(), "listed branches");
    Ok(refs)
}

/// Tags of the mirror, newest first.
pub async fn list_tags(git: &str, repo_path: &Path) -> Result<Vec<RefInfo>> {
    let out = git_for_each_ref(git, repo_path, "refs/tags", "-creatordate", TAG_FORMAT).await?;
    let refs = parse_ref_lines(&out);
    debug!(count = refs.len(), "listed tags");
    Ok(refs)
}

/// Name of the branch the mirror's `HEAD` points at.
pub async fn default_branch(git: &str, repo_path: &Path) -> Result<String> {
    git_head_branch(git, repo_path).await
}

fn parse_ref_lines(out: &str) -> Vec<RefInfo> {
    out.lines().filter_map(parse_ref_line).collect()
}

fn parse_ref_line(line: &str) -> Option<RefInfo> {
    let mut fields = line.split(FIELD_SEP);
    let name = fields.next()?.trim();
    let commit = fields.next()?.trim();
    let date_str = fields.next()?.trim();
    if name.is_empty() || commit.is_empty() {
        return None;
    }
    let date = match parse_git_date(date_str) {
        Some(d) => d.with_timezone(&Utc),
        None => {
            trace!(%name, date = %date_str, "skipping ref with unparseable date");
            return None;
        }
    };
    Some(RefInfo {
        name: name.to_string(),
        commit: commit.to_string(),
        date,
        committer_name: fields.next().unwrap_or_default().trim().to_string(),
        committer_email: fields.next().unwrap_or_default().trim().to_string(),
    })
}

/// Parse the date formats git emits: RFC 3339, compact ISO 8601
/// (`2025-07-08T15:25:52+0200`), and the default
/// `2022-08-01 15:54:13 +0000`.
pub fn parse_git_date(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z"))
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S %z"))
        .ok()
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Split `refs` into (active, stale) relative to `now`.
pub fn partition_by_activity(refs: Vec<RefInfo>, now: DateTime<Utc>) -> (Vec<RefInfo>, Vec<RefInfo>) {
    let cutoff = now
        .checked_sub_months(Months::new(ACTIVE_WINDOW_MONTHS))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    refs.into_iter().partition(|r| r.date > cutoff)
}

/// Refs whose committer matches both `name` and `email`.
pub fn authored_by<'a>(refs: &'a [RefInfo], name: &str, email: &str) -> Vec<&'a RefInfo> {
    refs.iter()
        .filter(|r| r.committer_name.contains(name) && r.committer_email.contains(email))
        .collect()
}

/// Pull the default branch out of `refs`, returning it alongside the rest.
pub fn split_default(refs: Vec<RefInfo>, default: &str) -> (Option<RefInfo>, Vec<RefInfo>) {
    let mut found = None;
    let mut rest = Vec::with_capacity(refs.len());
    for r in refs {
        if found.is_none() && r.name == default {
            found = Some(r);
        } else {
            rest.push(r);
        }
    }
    (found, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::commands::git_clone_mirror;
    use crate::git::testutil::{git_available, init_origin};
    use chrono::TimeZone;

    fn info(name: &str, date: DateTime<Utc>) -> RefInfo {
        RefInfo {
            name: name.to_string(),
            commit: "abc".to_string(),
            date,
            committer_name: "Ada Lovelace".to_string(),
            committer_email: "ada@example.com".to_string(),
        }
    }

    #[test]
    fn parses_all_git_date_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 7, 8, 13, 25, 52).unwrap();
        for s in [
            "2025-07-08T15:25:52+02:00",
            "2025-07-08T15:25:52+0200",
            "2025-07-08 15:25:52 +0200",
        ] {
            let parsed = parse_git_date(s).unwrap_or_else(|| panic!("failed on {s}"));
            assert_eq!(parsed.with_timezone(&Utc), expected);
        }
        assert!(parse_git_date("yesterday").is_none());
    }

    #[test]
    fn parse_line_skips_bad_dates_and_reads_committer() {
        let out = "main\0abc123\02024-01-01T00:00:00+00:00\0Ada\0ada@example.com\n\
                   broken\0def456\0not-a-date\0\0\n";
        let refs = parse_ref_lines(out);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "main");
        assert_eq!(refs[0].committer_email, "ada@example.com");
    }

    #[test]
    fn partition_uses_three_month_window() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let refs = vec![
            info("fresh", Utc.with_ymd_and_hms(2025, 5, 20, 0, 0, 0).unwrap()),
            info("old", Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
        ];
        let (active, stale) = partition_by_activity(refs, now);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "fresh");
        assert_eq!(stale[0].name, "old");
    }

    #[test]
    fn authored_by_requires_name_and_email() {
        let now = Utc::now();
        let mut other = info("theirs", now);
        other.committer_email = "someone@example.com".to_string();
        let refs = vec![info("mine", now), other];
        let mine = authored_by(&refs, "Ada", "ada@example.com");
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].name, "mine");
    }

    #[test]
    fn split_default_extracts_single_match() {
        let now = Utc::now();
        let refs = vec![info("feature", now), info("main", now)];
        let (default, rest) = split_default(refs, "main");
        assert_eq!(default.unwrap().name, "main");
        assert_eq!(rest.len(), 1);
    }

    #[tokio::test]
    async fn lists_refs_from_a_real_mirror() {
        if !git_available() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        let origin = init_origin(tmp.path());
        let mirror = tmp.path().join("mirror");
        git_clone_mirror("git", &origin.url, &mirror).await.unwrap();

        let branches = list_branches("git", &mirror).await.unwrap();
        let names: Vec<_> = branches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["main", "old-topic"]);
        assert_eq!(branches[1].committer_name, "Old Timer");

        let tags = list_tags("git", &mirror).await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "v1.0");

        assert_eq!(default_branch("git", &mirror).await.unwrap(), "main");

        let (active, stale) = partition_by_activity(branches, Utc::now());
        assert_eq!(active.len(), 1);
        assert_eq!(stale[0].name, "old-topic");
    }
}
