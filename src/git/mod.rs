//! Commit metadata from the local git repository
//!
//! Everything here is optional context for a session record, so backend
//! failures are logged and turned into empty values instead of errors.

use chrono::{DateTime, FixedOffset, TimeZone};
use git2::{Delta, DiffFindOptions, Repository, Sort};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A single commit, read-only.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommitInfo {
    pub hash: String,
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub author: String,
    pub message: String,
}

/// Path-level and line-level changes between two commits.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ChangeSet {
    pub files_added: Vec<String>,
    pub files_modified: Vec<String>,
    pub files_deleted: Vec<String>,
    pub total_additions: u64,
    pub total_deletions: u64,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.files_added.is_empty()
            && self.files_modified.is_empty()
            && self.files_deleted.is_empty()
            && self.total_additions == 0
            && self.total_deletions == 0
    }
}

/// Version-control queries used by the normalizer and the upload driver.
///
/// String results are empty when the backend cannot answer.
pub trait CommitMetadata {
    /// Committer time of `commit`, absent for empty or unknown identifiers.
    fn commit_timestamp(&self, commit: &str) -> Option<DateTime<FixedOffset>>;

    fn commit_info(&self, commit: &str) -> Option<CommitInfo>;

    /// Changes from `before` to `after`; empty when either side is missing.
    fn changes_between(&self, before: &str, after: &str) -> ChangeSet;

    fn current_branch(&self) -> String;

    /// URL of the `origin` remote.
    fn remote_url(&self) -> String;

    /// Root commit reachable from HEAD.
    fn first_commit(&self) -> String;

    /// Parent of `commit` (`commit~1`).
    fn previous_commit(&self, commit: &str) -> String;

    /// Full hash of any revision expression such as `HEAD`.
    fn resolve(&self, rev: &str) -> String;
}

/// libgit2-backed [`CommitMetadata`].
pub struct GitInfo {
    path: PathBuf,
    repo: Option<Repository>,
}

impl GitInfo {
    /// Open the repository containing `path`. A path that is not inside a
    /// repository yields a provider that answers every query with nothing.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let repo = match Repository::discover(&path) {
            Ok(repo) => Some(repo),
            Err(e) => {
                warn!("Could not open git repository at {}: {}", path.display(), e.message());
                None
            }
        };
        Self { path, repo }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn find_commit(&self, rev: &str) -> Option<git2::Commit<'_>> {
        if rev.is_empty() {
            return None;
        }
        let repo = self.repo.as_ref()?;
        match repo.revparse_single(rev).and_then(|obj| obj.peel_to_commit()) {
            Ok(commit) => Some(commit),
            Err(e) => {
                warn!("Git lookup of '{}' failed: {}", rev, e.message());
                None
            }
        }
    }
}

fn commit_time(commit: &git2::Commit<'_>) -> Option<DateTime<FixedOffset>> {
    let time = commit.time();
    let offset = FixedOffset::east_opt(time.offset_minutes() * 60)?;
    offset.timestamp_opt(time.seconds(), 0).single()
}

fn delta_path(delta: &git2::DiffDelta<'_>) -> Option<String> {
    delta
        .new_file()
        .path()
        .or_else(|| delta.old_file().path())
        .map(|p| p.to_string_lossy().into_owned())
}

impl CommitMetadata for GitInfo {
    fn commit_timestamp(&self, commit: &str) -> Option<DateTime<FixedOffset>> {
        self.find_commit(commit).and_then(|c| commit_time(&c))
    }

    fn commit_info(&self, commit: &str) -> Option<CommitInfo> {
        if commit.is_empty() {
            return None;
        }

        let mut info = CommitInfo {
            hash: commit.to_string(),
            timestamp: None,
            author: String::new(),
            message: String::new(),
        };

        if let Some(c) = self.find_commit(commit) {
            info.timestamp = commit_time(&c);
            let author = c.author();
            info.author = format!(
                "{} <{}>",
                author.name().unwrap_or_default(),
                author.email().unwrap_or_default()
            );
            info.message = c.message().unwrap_or_default().trim().to_string();
        }

        Some(info)
    }

    fn changes_between(&self, before: &str, after: &str) -> ChangeSet {
        let mut changes = ChangeSet::default();

        let (Some(repo), Some(old), Some(new)) = (
            self.repo.as_ref(),
            self.find_commit(before),
            self.find_commit(after),
        ) else {
            return changes;
        };

        let diff = match (old.tree(), new.tree()) {
            (Ok(old_tree), Ok(new_tree)) => {
                repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), None)
            }
            (Err(e), _) | (_, Err(e)) => Err(e),
        };
        let mut diff = match diff {
            Ok(diff) => diff,
            Err(e) => {
                warn!("Git diff {}..{} failed: {}", before, after, e.message());
                return changes;
            }
        };

        // Pair deletes with adds so a moved file is one Renamed delta.
        let mut find = DiffFindOptions::new();
        find.renames(true);
        if let Err(e) = diff.find_similar(Some(&mut find)) {
            warn!("Git rename detection {}..{} failed: {}", before, after, e.message());
        }

        for delta in diff.deltas() {
            let Some(path) = delta_path(&delta) else {
                continue;
            };
            match delta.status() {
                Delta::Added => changes.files_added.push(path),
                Delta::Modified => changes.files_modified.push(path),
                Delta::Deleted => changes.files_deleted.push(path),
                other => debug!("Ignoring {:?} change to {}", other, path),
            }
        }

        match diff.stats() {
            Ok(stats) => {
                changes.total_additions = stats.insertions() as u64;
                changes.total_deletions = stats.deletions() as u64;
            }
            Err(e) => warn!("Git diff stats {}..{} failed: {}", before, after, e.message()),
        }

        changes
    }

    fn current_branch(&self) -> String {
        let Some(repo) = self.repo.as_ref() else {
            return String::new();
        };
        match repo.head() {
            Ok(head) => head.shorthand().unwrap_or_default().to_string(),
            Err(e) => {
                warn!("Reading HEAD failed: {}", e.message());
                String::new()
            }
        }
    }

    fn remote_url(&self) -> String {
        let Some(repo) = self.repo.as_ref() else {
            return String::new();
        };
        match repo.find_remote("origin") {
            Ok(remote) => remote.url().unwrap_or_default().to_string(),
            Err(e) => {
                debug!("No origin remote: {}", e.message());
                String::new()
            }
        }
    }

    fn first_commit(&self) -> String {
        let Some(repo) = self.repo.as_ref() else {
            return String::new();
        };

        let walk = repo.revwalk().and_then(|mut walk| {
            walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
            walk.push_head()?;
            Ok(walk)
        });
        let walk = match walk {
            Ok(walk) => walk,
            Err(e) => {
                warn!("Walking history failed: {}", e.message());
                return String::new();
            }
        };

        for oid in walk.flatten() {
            if let Ok(commit) = repo.find_commit(oid) {
                if commit.parent_count() == 0 {
                    return oid.to_string();
                }
            }
        }
        String::new()
    }

    fn previous_commit(&self, commit: &str) -> String {
        self.resolve(&format!("{commit}~1"))
    }

    fn resolve(&self, rev: &str) -> String {
        self.find_commit(rev)
            .map(|c| c.id().to_string())
            .unwrap_or_default()
    }
}
