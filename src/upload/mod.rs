//! Upload driver: commit-range resolution and per-project processing

use anyhow::Result;
use chrono::Local;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::UploadError;
use crate::filter::TimeRange;
use crate::git::{CommitMetadata, GitInfo};
use crate::schema::build_session_record;
use crate::sink::{OutputTarget, Sink};
use crate::store::UploadHistoryStore;
use crate::transcript::{find_conversation_files, read_transcript};

/// How the commit range of a run is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum UploadMode {
    /// Both commits given explicitly.
    Manual,
    /// From the last uploaded commit to HEAD.
    Incremental,
    /// From the root commit to HEAD; records HEAD as uploaded.
    Latest,
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadMode::Manual => "manual",
            UploadMode::Incremental => "incremental",
            UploadMode::Latest => "latest",
        };
        f.write_str(name)
    }
}

/// Outcome of range resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitRange {
    Range { before: String, after: String },
    /// Nothing new since the last upload.
    UpToDate { commit: String },
}

/// Choose the `(before, after)` commits for a run.
pub fn resolve_commit_range(
    mode: UploadMode,
    git: &dyn CommitMetadata,
    repo_path: &Path,
    history: &UploadHistoryStore,
    project: &str,
    before: Option<&str>,
    after: Option<&str>,
) -> Result<CommitRange, UploadError> {
    let non_empty = |s: Option<&str>| s.filter(|s| !s.is_empty()).map(str::to_string);

    match mode {
        UploadMode::Manual => match (non_empty(before), non_empty(after)) {
            (Some(before), Some(after)) => Ok(CommitRange::Range { before, after }),
            _ => Err(UploadError::MissingCommit),
        },
        UploadMode::Incremental => {
            let record = history
                .load(project)
                .ok_or_else(|| UploadError::NoUploadHistory {
                    project: project.to_string(),
                })?;
            let head = resolve_head(git, repo_path)?;
            if record.last_uploaded_commit == head {
                return Ok(CommitRange::UpToDate { commit: head });
            }
            Ok(CommitRange::Range {
                before: record.last_uploaded_commit,
                after: head,
            })
        }
        UploadMode::Latest => {
            let root = git.first_commit();
            if root.is_empty() {
                return Err(UploadError::NoRootCommit {
                    repo: repo_path.to_path_buf(),
                });
            }
            let head = resolve_head(git, repo_path)?;
            Ok(CommitRange::Range {
                before: root,
                after: head,
            })
        }
    }
}

fn resolve_head(git: &dyn CommitMetadata, repo_path: &Path) -> Result<String, UploadError> {
    let head = git.resolve("HEAD");
    if head.is_empty() {
        return Err(UploadError::HeadUnresolvable {
            repo: repo_path.to_path_buf(),
        });
    }
    Ok(head)
}

/// Counters for one `process_project` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub files_found: usize,
    pub files_processed: usize,
    pub files_saved: usize,
    pub messages_total: usize,
    /// Messages kept by the commit-range filter.
    pub messages_trimmed: usize,
}

pub struct Uploader {
    projects_dir: PathBuf,
    target: OutputTarget,
    sink: Sink,
}

impl Uploader {
    pub fn new(projects_dir: impl Into<PathBuf>, target: OutputTarget, sink: Sink) -> Self {
        Self {
            projects_dir: projects_dir.into(),
            target,
            sink,
        }
    }

    /// Upload every conversation of `project` restricted to the
    /// `before..=after` commit window, reading commits from `repo_path`.
    pub fn process_project(
        &self,
        project: &str,
        repo_path: &Path,
        before: &str,
        after: &str,
        dry_run: bool,
    ) -> Result<UploadStats> {
        let git = GitInfo::open(repo_path);
        self.process_with(project, &git, before, after, dry_run)
    }

    /// [`Self::process_project`] against an already opened repository.
    pub fn process_with(
        &self,
        project: &str,
        git: &dyn CommitMetadata,
        before: &str,
        after: &str,
        dry_run: bool,
    ) -> Result<UploadStats> {
        let files = find_conversation_files(&self.projects_dir, project)?;
        let mut stats = UploadStats {
            files_found: files.len(),
            ..Default::default()
        };
        info!("Found {} conversation files in {}", files.len(), project);

        for (label, commit) in [("before", before), ("after", after)] {
            match git.commit_info(commit) {
                Some(c) => info!(
                    "{} commit {}: {} ({})",
                    label,
                    c.hash,
                    c.message.lines().next().unwrap_or_default(),
                    c.timestamp.map(|t| t.to_rfc3339()).unwrap_or_default()
                ),
                None => warn!("{} commit '{}' not found", label, commit),
            }
        }

        let range = TimeRange::from_bounds(git.commit_timestamp(before), git.commit_timestamp(after))?;
        info!("Filtering messages between {} and {}", range.start, range.end);

        for path in files {
            let Some(conversation_id) = path.file_stem().map(|s| s.to_string_lossy().into_owned())
            else {
                continue;
            };

            let records = read_transcript(&path).into_records();
            let total = records.len();
            let kept = range.filter(records);
            stats.messages_total += total;
            stats.messages_trimmed += kept.len();

            if kept.is_empty() {
                debug!("No messages in range for {}", conversation_id);
                continue;
            }
            stats.files_processed += 1;

            info!(
                "Processing {}: {} of {} messages in range",
                conversation_id,
                kept.len(),
                total
            );
            let record =
                build_session_record(project, &conversation_id, kept, Some(git), Some(before), Some(after));
            let destination = self
                .target
                .destination(project, after, &conversation_id, Local::now());

            if dry_run {
                info!("[dry run] would save to {}", destination);
                continue;
            }
            if self.sink.write(&record, &destination) {
                stats.files_saved += 1;
            }
        }

        Ok(stats)
    }
}
