//! Upload history: one JSON record per project
//!
//! The record remembers the newest commit a project was uploaded up to, so
//! the next incremental run can start from there. Writes are last-wins with
//! no locking; runs are expected to be sequential.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadHistoryRecord {
    pub project_name: String,
    pub last_uploaded_commit: String,
    pub last_uploaded_at: String,
    pub repo_path: String,
}

pub struct UploadHistoryStore {
    dir: PathBuf,
}

impl UploadHistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, project_name: &str) -> PathBuf {
        self.dir.join(format!("{project_name}.json"))
    }

    /// The stored record, if any. Unreadable or corrupt files count as
    /// missing.
    pub fn load(&self, project_name: &str) -> Option<UploadHistoryRecord> {
        let path = self.record_path(project_name);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to load upload history {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Failed to load upload history {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Overwrite the project's record with `commit` as the newest upload.
    pub fn save(&self, project_name: &str, commit: &str, repo_path: &Path) -> Result<UploadHistoryRecord> {
        self.save_at(project_name, commit, repo_path, Local::now())
    }

    fn save_at(
        &self,
        project_name: &str,
        commit: &str,
        repo_path: &Path,
        now: DateTime<Local>,
    ) -> Result<UploadHistoryRecord> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;

        let record = UploadHistoryRecord {
            project_name: project_name.to_string(),
            last_uploaded_commit: commit.to_string(),
            last_uploaded_at: now.to_rfc3339(),
            repo_path: repo_path.to_string_lossy().into_owned(),
        };

        let path = self.record_path(project_name);
        let json = serde_json::to_string_pretty(&record).context("serializing upload history")?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;

        info!("Saved upload history: {}", commit);
        Ok(record)
    }
}
