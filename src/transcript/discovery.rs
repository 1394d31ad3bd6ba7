//! Locating conversation files under the projects directory

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::UploadError;

/// A project directory and how many conversations it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSummary {
    pub name: String,
    pub path: PathBuf,
    pub conversations: usize,
}

/// Conversation files (`*.jsonl`) of one project, sorted by path.
pub fn find_conversation_files(projects_dir: &Path, project: &str) -> Result<Vec<PathBuf>> {
    let project_path = projects_dir.join(project);
    if !project_path.is_dir() {
        return Err(UploadError::ProjectNotFound { path: project_path }.into());
    }

    let pattern = format!(
        "{}/*.jsonl",
        glob::Pattern::escape(&project_path.to_string_lossy())
    );
    let mut files = glob::glob(&pattern)
        .with_context(|| format!("invalid glob pattern {pattern}"))?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}

/// Every project directory under `projects_dir`. A missing directory has no
/// projects.
pub fn list_projects(projects_dir: &Path) -> Result<Vec<ProjectSummary>> {
    let mut projects = vec![];

    if !projects_dir.exists() {
        return Ok(projects);
    }

    for entry in WalkDir::new(projects_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("reading {}", projects_dir.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let conversations = WalkDir::new(entry.path())
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file()
                    && e.path().extension().map(|ext| ext == "jsonl").unwrap_or(false)
            })
            .count();

        projects.push(ProjectSummary {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path().to_path_buf(),
            conversations,
        });
    }

    Ok(projects)
}
