//! Raw transcript export: whole conversations, no commit filtering

use anyhow::Result;
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::UploadError;
use crate::sink::{OutputTarget, Sink};
use crate::transcript::{find_conversation_files, list_projects, read_transcript, TranscriptRecord};

/// One exported conversation file.
#[derive(Debug, Serialize)]
pub struct RawExport {
    pub project_name: String,
    pub conversation_id: String,
    pub file_name: String,
    pub extracted_at: String,
    pub message_count: usize,
    pub messages: Vec<TranscriptRecord>,
}

/// Counters for one export run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub files_found: usize,
    pub files_processed: usize,
    pub files_saved: usize,
    pub messages_extracted: usize,
}

pub struct Exporter {
    projects_dir: PathBuf,
    target: OutputTarget,
    sink: Sink,
}

impl Exporter {
    pub fn new(projects_dir: impl Into<PathBuf>, target: OutputTarget, sink: Sink) -> Self {
        Self {
            projects_dir: projects_dir.into(),
            target,
            sink,
        }
    }

    /// Export every conversation of every project. A missing projects
    /// directory exports nothing.
    pub fn export_all(&self, dry_run: bool) -> Result<ExportStats> {
        if !self.projects_dir.exists() {
            warn!("{} does not exist", self.projects_dir.display());
            return Ok(ExportStats::default());
        }

        let mut files = vec![];
        for project in list_projects(&self.projects_dir)? {
            for path in find_conversation_files(&self.projects_dir, &project.name)? {
                files.push((project.name.clone(), path));
            }
        }
        info!("Found {} conversation files", files.len());

        let mut stats = ExportStats {
            files_found: files.len(),
            ..Default::default()
        };
        for (project, path) in files {
            self.export_file(&project, &path, dry_run, &mut stats);
        }
        Ok(stats)
    }

    /// Export the conversations of one project. A project without
    /// conversation files is an error.
    pub fn export_project(&self, project: &str, dry_run: bool) -> Result<ExportStats> {
        let files = find_conversation_files(&self.projects_dir, project)?;
        if files.is_empty() {
            return Err(UploadError::NoConversationFiles {
                project: project.to_string(),
            }
            .into());
        }
        info!("Found {} conversation files in {}", files.len(), project);

        let mut stats = ExportStats {
            files_found: files.len(),
            ..Default::default()
        };
        for path in files {
            self.export_file(project, &path, dry_run, &mut stats);
        }
        Ok(stats)
    }

    fn export_file(&self, project: &str, path: &Path, dry_run: bool, stats: &mut ExportStats) {
        let Some(conversation_id) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            return;
        };
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let messages = read_transcript(path).into_records();
        stats.messages_extracted += messages.len();
        stats.files_processed += 1;

        if messages.is_empty() {
            info!("No messages found in {}/{}", project, file_name);
            return;
        }
        info!("Extracted {} messages from {}/{}", messages.len(), project, file_name);

        let now = Local::now();
        let destination = self.target.export_destination(project, &conversation_id, now);
        let export = RawExport {
            project_name: project.to_string(),
            conversation_id,
            file_name,
            extracted_at: now.to_rfc3339(),
            message_count: messages.len(),
            messages,
        };

        if dry_run {
            info!("[dry run] would save to {}", destination);
            return;
        }
        if self.sink.write(&export, &destination) {
            stats.files_saved += 1;
        }
    }
}
